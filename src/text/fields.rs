//! Combined payee-name / phone-number parsing
//!
//! The payee-name prompt asks the model for two labeled lines:
//!
//! ```text
//! 会社名: <names>
//! 電話番号: <numbers>
//! ```
//!
//! English labels (`company name:` / `phone number:`) are accepted as well.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::normalize::normalize;
use super::FieldType;

static COMPANY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:会社名|company[ \t]*name)[ \t]*[:：][ \t　]*([^\r\n]*)")
        .expect("company label pattern is valid")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:電話番号|phone[ \t]*number)[ \t]*[:：][ \t　]*([^\r\n]*)")
        .expect("phone label pattern is valid")
});

static PHONE_LABEL_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:電話番号|phone\s*number)\s*[:：]?\s*$").expect("pattern is valid")
});

static COMPANY_LABEL_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:会社名|company\s*name)").expect("pattern is valid")
});

static NOT_A_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:電話番号|tel\b|phone\b|\d[\d\-\s()]*$)").expect("pattern is valid")
});

/// Field values extracted from a combined response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldResult {
    /// Comma-joined candidates; the caller picks one
    pub payee_name: String,
    /// Comma-joined formatted numbers
    pub phone_number: String,
}

impl FieldResult {
    pub fn is_empty(&self) -> bool {
        self.payee_name.is_empty() && self.phone_number.is_empty()
    }

    /// Value for a single field, if this result carries it
    pub fn get(&self, field: FieldType) -> Option<&str> {
        match field {
            FieldType::PayeeName => Some(&self.payee_name),
            FieldType::PhoneNumber => Some(&self.phone_number),
            _ => None,
        }
    }
}

/// Split a labeled two-line response into normalized field values
///
/// Never fails: missing sections yield empty values.
pub fn parse_multi_field(text: &str) -> FieldResult {
    let raw_company = capture_value(&COMPANY_RE, text);
    let raw_phone = capture_value(&PHONE_RE, text);

    let mut payee_name = normalize(&raw_company, FieldType::PayeeName);
    let mut phone_number = normalize(&raw_phone, FieldType::PhoneNumber);

    if PHONE_LABEL_ONLY_RE.is_match(&payee_name) {
        payee_name.clear();
    }
    // Checked on the raw value, normalization strips the label letters
    if COMPANY_LABEL_PREFIX_RE.is_match(&raw_phone) {
        phone_number.clear();
    }

    let candidates: Vec<&str> = payee_name
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty() && !NOT_A_NAME_RE.is_match(name))
        .collect();
    let payee_name = candidates.join(",");

    FieldResult {
        payee_name,
        phone_number,
    }
}

/// First non-empty value following the label; a label echoed on another
/// line (e.g. `会社名: 電話番号:`) must not shadow the real section
fn capture_value(re: &Regex, text: &str) -> String {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}
