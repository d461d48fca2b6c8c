//! Text post-processing
//!
//! Turns raw recognized text into field values:
//! - script normalization (full-width, half-width katakana, NFC)
//! - phone number formatting
//! - combined payee-name / phone-number parsing

pub mod fields;
pub mod normalize;
pub mod phone;

pub use fields::{parse_multi_field, FieldResult};
pub use normalize::normalize;
pub use phone::format_phone_number;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic category of the text being extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    /// Plain text, no field-specific stage
    #[default]
    FreeText,
    /// One or more phone numbers, comma separated
    PhoneNumber,
    /// Company / payee name with legal-entity suffixes removed
    PayeeName,
    /// Reading in hiragana
    Phonetic,
    /// Text headed for the clipboard, treated like free text
    Clipboard,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::FreeText => "free-text",
            FieldType::PhoneNumber => "phone-number",
            FieldType::PayeeName => "payee-name",
            FieldType::Phonetic => "phonetic",
            FieldType::Clipboard => "clipboard",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free-text" | "text" => Ok(FieldType::FreeText),
            "phone-number" | "phone" => Ok(FieldType::PhoneNumber),
            "payee-name" | "payee" => Ok(FieldType::PayeeName),
            "phonetic" => Ok(FieldType::Phonetic),
            "clipboard" => Ok(FieldType::Clipboard),
            other => Err(format!("unknown field type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_parse() {
        assert_eq!("phone-number".parse::<FieldType>(), Ok(FieldType::PhoneNumber));
        assert_eq!("Payee".parse::<FieldType>(), Ok(FieldType::PayeeName));
        assert!("barcode".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_field_type_serde_names() {
        let json = serde_json::to_string(&FieldType::PayeeName).unwrap();
        assert_eq!(json, "\"payee-name\"");
        let parsed: FieldType = serde_json::from_str("\"free-text\"").unwrap();
        assert_eq!(parsed, FieldType::FreeText);
    }
}
