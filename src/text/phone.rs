//! Phone number formatting
//!
//! Heuristic grouping over a small prefix table, not a numbering-plan lookup.
//! Unknown shapes come back as bare digits.

use tracing::debug;

/// Longest digit string accepted as a phone number
const MAX_DIGITS: usize = 11;

/// Area codes grouped 2-4-4 in 10-digit numbers
const TWO_DIGIT_AREA_PREFIXES: &[&str] = &["03", "06", "04"];

/// Area codes grouped 3-3-4 in 10-digit numbers
const THREE_DIGIT_AREA_PREFIXES: &[&str] = &["052", "072", "075", "078", "082", "092"];

/// Toll-free prefix, grouped 4-2-4
const TOLL_FREE_PREFIX: &str = "0120";

/// Format digits (optionally with hyphens) into a grouped phone number
///
/// Returns an empty string when the input cannot be a phone number.
pub fn format_phone_number(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() > MAX_DIGITS {
        debug!("Rejecting phone candidate with {} digits", digits.len());
        return String::new();
    }

    if input.contains('-') && is_grouped(input) {
        return input.to_string();
    }

    match digits.len() {
        10 => format_ten_digits(&digits),
        11 => group(&digits, &[3, 4, 4]),
        8 => group(&digits, &[4, 4]),
        9 => group(&digits, &[3, 3, 3]),
        _ => digits,
    }
}

/// `\d{2,4}-\d{2,4}-\d{4}`
fn is_grouped(input: &str) -> bool {
    let parts: Vec<&str> = input.split('-').collect();
    if parts.len() != 3 {
        return false;
    }

    let all_digits = parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));

    all_digits
        && (2..=4).contains(&parts[0].len())
        && (2..=4).contains(&parts[1].len())
        && parts[2].len() == 4
}

fn format_ten_digits(digits: &str) -> String {
    if TWO_DIGIT_AREA_PREFIXES.iter().any(|p| digits.starts_with(p)) {
        return group(digits, &[2, 4, 4]);
    }
    if THREE_DIGIT_AREA_PREFIXES.iter().any(|p| digits.starts_with(p)) {
        return group(digits, &[3, 3, 4]);
    }
    if digits.starts_with(TOLL_FREE_PREFIX) {
        return group(digits, &[4, 2, 4]);
    }
    if digits.starts_with('0') {
        // 3-digit area code when the second digit is 4-9
        return match digits.as_bytes().get(1) {
            Some(b'4'..=b'9') => group(digits, &[3, 3, 4]),
            _ => group(digits, &[2, 4, 4]),
        };
    }

    group(digits, &[3, 3, 4])
}

/// Split an ASCII digit string into hyphen-joined groups of the given sizes
fn group(digits: &str, sizes: &[usize]) -> String {
    let mut parts = Vec::with_capacity(sizes.len());
    let mut start = 0;
    for &size in sizes {
        let end = (start + size).min(digits.len());
        parts.push(&digits[start..end]);
        start = end;
    }
    parts.join("-")
}
