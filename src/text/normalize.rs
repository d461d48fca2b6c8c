//! Script normalization for recognized text
//!
//! The generic stage is the same for every field: NFC, full-width Latin to
//! half-width, a couple of punctuation fixes, half-width katakana to
//! full-width with voiced-mark composition. A field-specific stage follows.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use super::phone::format_phone_number;
use super::FieldType;

/// Offset between full-width ASCII variants (U+FF01..) and ASCII
const FULL_WIDTH_OFFSET: u32 = 0xFEE0;

/// Offset between the katakana and hiragana blocks
const KATAKANA_HIRAGANA_OFFSET: u32 = 0x60;

const HALF_WIDTH_VOICED_MARK: char = 'ﾞ';
const HALF_WIDTH_SEMI_VOICED_MARK: char = 'ﾟ';

/// Legal-entity type tokens removed from payee names
const LEGAL_ENTITY_TOKENS: &[&str] = &[
    "株式会社",
    "有限会社",
    "合同会社",
    "合資会社",
    "合名会社",
    "医療法人",
    "医療法人社団",
    "医療法人財団",
    "社会医療法人",
    "宗教法人",
    "学校法人",
    "社会福祉法人",
    "更生保護法人",
    "相互会社",
    "特定非営利活動法人",
    "独立行政法人",
    "地方独立行政法人",
    "弁護士法人",
    "有限責任中間法人",
    "無限責任中間法人",
    "行政書士法人",
    "司法書士法人",
    "税理士法人",
    "国立大学法人",
    "公立大学法人",
    "農事組合法人",
    "管理組合法人",
    "社会保険労務士法人",
    "一般社団法人",
    "公益社団法人",
    "一般財団法人",
    "公益財団法人",
    "非営利法人",
    "(株)",
    "(有)",
    "（株）",
    "（有）",
    "㈱",
    "㈲",
    "支店",
];

/// Latin suffixes, matched case-insensitively at word boundaries
const LATIN_ENTITY_PATTERNS: &[&str] = &[
    r"\bco\.,\s*ltd\b\.?",
    r"\bco\.\s*ltd\b\.?",
    r"\bltd\b\.?",
    r"\binc\b\.?",
    r"\bcorporation\b",
    r"\bcorp\b\.?",
    r"\bllc\b",
    r"\bk\.k\.",
    r"\bg\.k\.",
    r"\bbranch office\b",
];

static LEGAL_ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Longest first so that e.g. 医療法人社団 wins over 医療法人
    let mut tokens: Vec<&str> = LEGAL_ENTITY_TOKENS.to_vec();
    tokens.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));

    let alternatives: Vec<String> = tokens
        .iter()
        .map(|t| regex::escape(t))
        .chain(LATIN_ENTITY_PATTERNS.iter().map(|p| p.to_string()))
        .collect();

    Regex::new(&format!("(?i){}", alternatives.join("|"))).expect("legal entity pattern is valid")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static DANGLING_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:会社名|company\s*name)\s*[:：]\s*$").expect("label pattern is valid")
});

static TRAILING_COLON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[:：]\s*$").expect("colon pattern is valid"));

/// Normalize recognized text for a field
///
/// Pure and idempotent. Never fails; invalid phone candidates become empty.
pub fn normalize(text: &str, field: FieldType) -> String {
    match field {
        FieldType::PayeeName => normalize_payee_name(text),
        FieldType::PhoneNumber => normalize_phone_numbers(&normalize_script(text)),
        FieldType::Phonetic => katakana_to_hiragana(&normalize_script(text)),
        FieldType::FreeText | FieldType::Clipboard => normalize_script(text),
    }
}

/// Generic stage shared by all fields
pub fn normalize_script(text: &str) -> String {
    let composed: String = text.nfc().collect();
    let converted: String = composed
        .trim()
        .chars()
        .map(full_width_to_half_width)
        .map(|c| match c {
            '・' => '･',
            '．' => '.',
            other => other,
        })
        .collect();

    half_width_katakana_to_full_width(&converted)
}

fn full_width_to_half_width(c: char) -> char {
    match c {
        'Ａ'..='Ｚ' | 'ａ'..='ｚ' | '０'..='９' => {
            char::from_u32(c as u32 - FULL_WIDTH_OFFSET).unwrap_or(c)
        }
        other => other,
    }
}

/// Half-width katakana to full-width, composing ﾞ/ﾟ with their base
///
/// A mark that has nothing to compose with is left as it is.
pub fn half_width_katakana_to_full_width(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let Some(full) = half_width_katakana(c) else {
            result.push(c);
            continue;
        };

        let composed = match chars.peek() {
            Some(&HALF_WIDTH_VOICED_MARK) => voiced(full),
            Some(&HALF_WIDTH_SEMI_VOICED_MARK) => semi_voiced(full),
            _ => None,
        };

        match composed {
            Some(voiced_char) => {
                chars.next();
                result.push(voiced_char);
            }
            None => result.push(full),
        }
    }

    result
}

fn half_width_katakana(c: char) -> Option<char> {
    let full = match c {
        'ｱ' => 'ア', 'ｲ' => 'イ', 'ｳ' => 'ウ', 'ｴ' => 'エ', 'ｵ' => 'オ',
        'ｶ' => 'カ', 'ｷ' => 'キ', 'ｸ' => 'ク', 'ｹ' => 'ケ', 'ｺ' => 'コ',
        'ｻ' => 'サ', 'ｼ' => 'シ', 'ｽ' => 'ス', 'ｾ' => 'セ', 'ｿ' => 'ソ',
        'ﾀ' => 'タ', 'ﾁ' => 'チ', 'ﾂ' => 'ツ', 'ﾃ' => 'テ', 'ﾄ' => 'ト',
        'ﾅ' => 'ナ', 'ﾆ' => 'ニ', 'ﾇ' => 'ヌ', 'ﾈ' => 'ネ', 'ﾉ' => 'ノ',
        'ﾊ' => 'ハ', 'ﾋ' => 'ヒ', 'ﾌ' => 'フ', 'ﾍ' => 'ヘ', 'ﾎ' => 'ホ',
        'ﾏ' => 'マ', 'ﾐ' => 'ミ', 'ﾑ' => 'ム', 'ﾒ' => 'メ', 'ﾓ' => 'モ',
        'ﾔ' => 'ヤ', 'ﾕ' => 'ユ', 'ﾖ' => 'ヨ',
        'ﾗ' => 'ラ', 'ﾘ' => 'リ', 'ﾙ' => 'ル', 'ﾚ' => 'レ', 'ﾛ' => 'ロ',
        'ﾜ' => 'ワ', 'ｦ' => 'ヲ', 'ﾝ' => 'ン',
        'ｧ' => 'ァ', 'ｨ' => 'ィ', 'ｩ' => 'ゥ', 'ｪ' => 'ェ', 'ｫ' => 'ォ',
        'ｯ' => 'ッ', 'ｬ' => 'ャ', 'ｭ' => 'ュ', 'ｮ' => 'ョ',
        'ｰ' => 'ー',
        _ => return None,
    };
    Some(full)
}

fn voiced(base: char) -> Option<char> {
    let voiced = match base {
        'カ' => 'ガ', 'キ' => 'ギ', 'ク' => 'グ', 'ケ' => 'ゲ', 'コ' => 'ゴ',
        'サ' => 'ザ', 'シ' => 'ジ', 'ス' => 'ズ', 'セ' => 'ゼ', 'ソ' => 'ゾ',
        'タ' => 'ダ', 'チ' => 'ヂ', 'ツ' => 'ヅ', 'テ' => 'デ', 'ト' => 'ド',
        'ハ' => 'バ', 'ヒ' => 'ビ', 'フ' => 'ブ', 'ヘ' => 'ベ', 'ホ' => 'ボ',
        'ウ' => 'ヴ',
        _ => return None,
    };
    Some(voiced)
}

fn semi_voiced(base: char) -> Option<char> {
    let semi = match base {
        'ハ' => 'パ', 'ヒ' => 'ピ', 'フ' => 'プ', 'ヘ' => 'ペ', 'ホ' => 'ポ',
        _ => return None,
    };
    Some(semi)
}

/// Repeats the cleanup until nothing changes
///
/// A removal can expose more work: `株式株式会社会社` leaves `株式会社`
/// behind, and dropping an empty candidate can leave a trailing colon.
fn normalize_payee_name(text: &str) -> String {
    // Every pass that changes the text shortens it or canonicalizes a
    // separator, so this bound is never reached in practice
    let max_passes = 2 * text.chars().count() + 2;

    let mut current = text.to_string();
    for _ in 0..max_passes {
        let next = clean_payee_name(&normalize_script(&current));
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn clean_payee_name(text: &str) -> String {
    let stripped = LEGAL_ENTITY_RE.replace_all(text, "");

    let joined = stripped
        .split([',', '、'])
        .map(|item| collapse_whitespace(item))
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join(",");

    let without_label = DANGLING_LABEL_RE.replace(joined.trim(), "");
    let without_colon = TRAILING_COLON_RE.replace(without_label.trim(), "");
    collapse_whitespace(&without_colon)
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

fn normalize_phone_numbers(text: &str) -> String {
    text.split([',', '、'])
        .map(|candidate| {
            let cleaned: String = candidate
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '+')
                .collect();
            format_phone_number(&cleaned)
        })
        .filter(|formatted| !formatted.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Katakana block (ァ..ヶ) to hiragana
pub fn katakana_to_hiragana(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'ァ'..='ヶ' => char::from_u32(c as u32 - KATAKANA_HIRAGANA_OFFSET).unwrap_or(c),
            other => other,
        })
        .collect()
}
