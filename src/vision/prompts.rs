//! Prompt selection
//!
//! Prompts are looked up by (model family, prompt kind). Every kind has an
//! entry for [`ModelFamily::Default`], which catches unknown models.

use std::fmt;

use super::options::{Mode, ResolvedOptions};
use crate::text::FieldType;

/// Models with tuned prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Gemini25Flash,
    Gemini20FlashLite,
    Gemini15Flash,
    Gemini20Flash,
    Default,
}

impl ModelFamily {
    pub fn from_model(model: &str) -> Self {
        match model.trim() {
            "gemini-2.5-flash" => ModelFamily::Gemini25Flash,
            "gemini-2.0-flash-lite" => ModelFamily::Gemini20FlashLite,
            "gemini-1.5-flash" => ModelFamily::Gemini15Flash,
            "gemini-2.0-flash" => ModelFamily::Gemini20Flash,
            _ => ModelFamily::Default,
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFamily::Gemini25Flash => "gemini-2.5-flash",
            ModelFamily::Gemini20FlashLite => "gemini-2.0-flash-lite",
            ModelFamily::Gemini15Flash => "gemini-1.5-flash",
            ModelFamily::Gemini20Flash => "gemini-2.0-flash",
            ModelFamily::Default => "default",
        };
        f.write_str(name)
    }
}

/// What the prompt asks the model to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Digits, hyphens and commas only
    PhoneNumber,
    /// Two labeled lines: company name and phone number
    PayeeWithPhone,
    /// Everything else
    FreeText,
}

impl From<FieldType> for PromptKind {
    fn from(field: FieldType) -> Self {
        match field {
            FieldType::PhoneNumber => PromptKind::PhoneNumber,
            FieldType::PayeeName => PromptKind::PayeeWithPhone,
            FieldType::FreeText | FieldType::Phonetic | FieldType::Clipboard => PromptKind::FreeText,
        }
    }
}

/// Inputs a template may use
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub language: &'a str,
    pub mode: Mode,
}

type Template = fn(&PromptContext<'_>) -> String;

const PROMPT_TABLE: &[(ModelFamily, PromptKind, Template)] = &[
    (ModelFamily::Gemini25Flash, PromptKind::PhoneNumber, phone_detailed),
    (ModelFamily::Gemini25Flash, PromptKind::PayeeWithPhone, payee_low_resolution),
    (ModelFamily::Gemini25Flash, PromptKind::FreeText, text_detailed_when_accurate),
    (ModelFamily::Gemini20FlashLite, PromptKind::PhoneNumber, phone_compact_international),
    (ModelFamily::Gemini20FlashLite, PromptKind::PayeeWithPhone, payee_low_resolution),
    (ModelFamily::Gemini20FlashLite, PromptKind::FreeText, text_always_detailed),
    (ModelFamily::Gemini15Flash, PromptKind::PhoneNumber, phone_compact_international),
    (ModelFamily::Gemini15Flash, PromptKind::PayeeWithPhone, payee_low_resolution),
    (ModelFamily::Gemini15Flash, PromptKind::FreeText, text_always_detailed),
    (ModelFamily::Gemini20Flash, PromptKind::PhoneNumber, phone_single_line),
    (ModelFamily::Gemini20Flash, PromptKind::PayeeWithPhone, payee_with_script_hint),
    (ModelFamily::Gemini20Flash, PromptKind::FreeText, text_brief_when_accurate),
    (ModelFamily::Default, PromptKind::PhoneNumber, phone_single_line),
    (ModelFamily::Default, PromptKind::PayeeWithPhone, payee_plain),
    (ModelFamily::Default, PromptKind::FreeText, text_plain_output),
];

/// Prompt for the resolved model, field type, language and mode
pub fn prompt_for(options: &ResolvedOptions) -> String {
    let family = ModelFamily::from_model(&options.model);
    let kind = PromptKind::from(options.field_type);
    let context = PromptContext {
        language: &options.language,
        mode: options.mode,
    };
    lookup(family, kind)(&context)
}

fn lookup(family: ModelFamily, kind: PromptKind) -> Template {
    let find = |family: ModelFamily| {
        PROMPT_TABLE
            .iter()
            .find(|(f, k, _)| *f == family && *k == kind)
            .map(|(_, _, template)| *template)
    };

    find(family)
        .or_else(|| find(ModelFamily::Default))
        .unwrap_or(text_plain_output)
}

fn language_name(language: &str) -> &'static str {
    match language.trim() {
        "ja" => "日本語",
        "en" => "英語",
        _ => "複数言語",
    }
}

const BUSINESS_NUMBER_EXCLUSION: &str = "Tで始まる13桁の事業者番号は無視してください。";

const PAYEE_FORMAT: &str = "形式:\n会社名: [抽出結果]\n電話番号: [抽出結果]";

const LOW_RESOLUTION_HINT: &str = "画像の解像度が低くても最大限正確に読み取ってください。";

const BLANK_WHEN_MISSING: &str = "検出できない項目は空欄にしてください。";

const SIMILAR_GLYPHS_DETAILED: &str = "文字の形や特徴を細かく観察し、文脈を考慮して正確に認識してください。特に小さな文字や低コントラストの文字も注意深く認識してください。似た文字（例：「り」と「リ」、「0」と「O」、「l」と「1」など）は文脈から判断して区別してください。";

const SIMILAR_GLYPHS_BRIEF: &str = "文字の形や特徴を細かく観察し、文脈を考慮して正確に認識してください。特に似た文字（例：「り」と「リ」、「0」と「O」）を区別してください。";

const IGNORE_LAYOUT: &str = "レイアウトは無視して純粋なテキストのみを出力してください。";

const TEXT_ONLY: &str = "純粋に認識されたテキストのみを出力し、余計な説明は不要です。";

fn phone_detailed(_: &PromptContext<'_>) -> String {
    format!(
        "画像に含まれる電話番号を正確に抽出してください。以下の要件に従ってください：\n\
         - 数字、ハイフン、カンマのみを返してください（例: 03-1234-5678）\n\
         - 複数の電話番号があればカンマで区切って全て抽出してください\n\
         - {}\n\
         - 国際的な標準形式（+81）も適切に処理してください\n\
         - 余計な説明や文字は不要です",
        BUSINESS_NUMBER_EXCLUSION.trim_end_matches('。')
    )
}

fn phone_compact_international(_: &PromptContext<'_>) -> String {
    format!(
        "画像内の電話番号を正確に抽出してください。数字、ハイフン、カンマのみを返してください。例: 03-1234-5678。\n\
         複数の電話番号があれば、カンマで区切って全て抽出してください。\n\
         余計な説明や文字は不要です。{}\n\
         国際的な標準形式（+81）も適切に処理してください。",
        BUSINESS_NUMBER_EXCLUSION
    )
}

fn phone_single_line(_: &PromptContext<'_>) -> String {
    format!(
        "画像に含まれる電話番号のみを正確に抽出し、複数候補があるときはカンマで区切り、数字、ハイフン、カンマのみを返してください。例: 03-1234-5678。それ以外の文字や説明は不要です。{}",
        BUSINESS_NUMBER_EXCLUSION
    )
}

fn payee_body(script_hint: bool) -> String {
    let hint = if script_hint {
        "ひらがな・カタカナ・漢字などを正確に区別し、"
    } else {
        ""
    };
    format!(
        "画像から以下を抽出してください:\n\
         1. 会社名: 法人格(株式会社など)と支店名を除いた正確な名称。{}複数ある場合はカンマ区切り。\n\
         2. 電話番号: ハイフン含む完全な番号。複数ある場合はカンマ区切り。T始まりの13桁事業者番号は除外。\n\
         \n\
         {}",
        hint, PAYEE_FORMAT
    )
}

fn payee_low_resolution(_: &PromptContext<'_>) -> String {
    format!("{}\n\n{}{}", payee_body(true), LOW_RESOLUTION_HINT, BLANK_WHEN_MISSING)
}

fn payee_with_script_hint(_: &PromptContext<'_>) -> String {
    format!("{}\n\n{}", payee_body(true), BLANK_WHEN_MISSING)
}

fn payee_plain(_: &PromptContext<'_>) -> String {
    format!("{}\n\n{}", payee_body(false), BLANK_WHEN_MISSING)
}

fn text_intro(language: &str) -> String {
    format!(
        "以下の画像に含まれるテキストを抽出してください。言語は{}です。",
        language_name(language)
    )
}

fn when_accurate(mode: Mode, paragraph: &str) -> &str {
    match mode {
        Mode::Accurate => paragraph,
        Mode::Fast => "",
    }
}

fn text_detailed_when_accurate(ctx: &PromptContext<'_>) -> String {
    format!(
        "{}\n{}\n{}",
        text_intro(ctx.language),
        when_accurate(ctx.mode, SIMILAR_GLYPHS_DETAILED),
        IGNORE_LAYOUT
    )
}

fn text_always_detailed(ctx: &PromptContext<'_>) -> String {
    format!("{}\n{}\n{}", text_intro(ctx.language), SIMILAR_GLYPHS_DETAILED, IGNORE_LAYOUT)
}

fn text_brief_when_accurate(ctx: &PromptContext<'_>) -> String {
    format!(
        "{}\n{}\n{}",
        text_intro(ctx.language),
        when_accurate(ctx.mode, SIMILAR_GLYPHS_BRIEF),
        IGNORE_LAYOUT
    )
}

fn text_plain_output(ctx: &PromptContext<'_>) -> String {
    format!(
        "{}\n{}\n{}",
        text_intro(ctx.language),
        when_accurate(ctx.mode, SIMILAR_GLYPHS_BRIEF),
        TEXT_ONLY
    )
}
