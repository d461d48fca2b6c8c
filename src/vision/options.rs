//! Per-request recognition options

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::capture::CapturedRegion;
use crate::config::Settings;
use crate::text::FieldType;

/// Recognition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Lighter preprocessing, shorter prompts
    Fast,
    /// Stronger contrast and glyph disambiguation instructions
    #[default]
    Accurate,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Fast => "fast",
            Mode::Accurate => "accurate",
        }
    }

    /// Contrast factor applied before recognition
    pub fn contrast(&self) -> f32 {
        match self {
            Mode::Fast => 1.1,
            Mode::Accurate => 1.3,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Mode::Fast),
            "accurate" => Ok(Mode::Accurate),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Options supplied with a request; unset values come from settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrOptions {
    pub language: Option<String>,
    pub mode: Option<Mode>,
    pub model: Option<String>,
    #[serde(default)]
    pub field_type: FieldType,
    pub region: Option<CapturedRegion>,
    /// Clockwise rotation applied to the image before recognition
    pub rotation: Option<f64>,
}

impl OcrOptions {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_region(mut self, region: CapturedRegion) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Fill unset values from a settings snapshot
    pub fn resolve(&self, settings: &Settings) -> ResolvedOptions {
        let pick = |value: &Option<String>, fallback: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };

        ResolvedOptions {
            language: pick(&self.language, &settings.language),
            mode: self.mode.unwrap_or(settings.mode),
            model: pick(&self.model, &settings.model),
            field_type: self.field_type,
        }
    }

    /// Rotation to apply when preprocessing: explicit, else the region's
    pub fn effective_rotation(&self) -> f64 {
        self.rotation
            .or_else(|| self.region.map(|r| r.rotation))
            .unwrap_or(0.0)
    }
}

/// Fully resolved options for one recognition call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResolvedOptions {
    pub language: String,
    pub mode: Mode,
    pub model: String,
    pub field_type: FieldType,
}

impl ResolvedOptions {
    /// Request options with every setting pinned; the image is already
    /// cropped and rotated at this point
    pub fn to_request(&self) -> OcrOptions {
        OcrOptions {
            language: Some(self.language.clone()),
            mode: Some(self.mode),
            model: Some(self.model.clone()),
            field_type: self.field_type,
            region: None,
            rotation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::geometry::{Rect, Size};

    fn settings() -> Settings {
        Settings {
            api_key: Some("key".to_string()),
            language: "ja".to_string(),
            mode: Mode::Accurate,
            model: "gemini-2.0-flash".to_string(),
        }
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("fast".parse::<Mode>(), Ok(Mode::Fast));
        assert_eq!(" Accurate ".parse::<Mode>(), Ok(Mode::Accurate));
        assert!("turbo".parse::<Mode>().is_err());
        assert_eq!(Mode::default(), Mode::Accurate);
    }

    #[test]
    fn test_resolve_falls_back_to_settings() {
        let resolved = OcrOptions::new(FieldType::PhoneNumber).resolve(&settings());
        assert_eq!(resolved.language, "ja");
        assert_eq!(resolved.mode, Mode::Accurate);
        assert_eq!(resolved.model, "gemini-2.0-flash");
        assert_eq!(resolved.field_type, FieldType::PhoneNumber);
    }

    #[test]
    fn test_explicit_options_win() {
        let resolved = OcrOptions::new(FieldType::FreeText)
            .with_language("en")
            .with_mode(Mode::Fast)
            .with_model("gemini-2.5-flash")
            .resolve(&settings());
        assert_eq!(resolved.language, "en");
        assert_eq!(resolved.mode, Mode::Fast);
        assert_eq!(resolved.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_blank_model_is_ignored() {
        let resolved = OcrOptions::new(FieldType::FreeText)
            .with_model("  ")
            .resolve(&settings());
        assert_eq!(resolved.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_effective_rotation() {
        assert_eq!(OcrOptions::default().effective_rotation(), 0.0);

        let region = CapturedRegion::new(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Size::new(100.0, 100.0),
            -90.0,
        );
        let options = OcrOptions::default().with_region(region);
        assert_eq!(options.effective_rotation(), 270.0);
        assert_eq!(options.with_rotation(180.0).effective_rotation(), 180.0);
    }
}
