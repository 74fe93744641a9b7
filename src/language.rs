//! Language detection for incoming questions.
//!
//! Only Dutch and English are answered; every other detection collapses to
//! English, and so does a failed detection.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reply language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "nl")]
    Dutch,
}

impl Language {
    /// Two-letter code (`en` / `nl`).
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Dutch => "nl",
        }
    }

    /// Language name used in the system prompt.
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Dutch => "Dutch",
        }
    }

    /// Collapse any detector code to a supported language.
    pub fn from_code(code: &str) -> Self {
        if code.trim().to_lowercase().starts_with("nl") {
            Language::Dutch
        } else {
            Language::English
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Detects the language of a question.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Result<Language>;
}

/// Trigram-based detector backed by `whatlang`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<Language> {
        let info = whatlang::detect(text)
            .ok_or_else(|| Error::InvalidArgument("language not detectable".to_string()))?;

        Ok(Language::from_code(info.lang().code()))
    }
}

/// Run a detector, falling back to English on failure.
pub fn detect_or_default(detector: &dyn LanguageDetector, text: &str) -> Language {
    match detector.detect(text) {
        Ok(lang) => lang,
        Err(err) => {
            tracing::debug!("Language detection failed, using English: {}", err);
            Language::English
        }
    }
}
