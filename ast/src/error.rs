//! Error types for grammar setup

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AstError {
    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Failed to detect language for file: {0}")]
    LanguageDetectionFailed(String),

    #[error("Grammar for {language} could not be loaded: {reason}")]
    Grammar { language: String, reason: String },
}

pub type AstResult<T> = Result<T, AstError>;
