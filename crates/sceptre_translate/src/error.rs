//! Translation errors.

use std::fmt;

use sceptre_process::InvalidComparisonError;
use sceptre_rules::RuleConstructionError;

/// A model defect surfaced during translation.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// A write on a private channel that nothing can ever read.
    NoReader { channel: String },
    /// A rule the translator tried to build was structurally invalid.
    Rule(RuleConstructionError),
    /// A `let` binding could not be compiled into branch restrictions.
    Comparison(InvalidComparisonError),
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationError::NoReader { channel } => {
                write!(f, "nothing ever reads channel '{}'", channel)
            }
            TranslationError::Rule(inner) => write!(f, "{}", inner),
            TranslationError::Comparison(inner) => write!(f, "{}", inner),
        }
    }
}

impl std::error::Error for TranslationError {}

impl From<RuleConstructionError> for TranslationError {
    fn from(inner: RuleConstructionError) -> TranslationError {
        TranslationError::Rule(inner)
    }
}

impl From<InvalidComparisonError> for TranslationError {
    fn from(inner: InvalidComparisonError) -> TranslationError {
        TranslationError::Comparison(inner)
    }
}

/// Result alias for translation.
pub type TranslationResult<T> = Result<T, TranslationError>;
