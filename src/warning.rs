//! Non-fatal conditions reported alongside the tidied output.

use std::fmt;

use serde::Serialize;

use crate::options::DuplicateRule;

/// Machine-readable warning kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    MissingKey,
    DuplicateEntry { rule: DuplicateRule },
    DoiLookupError,
    DoiLookupSuccess,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::MissingKey => "MISSING_KEY",
            WarningCode::DuplicateEntry { .. } => "DUPLICATE_ENTRY",
            WarningCode::DoiLookupError => "DOI_LOOKUP_ERROR",
            WarningCode::DoiLookupSuccess => "DOI_LOOKUP_SUCCESS",
        }
    }
}

/// A warning with a human-readable message.
///
/// Serializes flat, e.g. `{"code":"DUPLICATE_ENTRY","rule":"doi","message":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    #[serde(flatten)]
    pub code: WarningCode,
    pub message: String,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}
