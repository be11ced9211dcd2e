//! Error type shared by the importer.
//!
//! Three families of failure exist: input errors (bad file, empty code
//! list, no group chosen), network errors (non-2xx status, transport or
//! decode failure) and application errors reported by the backend through
//! a `success: false` body.

use thiserror::Error;

/// Fallback shown when a network failure carries no server message.
pub const GENERIC_NETWORK_MESSAGE: &str = "The import could not be completed, please try again later";

#[derive(Debug, Error)]
pub enum ImportError {
    // ── Input ────────────────────────────────────────────────────────────────
    #[error("File too large ({size} bytes), files must be smaller than {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Unsupported file type '{0}', please use a TXT, CSV or Excel file")]
    UnsupportedFileType(String),

    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to read spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("No stock codes could be extracted from the file")]
    NoCodesFound,

    #[error("Please enter stock codes or load a file")]
    EmptyCodeList,

    #[error("Please choose auto categories or enter a group name")]
    MissingGroup,

    // ── Network ──────────────────────────────────────────────────────────────
    #[error("Request failed: HTTP {status} {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    // ── Application ──────────────────────────────────────────────────────────
    #[error("{0}")]
    Rejected(String),

    #[error("No valid stocks to import")]
    NoValidStocks,

    #[error("Cannot move from {from} to {to}")]
    InvalidStep { from: String, to: String },

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;

impl ImportError {
    /// Errors caused by what the user entered. These never touch session state.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::FileTooLarge { .. }
                | Self::UnsupportedFileType(_)
                | Self::FileRead(_)
                | Self::Spreadsheet(_)
                | Self::NoCodesFound
                | Self::EmptyCodeList
                | Self::MissingGroup
        )
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Network(_) | Self::Decode(_))
    }

    /// Text suitable for an inline alert.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { message, .. } if !message.trim().is_empty() => message.clone(),
            Self::Http { .. } | Self::Network(_) | Self::Decode(_) => {
                GENERIC_NETWORK_MESSAGE.to_string()
            }
            Self::Rejected(msg) if msg.trim().is_empty() => "Unknown error".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ImportError::NoCodesFound.is_input_error());
        assert!(ImportError::MissingGroup.is_input_error());
        assert!(!ImportError::Rejected("x".into()).is_input_error());

        let http = ImportError::Http { status: 500, message: String::new() };
        assert!(http.is_network_error());
        assert!(!http.is_input_error());
    }

    #[test]
    fn test_user_message_prefers_server_text() {
        let err = ImportError::Http { status: 400, message: "group is locked".into() };
        assert_eq!(err.user_message(), "group is locked");

        let err = ImportError::Http { status: 502, message: "  ".into() };
        assert_eq!(err.user_message(), GENERIC_NETWORK_MESSAGE);

        let err = ImportError::Rejected(String::new());
        assert_eq!(err.user_message(), "Unknown error");
    }
}
