//! Error types for rtc-session.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all session operations.
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Failed to get session token (status {status}): {body}")]
    TokenAcquisition { status: u16, body: String },

    #[error("Microphone unavailable: {0}")]
    MediaAcquisition(String),

    #[error("Failed to get remote description{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Signaling { status: Option<u16>, message: String },

    #[error("Data channel error: {0}")]
    Channel(String),

    #[error("Error parsing event: {message}")]
    Parse { message: String, raw: String },

    #[error("{0}")]
    Validation(String),

    #[error("Session update timed out after {0}ms. Settings may not be changeable if audio has already been generated.")]
    UpdateTimeout(u64),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Search failed (status {status}): {message}")]
    Search { status: u16, message: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl RealtimeError {
    /// Create a signaling error for a rejected SDP exchange.
    pub fn signaling(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Signaling {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TokenAcquisition { .. } => ErrorCategory::Token,
            Self::MediaAcquisition(_) => ErrorCategory::Media,
            Self::Signaling { .. } => ErrorCategory::Signaling,
            Self::Channel(_) => ErrorCategory::Channel,
            Self::Parse { .. } => ErrorCategory::Parse,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::UpdateTimeout(_) | Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Network(_) => ErrorCategory::Network,
            Self::Search { .. } => ErrorCategory::Search,
            Self::InvalidState(_) => ErrorCategory::State,
            Self::Serialization(_) | Self::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Single-line message suitable for an error banner.
    pub fn user_message(&self) -> String {
        self.to_string().lines().next().unwrap_or_default().to_string()
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Token | ErrorCategory::Signaling | ErrorCategory::Network => {
                RecoverySuggestion::Reconnect
            }
            ErrorCategory::Media => RecoverySuggestion::CheckMicrophone,
            ErrorCategory::Validation | ErrorCategory::Search => RecoverySuggestion::FixInput,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            _ => RecoverySuggestion::Ignore,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RealtimeError>;
