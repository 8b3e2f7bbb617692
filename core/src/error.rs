//! Error types for AI Mail Core

use std::path::PathBuf;

/// Result type alias for AI Mail operations
pub type MailResult<T> = Result<T, MailError>;

/// Main error type for AI Mail
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to create a platform directory
    #[error("Failed to create directory: {0}")]
    DirCreateFailed(PathBuf),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the mail API
    #[error("{endpoint} returned HTTP {status}")]
    Status {
        /// Endpoint that was called
        endpoint: String,
        /// HTTP status code
        status: u16,
    },

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// Push transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Parse errors for push frames and message content
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rejected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid state errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Generic errors
    #[error("Error: {0}")]
    Generic(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for MailError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl MailError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new generic error
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a status error for an endpoint
    pub fn status(endpoint: impl Into<String>, status: u16) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status,
        }
    }

    /// Whether a retry can be expected to succeed without user action
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Http(_) | Self::WebSocket(_) | Self::Transport(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}
