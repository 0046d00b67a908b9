use thiserror::Error;

/// Application-wide error types for Pagewatch.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or the response could not be read.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error (DNS, refused, reset, proxy handshake).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Response body could not be parsed (invalid JSON, unusable HTML).
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The headless rendering engine is not available.
    ///
    /// Never fatal for a check: the fetcher falls back to static mode.
    #[error("Render engine unavailable: {0}")]
    RenderUnavailable(String),

    /// A single notification channel failed to deliver.
    #[error("Notification error ({channel}): {message}")]
    NotificationError { channel: String, message: String },

    /// Storage collaborator failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true for errors raised while retrieving page content.
    ///
    /// These abort the current check cycle only; the target stays scheduled.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_)
                | AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::ParseError(_)
        )
    }

    /// Shorthand for a per-channel notification failure.
    pub fn notification(channel: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::NotificationError {
            channel: channel.into(),
            message: message.into(),
        }
    }
}
