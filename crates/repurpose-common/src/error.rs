use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepurposeError {
    /// A required request field was missing or empty. Raised before any oracle call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(String),

    /// An external oracle timed out, returned non-2xx, or failed outright.
    #[error("Oracle error ({oracle}): {message}")]
    Oracle { oracle: String, message: String },

    #[error("Malformed oracle response: {0}")]
    ResponseShape(#[from] crate::json::JsonShapeError),

    /// The stage cannot produce any output at all.
    #[error("Stage error: {0}")]
    Stage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepurposeError {
    pub fn oracle(oracle: &str, message: impl std::fmt::Display) -> Self {
        Self::Oracle { oracle: oracle.to_string(), message: message.to_string() }
    }

    /// True for errors the caller caused (bad request) rather than the pipeline.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, RepurposeError>;

/// Reject an empty or whitespace-only required field.
pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RepurposeError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}
