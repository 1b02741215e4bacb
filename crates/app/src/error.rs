use thiserror::Error;

/// Raised when a response field fails fixture validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is not a UUID: {value}")]
    InvalidUuid { field: String, value: String },
    #[error("{field} is missing")]
    MissingField { field: String },
    #[error("{field} is not less than a second old: {value}")]
    StaleTimestamp { field: String, value: String },
    #[error("{field} has an unexpected shape: {message}")]
    Shape { field: String, message: String },
}

impl ValidationError {
    /// Name (or JSON path) of the field that failed.
    pub fn field(&self) -> &str {
        match self {
            Self::InvalidUuid { field, .. }
            | Self::MissingField { field }
            | Self::StaleTimestamp { field, .. }
            | Self::Shape { field, .. } => field,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("token rejected: {0}")]
    Verify(#[source] jsonwebtoken::errors::Error),
}
