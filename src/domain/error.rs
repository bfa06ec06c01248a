use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("missing required parameter `{name}`")]
    MissingParameter { name: &'static str },
    #[error("invalid value for parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("requested {layers} layers but {styles} styles")]
    StyleCountMismatch { layers: usize, styles: usize },
    #[error("domain invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn missing(name: &'static str) -> Self {
        Self::MissingParameter { name }
    }

    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
