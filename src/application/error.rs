use std::error::Error as StdError;

use thiserror::Error;

use crate::application::archive::ArchiveError;
use crate::application::repos::RepoError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;
use crate::presentation::kml::EncodingError;

/// Flattened view of an error and its `source()` chain, used for logging.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn from_message(source: &'static str, message: impl Into<String>) -> Self {
        Self {
            source,
            messages: vec![message.into()],
        }
    }

    /// Messages joined outermost first: `render failed: layer not found`.
    pub fn joined(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error(transparent)]
    InvalidRequest(#[from] DomainError),
    #[error("layer `{layer}` not found")]
    LayerNotFound { layer: String },
    #[error("style `{style}` could not be resolved for layer `{layer}`")]
    StyleResolution { layer: String, style: String },
    #[error("remote source `{url}` unavailable for layer `{layer}`")]
    RemoteSourceUnavailable {
        layer: String,
        url: String,
        #[source]
        source: RepoError,
    },
    #[error("features of layer `{layer}` could not be read")]
    Features {
        layer: String,
        #[source]
        source: RepoError,
    },
    #[error("catalog lookup failed")]
    Catalog(#[source] RepoError),
    #[error("overlay image for `{layers}` could not be rendered")]
    OverlayRender {
        layers: String,
        #[source]
        source: RepoError,
    },
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("archive could not be written")]
    Archive(#[from] ArchiveError),
}

impl MapError {
    /// Whether the error is the caller's fault rather than a server failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MapError::InvalidRequest(_) | MapError::LayerNotFound { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the command line front end.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Map(err) if err.is_client_error() => 2,
            AppError::Domain(_) => 2,
            AppError::Infra(InfraError::Configuration { .. }) => 3,
            _ => 1,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
