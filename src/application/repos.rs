//! Provider traits the rendering pipeline reads layers, features, styles and images through.

use bytes::Bytes;
use thiserror::Error;

use crate::domain::entities::{Feature, LayerInfo, Style};
use crate::domain::types::{BoundingBox, QualifiedName};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("upstream `{url}` unavailable: {reason}")]
    Unavailable { url: String, reason: String },
}

impl RepoError {
    pub fn unavailable(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Lazily produced, request-scoped feature sequence.
pub type FeatureStream = Box<dyn Iterator<Item = Feature> + Send>;

/// Filter handed to a feature source. The source applies the id filter, the
/// attribute filter and the bbox; windowing is left to the caller.
#[derive(Debug, Clone, Copy)]
pub struct FeatureQuery<'a> {
    pub layer: &'a LayerInfo,
    pub feature_ids: &'a [String],
    /// Raw `cql_filter` expression.
    pub filter: Option<&'a str>,
    pub bbox: BoundingBox,
}

impl FeatureQuery<'_> {
    pub fn matches_id(&self, id: &str) -> bool {
        self.feature_ids.is_empty() || self.feature_ids.iter().any(|wanted| wanted == id)
    }
}

pub trait LayerCatalog: Send + Sync {
    fn find_layer(&self, name: &QualifiedName) -> Result<Option<LayerInfo>, RepoError>;

    fn list_layers(&self) -> Result<Vec<LayerInfo>, RepoError>;
}

pub trait FeatureSource: Send + Sync {
    fn features(&self, query: &FeatureQuery<'_>) -> Result<FeatureStream, RepoError>;

    /// Number of features `features` would yield for the same query.
    fn count(&self, query: &FeatureQuery<'_>) -> Result<u64, RepoError>;
}

pub trait StyleResolver: Send + Sync {
    fn find_style(&self, name: &str) -> Result<Option<Style>, RepoError>;
}

/// Renders the secondary image request an overlay points at.
pub trait OverlayRenderer: Send + Sync {
    fn render(&self, href: &str) -> Result<Bytes, RepoError>;
}
