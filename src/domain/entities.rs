//! Catalog records and features handed to the rendering pipeline.

use std::fmt;

use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};

use crate::domain::types::{LayerKind, QualifiedName};

/// Typed attribute value attached to a feature.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(Date),
    DateTime(OffsetDateTime),
}

impl AttributeValue {
    pub fn is_temporal(&self) -> bool {
        matches!(self, AttributeValue::Date(_) | AttributeValue::DateTime(_))
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Bool(value) => write!(f, "{value}"),
            AttributeValue::Integer(value) => write!(f, "{value}"),
            AttributeValue::Float(value) => write!(f, "{value}"),
            AttributeValue::Text(value) => f.write_str(value),
            AttributeValue::Date(value) => write!(f, "{value}"),
            AttributeValue::DateTime(value) => match value.format(&Rfc3339) {
                Ok(text) => f.write_str(&text),
                Err(_) => write!(f, "{value}"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

/// A single vector feature: identifier, geometry and ordered attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: String,
    pub geometry: Geometry<f64>,
    pub attributes: Vec<Attribute>,
}

impl Feature {
    pub fn new(id: impl Into<String>, geometry: Geometry<f64>) -> Self {
        Self {
            id: id.into(),
            geometry,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            value,
        });
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| &attribute.value)
    }
}

/// Per-layer text templates with `${attribute.value}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerTemplates {
    pub title: Option<String>,
    pub description: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOwsKind {
    Wfs,
}

/// Remote OGC service a layer's features are read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOws {
    pub kind: RemoteOwsKind,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSource {
    Local,
    Remote(RemoteOws),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub name: QualifiedName,
    pub kind: LayerKind,
    pub default_style: String,
    pub templates: LayerTemplates,
    pub source: LayerSource,
}

impl LayerInfo {
    pub fn new(name: QualifiedName, kind: LayerKind, default_style: impl Into<String>) -> Self {
        Self {
            name,
            kind,
            default_style: default_style.into(),
            templates: LayerTemplates::default(),
            source: LayerSource::Local,
        }
    }

    /// Layer served by a remote WFS rather than the local catalog.
    pub fn remote(name: QualifiedName, remote: RemoteOws) -> Self {
        Self {
            name,
            kind: LayerKind::Vector,
            default_style: String::new(),
            templates: LayerTemplates::default(),
            source: LayerSource::Remote(remote),
        }
    }
}

/// Rendering style subset that maps onto KML `<Style>` elements.
///
/// Colors use the KML `aabbggrr` notation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Style {
    pub name: String,
    pub line_color: Option<String>,
    pub line_width: Option<f64>,
    pub fill_color: Option<String>,
    pub icon_href: Option<String>,
}

impl Style {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
