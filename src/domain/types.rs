//! Shared value types for map requests and layer metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

pub const KML_MIME_TYPE: &str = "application/vnd.google-earth.kml+xml";
pub const KMZ_MIME_TYPE: &str = "application/vnd.google-earth.kmz";

/// Layer name optionally qualified by a namespace prefix (`cite:Bridges`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    prefix: Option<String>,
    local: String,
}

impl QualifiedName {
    pub fn new(prefix: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            prefix: prefix
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            local: local.into(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    /// File name stem used for attachments: `cite-BasicPolygons`.
    pub fn file_stem(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}-{}", self.local),
            None => self.local.clone(),
        }
    }
}

impl FromStr for QualifiedName {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (prefix, local) = match trimmed.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, trimmed),
        };
        if local.trim().is_empty() {
            return Err(DomainError::invalid(
                "layers",
                format!("`{raw}` is not a layer name"),
            ));
        }
        Ok(Self::new(prefix, local.trim()))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{prefix}:{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

impl Serialize for QualifiedName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QualifiedName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Axis-aligned extent in request coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, DomainError> {
        let values = [min_x, min_y, max_x, max_y];
        if values.iter().any(|value| !value.is_finite()) {
            return Err(DomainError::invalid("bbox", "coordinates must be finite"));
        }
        if min_x > max_x || min_y > max_y {
            return Err(DomainError::invalid(
                "bbox",
                "minimum corner must not exceed maximum corner",
            ));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Comma separated form used when a request is re-issued (`-180.0,-90.0,180.0,90.0`).
    pub fn to_param(&self) -> String {
        format!(
            "{:?},{:?},{:?},{:?}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

impl FromStr for BoundingBox {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(DomainError::invalid(
                "bbox",
                format!("expected four comma separated numbers, got `{raw}`"),
            ));
        }
        let mut values = [0f64; 4];
        for (slot, part) in values.iter_mut().zip(parts) {
            *slot = part
                .parse()
                .map_err(|_| DomainError::invalid("bbox", format!("`{part}` is not a number")))?;
        }
        Self::new(values[0], values[1], values[2], values[3])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Vector,
    Raster,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Vector => "vector",
            LayerKind::Raster => "raster",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Kml,
    Kmz,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Kml => KML_MIME_TYPE,
            OutputFormat::Kmz => KMZ_MIME_TYPE,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Kml => "kml",
            OutputFormat::Kmz => "kmz",
        }
    }

    pub fn is_archive(self) -> bool {
        matches!(self, OutputFormat::Kmz)
    }
}

impl FromStr for OutputFormat {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        // Query decoding turns the `+` of the MIME type into a space.
        let normalized = raw.trim().to_ascii_lowercase().replace(' ', "+");
        match normalized.as_str() {
            "kml" | KML_MIME_TYPE => Ok(OutputFormat::Kml),
            "kmz" | KMZ_MIME_TYPE | "application/vnd.google-earth.kmz+xml" => {
                Ok(OutputFormat::Kmz)
            }
            _ => Err(DomainError::invalid(
                "format",
                format!("unsupported output format `{raw}`"),
            )),
        }
    }
}
