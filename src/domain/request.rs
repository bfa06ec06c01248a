//! Map request model and its key-value-pair parser.

use std::collections::BTreeMap;

use url::form_urlencoded;

use crate::domain::entities::{RemoteOws, RemoteOwsKind};
use crate::domain::error::DomainError;
use crate::domain::types::{BoundingBox, OutputFormat, QualifiedName};

const DEFAULT_SRS: &str = "EPSG:4326";

/// Parameters consumed by the parser; anything else is carried along verbatim.
const KNOWN_PARAMETERS: &[&str] = &[
    "service",
    "request",
    "version",
    "layers",
    "styles",
    "bbox",
    "width",
    "height",
    "srs",
    "crs",
    "format",
    "featureid",
    "cql_filter",
    "startindex",
    "maxfeatures",
    "format_options",
    "transparent",
    "remote_ows_type",
    "remote_ows_url",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRequest {
    pub name: QualifiedName,
    /// Requested style name; `None` asks for the layer default.
    pub style: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub layers: Vec<LayerRequest>,
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub srs: String,
    pub format: OutputFormat,
    pub feature_ids: Vec<String>,
    /// Raw attribute filter (`cql_filter`), forwarded to feature sources.
    pub filter: Option<String>,
    pub start_index: Option<u64>,
    pub max_features: Option<u64>,
    /// Lower-cased option names mapped to their raw values.
    pub format_options: BTreeMap<String, String>,
    pub remote: Option<RemoteOws>,
    /// Unrecognised parameters, lower-cased names in request order.
    pub passthrough: Vec<(String, String)>,
}

impl RenderRequest {
    /// Parse a raw query string (`layers=...&bbox=...`).
    pub fn from_query(query: &str) -> Result<Self, DomainError> {
        let query = query.trim_start_matches('?');
        Self::from_pairs(
            form_urlencoded::parse(query.as_bytes())
                .map(|(name, value)| (name.into_owned(), value.into_owned())),
        )
    }

    /// Parse already decoded parameters. Names are matched case-insensitively
    /// and the last occurrence of a repeated parameter wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params: BTreeMap<String, String> = BTreeMap::new();
        let mut passthrough = Vec::new();
        for (name, value) in pairs {
            let name = name.as_ref().trim().to_ascii_lowercase();
            let value = value.into();
            if KNOWN_PARAMETERS.contains(&name.as_str()) {
                params.insert(name, value);
            } else if !name.is_empty() {
                passthrough.push((name, value));
            }
        }

        let layer_names = parse_layer_names(params.get("layers"))?;
        let styles = parse_styles(params.get("styles"), layer_names.len())?;
        let layers = layer_names
            .into_iter()
            .zip(styles)
            .map(|(name, style)| LayerRequest { name, style })
            .collect();

        let bbox: BoundingBox = params
            .get("bbox")
            .ok_or(DomainError::missing("bbox"))?
            .parse()?;
        let width = parse_dimension(&params, "width")?;
        let height = parse_dimension(&params, "height")?;
        let srs = params
            .get("srs")
            .or_else(|| params.get("crs"))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_SRS)
            .to_string();
        let format: OutputFormat = params
            .get("format")
            .ok_or(DomainError::missing("format"))?
            .parse()?;

        let feature_ids = params
            .get("featureid")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let filter = params
            .get("cql_filter")
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .map(str::to_string);

        let start_index = parse_count(&params, "startindex")?;
        let max_features = parse_count(&params, "maxfeatures")?;
        if max_features == Some(0) {
            return Err(DomainError::invalid(
                "maxfeatures",
                "must be greater than zero",
            ));
        }

        let format_options = params
            .get("format_options")
            .map(|raw| parse_format_options(raw))
            .unwrap_or_default();
        let remote = parse_remote(&params)?;

        Ok(Self {
            layers,
            bbox,
            width,
            height,
            srs,
            format,
            feature_ids,
            filter,
            start_index,
            max_features,
            format_options,
            remote,
            passthrough,
        })
    }

    /// The only requested layer, when the request is unambiguous.
    pub fn single_layer(&self) -> Option<&LayerRequest> {
        match self.layers.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

fn parse_layer_names(raw: Option<&String>) -> Result<Vec<QualifiedName>, DomainError> {
    let raw = raw.map(|value| value.trim()).unwrap_or_default();
    if raw.is_empty() {
        return Err(DomainError::missing("layers"));
    }
    raw.split(',').map(str::parse::<QualifiedName>).collect()
}

fn parse_styles(
    raw: Option<&String>,
    layer_count: usize,
) -> Result<Vec<Option<String>>, DomainError> {
    let raw = raw.map(String::as_str).unwrap_or_default();
    if raw.trim().is_empty() {
        return Ok(vec![None; layer_count]);
    }
    // Empty entries are kept: `BasicPolygons,` styles two layers.
    let styles: Vec<Option<String>> = raw
        .split(',')
        .map(str::trim)
        .map(|style| (!style.is_empty()).then(|| style.to_string()))
        .collect();
    if styles.len() != layer_count {
        return Err(DomainError::StyleCountMismatch {
            layers: layer_count,
            styles: styles.len(),
        });
    }
    Ok(styles)
}

fn parse_dimension(
    params: &BTreeMap<String, String>,
    name: &'static str,
) -> Result<u32, DomainError> {
    let raw = params.get(name).ok_or(DomainError::missing(name))?;
    let value: u32 = raw.trim().parse().map_err(|_| {
        DomainError::invalid(name, format!("`{raw}` is not a positive integer"))
    })?;
    if value == 0 {
        return Err(DomainError::invalid(name, "must be greater than zero"));
    }
    Ok(value)
}

fn parse_count(
    params: &BTreeMap<String, String>,
    name: &'static str,
) -> Result<Option<u64>, DomainError> {
    match params.get(name).map(|value| value.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            DomainError::invalid(name, format!("`{raw}` is not a non-negative integer"))
        }),
    }
}

/// Split `kmltitle:My title;rellinks:true` into lower-cased keys and raw values.
/// A bare key is read as `true`.
pub fn parse_format_options(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (key, value) = entry.split_once(':').unwrap_or((entry, "true"));
            let key = key.trim().to_ascii_lowercase();
            (!key.is_empty()).then(|| (key, value.trim().to_string()))
        })
        .collect()
}

fn parse_remote(params: &BTreeMap<String, String>) -> Result<Option<RemoteOws>, DomainError> {
    let kind = params.get("remote_ows_type").map(|value| value.trim());
    let url = params.get("remote_ows_url").map(|value| value.trim());
    match (kind, url) {
        (None, None) => Ok(None),
        (Some(kind), Some(url)) if !url.is_empty() => {
            if !kind.eq_ignore_ascii_case("wfs") {
                return Err(DomainError::invalid(
                    "remote_ows_type",
                    format!("unsupported remote service type `{kind}`"),
                ));
            }
            Ok(Some(RemoteOws {
                kind: RemoteOwsKind::Wfs,
                url: url.to_string(),
            }))
        }
        (Some(_), _) => Err(DomainError::missing("remote_ows_url")),
        (None, Some(_)) => Err(DomainError::missing("remote_ows_type")),
    }
}
