//! Secondary image request referenced by ground overlays.

use url::form_urlencoded::Serializer;

use crate::application::pagination::normalize_base_url;
use crate::domain::entities::{LayerSource, RemoteOws, RemoteOwsKind};
use crate::domain::request::RenderRequest;
use crate::domain::types::QualifiedName;

/// Marker telling the image endpoint to render everything as a raster.
const RASTER_FORMAT_OPTIONS: &str = "KMSCORE:0;";

/// One layer drawn into an overlay image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayLayer {
    pub name: QualifiedName,
    pub style: String,
    pub source: LayerSource,
}

#[derive(Debug, Clone)]
pub struct OverlayUrlBuilder {
    base_url: String,
    image_format: String,
}

impl OverlayUrlBuilder {
    pub fn new(base_url: &str, image_format: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            image_format: image_format.into(),
        }
    }

    /// GetMap URL reproducing the request's bbox, size and srs for `layers`,
    /// with a transparent background.
    pub fn href(&self, request: &RenderRequest, layers: &[OverlayLayer]) -> String {
        let names = layers
            .iter()
            .map(|layer| layer.name.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let styles = layers
            .iter()
            .map(|layer| layer.style.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let mut serializer = Serializer::new(String::new());
        serializer
            .append_pair("service", "wms")
            .append_pair("request", "GetMap")
            .append_pair("version", "1.1.1")
            .append_pair("format", &self.image_format)
            .append_pair("layers", &names)
            .append_pair("styles", &styles)
            .append_pair("height", &request.height.to_string())
            .append_pair("width", &request.width.to_string())
            .append_pair("transparent", "true")
            .append_pair("bbox", &request.bbox.to_param())
            .append_pair("srs", &request.srs)
            .append_pair("format_options", RASTER_FORMAT_OPTIONS);

        if !request.feature_ids.is_empty() {
            serializer.append_pair("featureid", &request.feature_ids.join(","));
        }
        if let Some(filter) = &request.filter {
            serializer.append_pair("cql_filter", filter);
        }
        if let Some(remote) = remote_source(layers) {
            let kind = match remote.kind {
                RemoteOwsKind::Wfs => "wfs",
            };
            serializer
                .append_pair("remote_ows_type", kind)
                .append_pair("remote_ows_url", &remote.url);
        }
        for (name, value) in &request.passthrough {
            serializer.append_pair(name, value);
        }

        format!("{}wms?{}", self.base_url, serializer.finish())
    }
}

fn remote_source(layers: &[OverlayLayer]) -> Option<&RemoteOws> {
    layers.iter().find_map(|layer| match &layer.source {
        LayerSource::Remote(remote) => Some(remote),
        LayerSource::Local => None,
    })
}
