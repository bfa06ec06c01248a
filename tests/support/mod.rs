#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use kmlmap::application::format_options::{FormatDefaults, KmScore};
use kmlmap::application::repos::{
    FeatureQuery, FeatureSource, FeatureStream, OverlayRenderer, RepoError,
};
use kmlmap::application::service::{KmlMapService, MapServiceConfig};
use kmlmap::infra::catalog::CatalogStore;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-overlay";

pub const WORLD: &str = "bbox=-180,-90,180,90&width=1024&height=1024&srs=EPSG:4326";

pub const KML: &str = "format=application%2Fvnd.google-earth.kml%2Bxml";

pub const KMZ: &str = "format=application%2Fvnd.google-earth.kmz";

pub const CATALOG: &str = r#"
[[styles]]
name = "BasicPolygons"
fill_color = "7f00ff00"

[[styles]]
name = "Bridges"
icon_href = "http://example.com/bridge.png"

[[styles]]
name = "polygon"
line_color = "ff0000ff"
line_width = 2.0

[[layers]]
name = "cite:BasicPolygons"
kind = "vector"
default_style = "BasicPolygons"

[[layers.features]]
id = "BasicPolygons.1107531493630"
geometry = { type = "Polygon", coordinates = [[[-2, 6], [1, 10], [5, 6], [-2, 6]]] }
attributes = { ID = "t0001" }

[[layers.features]]
id = "BasicPolygons.1107531493643"
geometry = { type = "Polygon", coordinates = [[[-1, 0], [0, 1], [1, 0], [0, -1], [-1, 0]]] }
attributes = { ID = "t0002" }

[[layers.features]]
id = "BasicPolygons.1107531493644"
geometry = { type = "Polygon", coordinates = [[[-2, -4], [-1, -1], [2, -4], [-2, -4]]] }
attributes = { ID = "t0003" }

[[layers]]
name = "cite:Bridges"
kind = "vector"
templates = { title = "${NAME.value}" }

[[layers.features]]
id = "Bridges.1107531599613"
geometry = { type = "Point", coordinates = [0.0002, 0.0007] }
attributes = { FID = "110", NAME = "Cam Bridge" }

[[layers]]
name = "wcs:DEM"
kind = "raster"
default_style = "raster"

[[layers]]
name = "sf:StormObs"
kind = "vector"
templates = { time = "${obs_datetime.value}" }

[[layers.features]]
id = "storm_obs.1321870537475"
geometry = { type = "Point", coordinates = [-90.5, 30.25] }
attributes = { event_type = "2", obs_datetime = 1994-07-01T10:00:00Z }
"#;

pub fn catalog() -> Arc<CatalogStore> {
    Arc::new(CatalogStore::from_toml(CATALOG).expect("fixture catalog is valid"))
}

/// Overlay renderer that records every requested href.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub requests: Mutex<Vec<String>>,
}

impl RecordingRenderer {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("renderer lock").clone()
    }
}

impl OverlayRenderer for RecordingRenderer {
    fn render(&self, href: &str) -> Result<Bytes, RepoError> {
        self.requests
            .lock()
            .expect("renderer lock")
            .push(href.to_string());
        Ok(Bytes::from_static(PNG_BYTES))
    }
}

pub struct FailingRenderer;

impl OverlayRenderer for FailingRenderer {
    fn render(&self, href: &str) -> Result<Bytes, RepoError> {
        Err(RepoError::unavailable(href, "connection refused"))
    }
}

/// Remote feature source whose upstream is always down.
pub struct UnreachableRemote;

impl FeatureSource for UnreachableRemote {
    fn features(&self, _query: &FeatureQuery<'_>) -> Result<FeatureStream, RepoError> {
        Err(RepoError::unavailable(
            "http://localhost:1/geoserver/wfs",
            "connection refused",
        ))
    }

    fn count(&self, _query: &FeatureQuery<'_>) -> Result<u64, RepoError> {
        Err(RepoError::unavailable(
            "http://localhost:1/geoserver/wfs",
            "connection refused",
        ))
    }
}

pub fn service_with(renderer: Arc<dyn OverlayRenderer>, config: MapServiceConfig) -> KmlMapService {
    let catalog = catalog();
    KmlMapService::new(catalog.clone(), catalog.clone(), catalog, renderer, config)
        .with_remote_features(Arc::new(UnreachableRemote))
}

pub fn service() -> KmlMapService {
    service_with(Arc::new(RecordingRenderer::default()), MapServiceConfig::default())
}

pub fn config_with_score(score: u8) -> MapServiceConfig {
    MapServiceConfig {
        defaults: FormatDefaults {
            score: KmScore::new(score).expect("score in range"),
            include_attributes: true,
        },
        ..MapServiceConfig::default()
    }
}

/// Build a GetMap query for `layers` plus `extra` parameters.
pub fn query(layers: &str, format: &str, extra: &str) -> String {
    let mut query = format!("service=wms&request=GetMap&version=1.1.1&layers={layers}&{WORLD}&{format}");
    if !extra.is_empty() {
        query.push('&');
        query.push_str(extra);
    }
    query
}
