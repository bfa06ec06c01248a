mod support;

use std::sync::Arc;
use std::time::Duration;

use httpmock::MockServer;
use kmlmap::application::repos::{FeatureQuery, FeatureSource, OverlayRenderer, RepoError};
use kmlmap::application::service::{KmlMapService, MapServiceConfig};
use kmlmap::domain::request::RenderRequest;
use kmlmap::domain::entities::{AttributeValue, LayerInfo, RemoteOws, RemoteOwsKind};
use kmlmap::domain::types::BoundingBox;
use kmlmap::infra::client::build_client;
use kmlmap::infra::overlay::HttpOverlayRenderer;
use kmlmap::infra::remote::WfsFeatureSource;
use support::{KML, RecordingRenderer, query};
use url::form_urlencoded::byte_serialize;

const STATES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "states.1",
      "geometry": { "type": "Point", "coordinates": [-89.5, 40.0] },
      "properties": { "STATE_NAME": "Illinois", "PERSONS": 11430602 }
    },
    {
      "type": "Feature",
      "geometry": { "type": "LineString", "coordinates": [[-100, 40], [-90, 45]] },
      "properties": { "STATE_NAME": "Nowhere" }
    },
    {
      "type": "Feature",
      "id": "states.3",
      "geometry": null,
      "properties": {}
    }
  ]
}"#;

fn remote_layer(url: String) -> LayerInfo {
    LayerInfo::remote(
        "topp:states".parse().expect("valid name"),
        RemoteOws {
            kind: RemoteOwsKind::Wfs,
            url,
        },
    )
}

fn world() -> BoundingBox {
    BoundingBox::new(-180.0, -90.0, 180.0, 90.0).expect("valid bbox")
}

#[test]
fn wfs_source_reads_geojson_features() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET")
            .path("/geoserver/wfs")
            .query_param("request", "GetFeature")
            .query_param("typeName", "topp:states")
            .query_param("outputFormat", "application/json");
        then.status(200)
            .header("content-type", "application/json")
            .body(STATES);
    });

    let client = build_client(Duration::from_secs(5)).expect("client");
    let source = WfsFeatureSource::new(client);
    let layer = remote_layer(server.url("/geoserver/wfs"));
    let query = FeatureQuery {
        layer: &layer,
        feature_ids: &[],
        filter: None,
        bbox: world(),
    };

    let features: Vec<_> = source.features(&query).expect("features").collect();
    mock.assert();

    let ids: Vec<_> = features.iter().map(|feature| feature.id.as_str()).collect();
    assert_eq!(ids, vec!["states.1", "states.2"]);
    assert_eq!(
        features[0].attribute("STATE_NAME"),
        Some(&AttributeValue::Text("Illinois".into()))
    );
    assert_eq!(
        features[0].attribute("PERSONS"),
        Some(&AttributeValue::Integer(11_430_602))
    );
}

#[test]
fn wfs_errors_surface_as_unavailable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/geoserver/wfs");
        then.status(503).body("service down");
    });

    let source = WfsFeatureSource::new(build_client(Duration::from_secs(5)).expect("client"));
    let layer = remote_layer(server.url("/geoserver/wfs"));
    let query = FeatureQuery {
        layer: &layer,
        feature_ids: &[],
        filter: None,
        bbox: world(),
    };

    let err = source.features(&query).err().expect("upstream failure");
    assert!(matches!(err, RepoError::Unavailable { .. }));
}

const POPULOUS_STATES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "states.5",
      "geometry": { "type": "Point", "coordinates": [-119.5, 37.0] },
      "properties": { "STATE_NAME": "California", "PERSONS": 29760021 }
    }
  ]
}"#;

#[test]
fn cql_filter_reaches_remote_get_feature() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET")
            .path("/geoserver/wfs")
            .query_param("request", "GetFeature")
            .query_param("typeName", "topp:states")
            .query_param("CQL_FILTER", "PERSONS>20000000");
        then.status(200)
            .header("content-type", "application/json")
            .body(POPULOUS_STATES);
    });

    let catalog = support::catalog();
    let remote = WfsFeatureSource::new(build_client(Duration::from_secs(5)).expect("client"));
    let service = KmlMapService::new(
        catalog.clone(),
        catalog.clone(),
        catalog,
        Arc::new(RecordingRenderer::default()),
        MapServiceConfig::default(),
    )
    .with_remote_features(Arc::new(remote));

    let remote_url: String = byte_serialize(server.url("/geoserver/wfs").as_bytes()).collect();
    let request = RenderRequest::from_query(&query(
        "topp:states",
        KML,
        &format!("remote_ows_type=wfs&remote_ows_url={remote_url}&cql_filter=PERSONS%3E20000000"),
    ))
    .expect("valid request");
    let rendered = service.compose(&request).expect("composed");
    mock.assert();

    let folder = &rendered.document.folders()[0];
    let ids: Vec<_> = folder
        .placemarks()
        .map(|placemark| placemark.id.as_str())
        .collect();
    assert_eq!(ids, vec!["states.5"]);
}

#[test]
fn overlay_renderer_returns_image_bytes() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET")
            .path("/geoserver/wms")
            .query_param("layers", "wcs:DEM")
            .query_param("format_options", "KMSCORE:0;");
        then.status(200)
            .header("content-type", "image/png")
            .body(b"\x89PNG\r\n\x1a\nimage".to_vec());
    });

    let renderer = HttpOverlayRenderer::new(build_client(Duration::from_secs(5)).expect("client"));
    let href = format!(
        "{}?service=wms&request=GetMap&layers=wcs%3ADEM&styles=raster&format_options=KMSCORE%3A0%3B",
        server.url("/geoserver/wms")
    );
    let image = renderer.render(&href).expect("image");
    mock.assert();
    assert!(image.starts_with(b"\x89PNG"));
}

#[test]
fn overlay_renderer_rejects_error_status() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/geoserver/wms");
        then.status(500);
    });

    let renderer = HttpOverlayRenderer::new(build_client(Duration::from_secs(5)).expect("client"));
    let err = renderer
        .render(&server.url("/geoserver/wms"))
        .expect_err("server error");
    assert!(matches!(err, RepoError::Unavailable { .. }));
}
