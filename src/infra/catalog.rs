//! File-backed layer catalog.
//!
//! One TOML document lists styles and layers; vector layers carry their
//! features inline:
//!
//! ```toml
//! [[styles]]
//! name = "BasicPolygons"
//! fill_color = "7f00ff00"
//!
//! [[layers]]
//! name = "cite:BasicPolygons"
//! kind = "vector"
//! default_style = "BasicPolygons"
//!
//! [[layers.features]]
//! id = "BasicPolygons.1107531493630"
//! geometry = { type = "Polygon", coordinates = [[[-2, 6], [1, 10], [5, 6], [-2, 6]]] }
//! attributes = { ID = "t0001" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use geo_types::{Coord, Geometry};
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::{info, warn};

use crate::application::repos::{
    FeatureQuery, FeatureSource, FeatureStream, LayerCatalog, RepoError, StyleResolver,
};
use crate::domain::entities::{
    Attribute, AttributeValue, Feature, LayerInfo, LayerTemplates, Style,
};
use crate::domain::filter::AttributeFilter;
use crate::domain::types::{BoundingBox, LayerKind, QualifiedName};
use crate::infra::error::InfraError;
use crate::infra::geojson::GeometryRecord;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogRecord {
    #[serde(default)]
    styles: Vec<Style>,
    #[serde(default)]
    layers: Vec<LayerRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayerRecord {
    name: QualifiedName,
    kind: LayerKind,
    #[serde(default)]
    default_style: Option<String>,
    #[serde(default)]
    templates: LayerTemplates,
    #[serde(default)]
    features: Vec<FeatureEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FeatureEntry {
    id: String,
    geometry: GeometryRecord,
    #[serde(default)]
    attributes: toml::Table,
}

#[derive(Debug)]
struct StoredLayer {
    info: LayerInfo,
    features: Arc<Vec<Feature>>,
}

/// In-memory catalog loaded once from a TOML file.
#[derive(Debug, Default)]
pub struct CatalogStore {
    layers: BTreeMap<QualifiedName, StoredLayer>,
    styles: BTreeMap<String, Style>,
}

impl CatalogStore {
    pub fn load(path: &Path) -> Result<Self, InfraError> {
        let text = std::fs::read_to_string(path)?;
        let store = Self::from_toml(&text)
            .map_err(|message| InfraError::catalog(path.display().to_string(), message))?;
        info!(
            target = "infra::catalog::CatalogStore",
            path = %path.display(),
            layers = store.layers.len(),
            styles = store.styles.len(),
            "catalog loaded"
        );
        Ok(store)
    }

    pub fn from_toml(text: &str) -> Result<Self, String> {
        let record: CatalogRecord = toml::from_str(text).map_err(|err| err.to_string())?;

        let mut styles = BTreeMap::new();
        for style in record.styles {
            if styles.insert(style.name.clone(), style).is_some() {
                return Err("duplicate style name".to_string());
            }
        }

        let mut layers = BTreeMap::new();
        for layer in record.layers {
            let name = layer.name.clone();
            let stored = build_layer(layer)?;
            if layers.insert(name.clone(), stored).is_some() {
                return Err(format!("duplicate layer `{name}`"));
            }
        }

        Ok(Self { layers, styles })
    }

    fn stored(&self, layer: &LayerInfo) -> Result<&StoredLayer, RepoError> {
        self.layers.get(&layer.name).ok_or(RepoError::NotFound)
    }
}

fn build_layer(layer: LayerRecord) -> Result<StoredLayer, String> {
    let LayerRecord {
        name,
        kind,
        default_style,
        templates,
        features,
    } = layer;
    if kind == LayerKind::Raster && !features.is_empty() {
        return Err(format!("raster layer `{name}` cannot carry features"));
    }

    let features = features
        .into_iter()
        .map(|entry| {
            let geometry = entry
                .geometry
                .into_geometry()
                .map_err(|err| format!("feature `{}` of `{name}`: {err}", entry.id))?;
            Ok(Feature {
                id: entry.id,
                geometry,
                attributes: entry
                    .attributes
                    .into_iter()
                    .map(|(name, value)| Attribute {
                        name,
                        value: toml_attribute(value),
                    })
                    .collect(),
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    let default_style = default_style.unwrap_or_else(|| name.local().to_string());
    let mut info = LayerInfo::new(name, kind, default_style);
    info.templates = templates;
    Ok(StoredLayer {
        info,
        features: Arc::new(features),
    })
}

fn toml_attribute(value: toml::Value) -> AttributeValue {
    match value {
        toml::Value::String(text) => AttributeValue::Text(text),
        toml::Value::Integer(value) => AttributeValue::Integer(value),
        toml::Value::Float(value) => AttributeValue::Float(value),
        toml::Value::Boolean(value) => AttributeValue::Bool(value),
        toml::Value::Datetime(value) => toml_datetime(&value.to_string()),
        other => AttributeValue::Text(other.to_string()),
    }
}

/// TOML date-times without an offset are read as UTC.
fn toml_datetime(raw: &str) -> AttributeValue {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return AttributeValue::DateTime(value);
    }
    let local = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(value) = PrimitiveDateTime::parse(raw, local) {
        return AttributeValue::DateTime(value.assume_utc());
    }
    if let Ok(value) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return AttributeValue::Date(value);
    }
    AttributeValue::Text(raw.to_string())
}

impl LayerCatalog for CatalogStore {
    fn find_layer(&self, name: &QualifiedName) -> Result<Option<LayerInfo>, RepoError> {
        Ok(self.layers.get(name).map(|stored| stored.info.clone()))
    }

    fn list_layers(&self) -> Result<Vec<LayerInfo>, RepoError> {
        Ok(self
            .layers
            .values()
            .map(|stored| stored.info.clone())
            .collect())
    }
}

impl FeatureSource for CatalogStore {
    fn features(&self, query: &FeatureQuery<'_>) -> Result<FeatureStream, RepoError> {
        let stored = self.stored(query.layer)?;
        let features = Arc::clone(&stored.features);
        let ids = query.feature_ids.to_vec();
        let filter = attribute_filter(query);
        let bbox = query.bbox;
        let stream = (0..features.len()).filter_map(move |index| {
            let feature = &features[index];
            let wanted = ids.is_empty() || ids.iter().any(|id| *id == feature.id);
            (wanted
                && filter.as_ref().is_none_or(|filter| filter.matches(feature))
                && within(&feature.geometry, &bbox))
                .then(|| feature.clone())
        });
        Ok(Box::new(stream))
    }

    fn count(&self, query: &FeatureQuery<'_>) -> Result<u64, RepoError> {
        let stored = self.stored(query.layer)?;
        let filter = attribute_filter(query);
        let count = stored
            .features
            .iter()
            .filter(|feature| query.matches_id(&feature.id))
            .filter(|feature| filter.as_ref().is_none_or(|filter| filter.matches(feature)))
            .filter(|feature| within(&feature.geometry, &query.bbox))
            .count();
        Ok(count as u64)
    }
}

/// Expressions outside the supported comparison subset are ignored.
fn attribute_filter(query: &FeatureQuery<'_>) -> Option<AttributeFilter> {
    let raw = query.filter?;
    match raw.parse() {
        Ok(filter) => Some(filter),
        Err(err) => {
            warn!(
                target = "infra::catalog::CatalogStore",
                layer = %query.layer.name,
                filter = raw,
                error = %err,
                "ignoring unsupported cql_filter"
            );
            None
        }
    }
}

impl StyleResolver for CatalogStore {
    fn find_style(&self, name: &str) -> Result<Option<Style>, RepoError> {
        Ok(self.styles.get(name).cloned())
    }
}

/// Envelope test; features without coordinates are always kept.
fn within(geometry: &Geometry<f64>, bbox: &BoundingBox) -> bool {
    let mut envelope: Option<BoundingBox> = None;
    extend_envelope(geometry, &mut envelope);
    envelope.is_none_or(|envelope| envelope.intersects(bbox))
}

fn extend_envelope(geometry: &Geometry<f64>, envelope: &mut Option<BoundingBox>) {
    let mut add = |coord: Coord<f64>| {
        let current = envelope.get_or_insert(BoundingBox {
            min_x: coord.x,
            min_y: coord.y,
            max_x: coord.x,
            max_y: coord.y,
        });
        current.min_x = current.min_x.min(coord.x);
        current.min_y = current.min_y.min(coord.y);
        current.max_x = current.max_x.max(coord.x);
        current.max_y = current.max_y.max(coord.y);
    };
    match geometry {
        Geometry::Point(point) => add(point.0),
        Geometry::Line(line) => {
            add(line.start);
            add(line.end);
        }
        Geometry::LineString(line) => line.coords().copied().for_each(add),
        Geometry::Polygon(polygon) => polygon.exterior().coords().copied().for_each(add),
        Geometry::MultiPoint(points) => points.iter().for_each(|point| add(point.0)),
        Geometry::MultiLineString(lines) => lines
            .iter()
            .flat_map(|line| line.coords())
            .copied()
            .for_each(add),
        Geometry::MultiPolygon(polygons) => polygons
            .iter()
            .flat_map(|polygon| polygon.exterior().coords())
            .copied()
            .for_each(add),
        Geometry::Rect(rect) => {
            add(rect.min());
            add(rect.max());
        }
        Geometry::Triangle(triangle) => triangle.to_array().into_iter().for_each(add),
        Geometry::GeometryCollection(collection) => {
            for member in collection.iter() {
                extend_envelope(member, envelope);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CATALOG: &str = r#"
[[styles]]
name = "BasicPolygons"
fill_color = "7f00ff00"

[[layers]]
name = "cite:BasicPolygons"
kind = "vector"
default_style = "BasicPolygons"

[[layers.features]]
id = "BasicPolygons.1"
geometry = { type = "Polygon", coordinates = [[[-2, 6], [1, 10], [5, 6], [-2, 6]]] }
attributes = { ID = "t0001" }

[[layers.features]]
id = "BasicPolygons.2"
geometry = { type = "Point", coordinates = [120.5, -40.25] }

[[layers]]
name = "sf:StormObs"
kind = "vector"
templates = { time = "${obs_datetime.value}" }

[[layers.features]]
id = "storm_obs.1"
geometry = { type = "Point", coordinates = [-90, 30] }
attributes = { obs_datetime = 1994-07-01T10:00:00Z, day = 1994-07-02, local = 1994-07-03T08:00:00 }

[[layers]]
name = "wcs:DEM"
kind = "raster"
default_style = "raster"
"#;

    fn store() -> CatalogStore {
        CatalogStore::from_toml(CATALOG).expect("valid catalog")
    }

    fn query<'a>(layer: &'a LayerInfo, ids: &'a [String], bbox: BoundingBox) -> FeatureQuery<'a> {
        FeatureQuery {
            layer,
            feature_ids: ids,
            filter: None,
            bbox,
        }
    }

    #[test]
    fn layers_and_styles_are_indexed() {
        let store = store();
        let layers = store.list_layers().expect("layers");
        assert_eq!(layers.len(), 3);

        let dem = store
            .find_layer(&"wcs:DEM".parse().expect("name"))
            .expect("lookup")
            .expect("present");
        assert_eq!(dem.kind, LayerKind::Raster);
        assert_eq!(dem.default_style, "raster");

        let storms = store
            .find_layer(&"sf:StormObs".parse().expect("name"))
            .expect("lookup")
            .expect("present");
        assert_eq!(storms.default_style, "StormObs");
        assert!(store.find_style("BasicPolygons").expect("style").is_some());
        assert!(store.find_style("notthere").expect("style").is_none());
    }

    #[test]
    fn features_are_filtered_by_id_and_bbox() {
        let store = store();
        let layer = store
            .find_layer(&"cite:BasicPolygons".parse().expect("name"))
            .expect("lookup")
            .expect("present");
        let world = BoundingBox::new(-180.0, -90.0, 180.0, 90.0).expect("bbox");

        assert_eq!(store.count(&query(&layer, &[], world)).expect("count"), 2);
        let ids = vec!["BasicPolygons.2".to_string()];
        let found: Vec<_> = store
            .features(&query(&layer, &ids, world))
            .expect("features")
            .map(|feature| feature.id)
            .collect();
        assert_eq!(found, vec!["BasicPolygons.2"]);

        let west = BoundingBox::new(-10.0, 0.0, 0.0, 20.0).expect("bbox");
        assert_eq!(store.count(&query(&layer, &[], west)).expect("count"), 1);
    }

    #[test]
    fn attribute_filter_applies_to_features_and_count() {
        let store = store();
        let layer = store
            .find_layer(&"cite:BasicPolygons".parse().expect("name"))
            .expect("lookup")
            .expect("present");
        let world = BoundingBox::new(-180.0, -90.0, 180.0, 90.0).expect("bbox");
        let filtered = FeatureQuery {
            filter: Some("ID = 't0001'"),
            ..query(&layer, &[], world)
        };

        assert_eq!(store.count(&filtered).expect("count"), 1);
        let found: Vec<_> = store
            .features(&filtered)
            .expect("features")
            .map(|feature| feature.id)
            .collect();
        assert_eq!(found, vec!["BasicPolygons.1"]);

        let unsupported = FeatureQuery {
            filter: Some("INTERSECTS(the_geom, POINT(0 0))"),
            ..query(&layer, &[], world)
        };
        assert_eq!(store.count(&unsupported).expect("count"), 2);
    }

    #[test]
    fn toml_datetimes_become_temporal_attributes() {
        let store = store();
        let layer = store
            .find_layer(&"sf:StormObs".parse().expect("name"))
            .expect("lookup")
            .expect("present");
        let world = BoundingBox::new(-180.0, -90.0, 180.0, 90.0).expect("bbox");
        let feature = store
            .features(&query(&layer, &[], world))
            .expect("features")
            .next()
            .expect("one feature");

        assert_eq!(
            feature.attribute("obs_datetime").map(ToString::to_string),
            Some("1994-07-01T10:00:00Z".to_string())
        );
        assert!(matches!(
            feature.attribute("day"),
            Some(AttributeValue::Date(_))
        ));
        assert!(matches!(
            feature.attribute("local"),
            Some(AttributeValue::DateTime(_))
        ));
        assert_eq!(
            layer.templates.time.as_deref(),
            Some("${obs_datetime.value}")
        );
    }

    #[test]
    fn rejects_duplicates_and_raster_features() {
        let duplicate = "[[layers]]\nname = \"a\"\nkind = \"vector\"\n[[layers]]\nname = \"a\"\nkind = \"raster\"\n";
        assert!(CatalogStore::from_toml(duplicate).is_err());

        let raster = "[[layers]]\nname = \"a\"\nkind = \"raster\"\n[[layers.features]]\nid = \"a.1\"\ngeometry = { type = \"Point\", coordinates = [0, 0] }\n";
        assert!(CatalogStore::from_toml(raster).is_err());
    }

    #[test]
    fn load_reports_the_catalog_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "[[layers]]\nname = 1\n").expect("write");
        let err = CatalogStore::load(file.path()).expect_err("invalid catalog");
        assert!(matches!(err, InfraError::Catalog { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
