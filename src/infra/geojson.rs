//! GeoJSON-shaped geometry and feature records shared by the catalog file and
//! the remote WFS source.

use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::domain::entities::{Attribute, AttributeValue, Feature};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("position needs at least two ordinates, got {0}")]
    ShortPosition(usize),
    #[error("polygon has no exterior ring")]
    EmptyPolygon,
}

/// `[x, y]` or `[x, y, z]`; anything past `y` is dropped.
pub type Position = Vec<f64>;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GeometryRecord {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<GeometryRecord> },
}

impl GeometryRecord {
    pub fn into_geometry(self) -> Result<Geometry<f64>, GeometryError> {
        Ok(match self {
            GeometryRecord::Point { coordinates } => Point(coord(&coordinates)?).into(),
            GeometryRecord::MultiPoint { coordinates } => MultiPoint(
                coordinates
                    .iter()
                    .map(|position| coord(position).map(Point))
                    .collect::<Result<_, _>>()?,
            )
            .into(),
            GeometryRecord::LineString { coordinates } => line_string(&coordinates)?.into(),
            GeometryRecord::MultiLineString { coordinates } => MultiLineString(
                coordinates
                    .iter()
                    .map(|line| line_string(line))
                    .collect::<Result<_, _>>()?,
            )
            .into(),
            GeometryRecord::Polygon { coordinates } => polygon(&coordinates)?.into(),
            GeometryRecord::MultiPolygon { coordinates } => MultiPolygon(
                coordinates
                    .iter()
                    .map(|rings| polygon(rings))
                    .collect::<Result<_, _>>()?,
            )
            .into(),
            GeometryRecord::GeometryCollection { geometries } => {
                Geometry::GeometryCollection(GeometryCollection(
                    geometries
                        .into_iter()
                        .map(GeometryRecord::into_geometry)
                        .collect::<Result<_, _>>()?,
                ))
            }
        })
    }
}

fn coord(position: &[f64]) -> Result<Coord<f64>, GeometryError> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(GeometryError::ShortPosition(position.len())),
    }
}

fn line_string(positions: &[Position]) -> Result<LineString<f64>, GeometryError> {
    positions
        .iter()
        .map(|position| coord(position))
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn polygon(rings: &[Vec<Position>]) -> Result<Polygon<f64>, GeometryError> {
    let (exterior, interiors) = rings.split_first().ok_or(GeometryError::EmptyPolygon)?;
    let interiors = interiors
        .iter()
        .map(|ring| line_string(ring))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(line_string(exterior)?, interiors))
}

#[derive(Debug, Deserialize)]
pub struct FeatureCollectionRecord {
    #[serde(default)]
    pub features: Vec<FeatureRecord>,
}

#[derive(Debug, Deserialize)]
pub struct FeatureRecord {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub geometry: Option<GeometryRecord>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl FeatureRecord {
    /// Features without geometry are skipped; ids fall back to `<layer>.<n>`.
    pub fn into_feature(
        self,
        fallback_id: impl FnOnce() -> String,
    ) -> Result<Option<Feature>, GeometryError> {
        let Some(geometry) = self.geometry else {
            return Ok(None);
        };
        let id = match self.id {
            Some(serde_json::Value::String(id)) => id,
            Some(serde_json::Value::Number(id)) => id.to_string(),
            _ => fallback_id(),
        };
        let attributes = self
            .properties
            .into_iter()
            .map(|(name, value)| Attribute {
                name,
                value: json_attribute(value),
            })
            .collect();
        Ok(Some(Feature {
            id,
            geometry: geometry.into_geometry()?,
            attributes,
        }))
    }
}

fn json_attribute(value: serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null,
        serde_json::Value::Bool(value) => AttributeValue::Bool(value),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(integer) => AttributeValue::Integer(integer),
            None => AttributeValue::Float(number.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(text) => match OffsetDateTime::parse(&text, &Rfc3339) {
            Ok(when) => AttributeValue::DateTime(when),
            Err(_) => AttributeValue::Text(text),
        },
        other => AttributeValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    #[test]
    fn polygon_with_hole_and_z_values() {
        let record: GeometryRecord = serde_json::from_str(
            r#"{"type":"Polygon","coordinates":[[[0,0,5],[4,0,5],[4,4,5],[0,0,5]],[[1,1],[2,1],[2,2],[1,1]]]}"#,
        )
        .expect("valid geometry");
        let geometry = record.into_geometry().expect("convertible");
        let Geometry::Polygon(polygon) = geometry else {
            panic!("expected a polygon");
        };
        assert_eq!(
            polygon.exterior(),
            polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0)].exterior()
        );
        assert_eq!(polygon.interiors().len(), 1);
    }

    #[test]
    fn geometry_collection_keeps_members_in_order() {
        let record: GeometryRecord = serde_json::from_str(
            r#"{"type":"GeometryCollection","geometries":[
                {"type":"Point","coordinates":[1,2]},
                {"type":"LineString","coordinates":[[0,0],[3,4]]}
            ]}"#,
        )
        .expect("valid geometry");
        let Geometry::GeometryCollection(collection) = record.into_geometry().expect("convertible")
        else {
            panic!("expected a geometry collection");
        };
        assert_eq!(collection.0.len(), 2);
        assert!(matches!(collection.0[0], Geometry::Point(point) if point.x() == 1.0 && point.y() == 2.0));
        assert!(matches!(collection.0[1], Geometry::LineString(_)));

        let broken = GeometryRecord::GeometryCollection {
            geometries: vec![GeometryRecord::Point {
                coordinates: vec![5.0],
            }],
        };
        assert_eq!(broken.into_geometry(), Err(GeometryError::ShortPosition(1)));
    }

    #[test]
    fn short_positions_are_rejected() {
        let record = GeometryRecord::Point {
            coordinates: vec![1.0],
        };
        assert_eq!(record.into_geometry(), Err(GeometryError::ShortPosition(1)));
    }

    #[test]
    fn feature_collection_maps_ids_and_properties() {
        let collection: FeatureCollectionRecord = serde_json::from_str(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","id":"states.1","geometry":{"type":"Point","coordinates":[-90,30]},
                 "properties":{"STATE_NAME":"Louisiana","PERSONS":4219973,"obs":"1994-07-01T10:00:00Z"}},
                {"type":"Feature","id":7,"geometry":null,"properties":{}}
            ]}"#,
        )
        .expect("valid collection");

        let mut features = collection.features.into_iter();
        let first = features
            .next()
            .expect("first record")
            .into_feature(|| "unused".to_string())
            .expect("convertible")
            .expect("has geometry");
        assert_eq!(first.id, "states.1");
        assert_eq!(
            first.attribute("PERSONS"),
            Some(&AttributeValue::Integer(4_219_973))
        );
        assert!(first.attribute("obs").is_some_and(AttributeValue::is_temporal));

        let second = features
            .next()
            .expect("second record")
            .into_feature(|| "states.2".to_string())
            .expect("convertible");
        assert!(second.is_none());
    }
}
