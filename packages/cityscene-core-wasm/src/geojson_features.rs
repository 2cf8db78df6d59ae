use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SceneError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

pub type Ring = Vec<Position>;

/// Polygon rings: the first is the outer boundary, the rest are holes.
pub type PolygonRings = Vec<Ring>;

/// Geometry of a feature. Only polygonal types carry coordinates; any other
/// GeoJSON type is kept by name so the caller can report it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawGeometry")]
pub enum Geometry {
    Polygon(PolygonRings),
    MultiPolygon(Vec<PolygonRings>),
    Unsupported(String),
    Malformed { geometry_type: String, reason: String },
}

impl Geometry {
    pub fn type_name(&self) -> &str {
        match self {
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::Unsupported(name) => name,
            Geometry::Malformed { geometry_type, .. } => geometry_type,
        }
    }
}

#[derive(Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    geometry_type: String,
    #[serde(default)]
    coordinates: Value,
}

impl From<RawGeometry> for Geometry {
    fn from(raw: RawGeometry) -> Self {
        let parsed = match raw.geometry_type.as_str() {
            "Polygon" => Some(
                serde_json::from_value::<Vec<Vec<Vec<f64>>>>(raw.coordinates)
                    .map_err(|e| e.to_string())
                    .and_then(convert_polygon)
                    .map(Geometry::Polygon),
            ),
            "MultiPolygon" => Some(
                serde_json::from_value::<Vec<Vec<Vec<Vec<f64>>>>>(raw.coordinates)
                    .map_err(|e| e.to_string())
                    .and_then(|polygons| {
                        polygons
                            .into_iter()
                            .map(convert_polygon)
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .map(Geometry::MultiPolygon),
            ),
            _ => None,
        };
        match parsed {
            Some(Ok(geometry)) => geometry,
            Some(Err(reason)) => Geometry::Malformed {
                geometry_type: raw.geometry_type,
                reason,
            },
            None => Geometry::Unsupported(raw.geometry_type),
        }
    }
}

fn convert_polygon(rings: Vec<Vec<Vec<f64>>>) -> Result<PolygonRings, String> {
    rings
        .into_iter()
        .map(|ring| ring.into_iter().map(convert_position).collect())
        .collect()
}

fn convert_position(coords: Vec<f64>) -> Result<Position, String> {
    match coords.as_slice() {
        [x, y] => Ok(Position { x: *x, y: *y, z: None }),
        [x, y, z, ..] => Ok(Position { x: *x, y: *y, z: Some(*z) }),
        _ => Err(format!("position needs at least 2 values, got {}", coords.len())),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub id: Option<Value>,
    pub geometry: Option<Geometry>,
    #[serde(default, deserialize_with = "properties_or_empty")]
    pub properties: Map<String, Value>,
}

// `"properties": null` is valid GeoJSON
fn properties_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Feature {
    /// Numeric property value. Numeric strings are accepted as well.
    pub fn numeric_property(&self, name: &str) -> Option<f64> {
        let value = match self.properties.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_polygon_and_multipolygon() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"hoehe": 12},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type": "Feature", "properties": null,
                 "geometry": {"type": "MultiPolygon", "coordinates": [[[[0,0,3],[1,0,3],[1,1,3]]], [[[5,5],[6,5],[6,6]]]]}}
            ]
        }"#;
        let fc = FeatureCollection::from_json(json).unwrap();
        assert_eq!(fc.len(), 2);

        match fc.features[0].geometry.as_ref().unwrap() {
            Geometry::Polygon(rings) => assert_eq!(rings[0].len(), 4),
            other => panic!("unexpected geometry {:?}", other),
        }
        match fc.features[1].geometry.as_ref().unwrap() {
            Geometry::MultiPolygon(polys) => {
                assert_eq!(polys.len(), 2);
                assert_eq!(polys[0][0][0].z, Some(3.0));
                assert_eq!(polys[1][0][0].z, None);
            }
            other => panic!("unexpected geometry {:?}", other),
        }
        assert!(fc.features[1].properties.is_empty());
    }

    #[test]
    fn keeps_unknown_geometry_types_by_name() {
        let json = r#"{"features": [
            {"properties": {}, "geometry": {"type": "Point", "coordinates": [1, 2]}}
        ]}"#;
        let fc = FeatureCollection::from_json(json).unwrap();
        let geometry = fc.features[0].geometry.as_ref().unwrap();
        assert_eq!(geometry, &Geometry::Unsupported("Point".to_string()));
        assert_eq!(geometry.type_name(), "Point");
    }

    #[test]
    fn malformed_coordinates_do_not_fail_the_collection() {
        let json = r#"{"features": [
            {"properties": {}, "geometry": {"type": "Polygon", "coordinates": [[[1]]]}},
            {"properties": {}, "geometry": null}
        ]}"#;
        let fc = FeatureCollection::from_json(json).unwrap();
        assert!(matches!(
            fc.features[0].geometry,
            Some(Geometry::Malformed { .. })
        ));
        assert!(fc.features[1].geometry.is_none());
    }

    #[test]
    fn numeric_property_accepts_numeric_strings() {
        let json = r#"{"features": [
            {"properties": {"hoehe": "21.5", "name": "x"}, "geometry": null}
        ]}"#;
        let fc = FeatureCollection::from_json(json).unwrap();
        let f = &fc.features[0];
        assert_eq!(f.numeric_property("hoehe"), Some(21.5));
        assert_eq!(f.numeric_property("name"), None);
        assert_eq!(f.numeric_property("missing"), None);
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(FeatureCollection::from_json("{not json").is_err());
    }
}
