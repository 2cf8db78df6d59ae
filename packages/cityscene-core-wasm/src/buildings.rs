// Building footprints → extruded meshes
use geo::Simplify;
use geo_types::{Coord, LineString};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::error::{BuildingError, SceneError};
use crate::extrude::{clean_ring, extrude_shape, ExtrudeError, ExtrudeOptions, Path2D};
use crate::geojson_features::{Feature, FeatureCollection, Geometry, PolygonRings, Ring};
use crate::models::{Color, GeometryStats, HexColor, Material, Mesh, MeshGroup};
use crate::transform::LocalTransform;
use crate::{console_error, console_log, console_warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildingOptions {
    pub center: [f64; 2],
    pub scale: f64,
    pub height_property: String,
    /// Used when a feature carries no numeric height.
    pub default_height: f64,
    /// Cut inner rings out of the footprint instead of ignoring them.
    pub include_holes: bool,
    /// Lift each polygon to the z of its first position.
    pub use_z_base: bool,
    /// Douglas-Peucker tolerance in projected units, applied before scaling.
    pub simplify_tolerance: Option<f64>,
    pub cap_color: HexColor,
    pub side_color: HexColor,
}

impl Default for BuildingOptions {
    fn default() -> Self {
        let transform = LocalTransform::default();
        Self {
            center: transform.center,
            scale: transform.scale,
            height_property: "hoehe".to_string(),
            default_height: 1.0,
            include_holes: false,
            use_z_base: false,
            simplify_tolerance: None,
            cap_color: HexColor(Color::from_hex(0x00ff00)),
            side_color: HexColor(Color::from_hex(0x008080)),
        }
    }
}

impl BuildingOptions {
    /// Reject options that would make every feature fail.
    pub fn validate(&self) -> Result<(), SceneError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(SceneError::Config {
                what: "building options",
                reason: format!("scale must be finite and positive, got {}", self.scale),
            });
        }
        Ok(())
    }

    pub fn local_transform(&self) -> LocalTransform {
        LocalTransform::new(self.center, self.scale)
    }

    fn materials(&self) -> Vec<Material> {
        vec![
            Material::double_sided(self.cap_color.0),
            Material::double_sided(self.side_color.0),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildingsOutput {
    pub group: MeshGroup,
    pub errors: Vec<BuildingError>,
}

/// Extrude every polygon of every feature into its own mesh.
pub fn make_buildings(collection: &FeatureCollection, options: &BuildingOptions) -> BuildingsOutput {
    let transform = options.local_transform();
    let materials = options.materials();
    let mut output = BuildingsOutput::default();

    for (index, feature) in collection.features.iter().enumerate() {
        let mut report = |error: BuildingError| {
            if error.is_warning() {
                console_warn!("{}", error);
            } else {
                console_error!("{}", error);
            }
            output.errors.push(error);
        };

        let polygons: Vec<&PolygonRings> = match &feature.geometry {
            Some(Geometry::Polygon(rings)) => vec![rings],
            Some(Geometry::MultiPolygon(polygons)) => polygons.iter().collect(),
            Some(Geometry::Malformed {
                geometry_type,
                reason,
            }) => {
                report(BuildingError::MalformedGeometry {
                    feature: index,
                    geometry_type: geometry_type.clone(),
                    reason: reason.clone(),
                });
                continue;
            }
            Some(other) => {
                report(BuildingError::UnsupportedGeometry {
                    feature: index,
                    geometry_type: other.type_name().to_string(),
                });
                continue;
            }
            None => {
                report(BuildingError::MissingGeometry { feature: index });
                continue;
            }
        };

        let height = feature
            .numeric_property(&options.height_property)
            .unwrap_or_else(|| {
                report(BuildingError::MissingHeight {
                    feature: index,
                    property: options.height_property.clone(),
                    fallback: options.default_height,
                });
                options.default_height
            });
        let extrude_options = ExtrudeOptions::flat(transform.depth(height));

        for (polygon_index, rings) in polygons.into_iter().enumerate() {
            let Some(outer) = rings.first() else {
                report(BuildingError::Extrude {
                    feature: index,
                    polygon: polygon_index,
                    source: ExtrudeError::DegenerateRing { points: 0 },
                });
                continue;
            };

            let mut shape = ring_to_path(outer, &transform, options.simplify_tolerance).to_shape();
            if options.include_holes {
                for (hole_index, hole) in rings[1..].iter().enumerate() {
                    let contour = ring_to_path(hole, &transform, options.simplify_tolerance)
                        .to_shape()
                        .contour;
                    // Drop bad holes but keep the footprint.
                    match clean_ring(&contour) {
                        Ok(_) => shape.holes.push(contour),
                        Err(source) => report(BuildingError::InvalidHole {
                            feature: index,
                            polygon: polygon_index,
                            hole: hole_index,
                            source,
                        }),
                    }
                }
            }

            match extrude_shape(&shape, &extrude_options) {
                Ok(mut geometry) => {
                    if options.use_z_base {
                        if let Some(z) = outer.first().and_then(|p| p.z) {
                            geometry.translate(0.0, 0.0, transform.depth(z) as f32);
                        }
                    }
                    output.group.add(Mesh {
                        name: Some(mesh_name(feature, index, polygon_index)),
                        geometry,
                        materials: materials.clone(),
                    });
                }
                Err(source) => report(BuildingError::Extrude {
                    feature: index,
                    polygon: polygon_index,
                    source,
                }),
            }
        }
    }

    let stats = output.group.stats();
    console_log!(
        "Extruded {} building meshes ({} vertices, {} triangles) from {} features",
        stats.meshes,
        stats.vertices,
        stats.triangles,
        collection.len()
    );
    output
}

fn ring_to_path(ring: &Ring, transform: &LocalTransform, simplify_tolerance: Option<f64>) -> Path2D {
    let mut line: LineString<f64> = ring.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    if let Some(tolerance) = simplify_tolerance.filter(|t| *t > 0.0) {
        line = line.simplify(&tolerance);
    }

    let mut path = Path2D::new();
    for (i, coord) in line.coords().enumerate() {
        let [x, y] = transform.to_local(coord.x, coord.y);
        if i == 0 {
            path.move_to(x, y);
        } else {
            path.line_to(x, y);
        }
    }
    path.close_path();
    path
}

fn mesh_name(feature: &Feature, index: usize, polygon: usize) -> String {
    match &feature.id {
        Some(serde_json::Value::String(id)) => format!("{}-{}", id, polygon),
        Some(serde_json::Value::Number(id)) => format!("{}-{}", id, polygon),
        _ => format!("building-{}-{}", index, polygon),
    }
}

#[derive(Serialize)]
struct BuildingsResponse {
    meshes: Vec<Mesh>,
    errors: Vec<String>,
    stats: GeometryStats,
}

/// Extrude a GeoJSON FeatureCollection string. Options use the same camelCase keys
/// as the `buildings` section of the viewer config.
#[wasm_bindgen]
pub fn make_buildings_js(geojson: &str, options: JsValue) -> Result<JsValue, JsValue> {
    let collection = FeatureCollection::from_json(geojson)?;
    let options: BuildingOptions = if options.is_undefined() || options.is_null() {
        BuildingOptions::default()
    } else {
        serde_wasm_bindgen::from_value(options)
            .map_err(|e| JsValue::from_str(&format!("Invalid building options: {}", e)))?
    };
    options.validate()?;

    let output = make_buildings(&collection, &options);
    let response = BuildingsResponse {
        stats: output.group.stats(),
        errors: output.errors.iter().map(|e| e.to_string()).collect(),
        meshes: output.group.meshes,
    };
    Ok(serde_wasm_bindgen::to_value(&response)?)
}
