use earcutr::earcut;
use js_sys::{Float32Array, Object, Uint32Array};
use serde::Deserialize;
use thiserror::Error;
use wasm_bindgen::prelude::*;

use crate::models::{BufferGeometry, GeometryGroup};

const EPSILON: f64 = 1e-10;

/// Material slot used for top and bottom faces.
pub const CAP_MATERIAL: usize = 0;
/// Material slot used for side walls.
pub const SIDE_MATERIAL: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance_to(&self, other: &Vector2) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtrudeError {
    #[error("ring needs at least 3 distinct points, got {points}")]
    DegenerateRing { points: usize },

    #[error("ring of {points} points encloses zero area")]
    ZeroArea { points: usize },

    #[error("extrusion depth must be finite, got {0}")]
    InvalidDepth(f64),

    #[error("extrusion needs at least one step")]
    InvalidSteps,

    #[error("bevels with non-zero size or thickness are not supported")]
    BevelUnsupported,

    #[error("triangulation failed: {0}")]
    Triangulation(String),
}

/// Outline recorded with pen-style commands. Only straight segments exist.
#[derive(Debug, Clone, Default)]
pub struct Path2D {
    points: Vec<Vector2>,
    closed: bool,
}

impl Path2D {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new outline, discarding anything recorded before.
    pub fn move_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.points.clear();
        self.closed = false;
        self.points.push(Vector2::new(x, y));
        self
    }

    pub fn line_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.points.push(Vector2::new(x, y));
        self
    }

    pub fn close_path(&mut self) -> &mut Self {
        self.closed = true;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn points(&self) -> &[Vector2] {
        &self.points
    }

    pub fn to_shape(&self) -> Shape {
        Shape {
            contour: self.points.clone(),
            holes: Vec::new(),
        }
    }
}

/// Outer contour plus optional holes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub contour: Vec<Vector2>,
    pub holes: Vec<Vec<Vector2>>,
}

impl Shape {
    pub fn with_hole(mut self, hole: Vec<Vector2>) -> Self {
        self.holes.push(hole);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtrudeOptions {
    pub depth: f64,
    pub steps: u32,
    pub bevel_enabled: bool,
    pub bevel_thickness: f64,
    pub bevel_size: f64,
    pub bevel_segments: u32,
}

impl Default for ExtrudeOptions {
    fn default() -> Self {
        Self {
            depth: 1.0,
            steps: 1,
            bevel_enabled: false,
            bevel_thickness: 0.0,
            bevel_size: 0.0,
            bevel_segments: 1,
        }
    }
}

impl ExtrudeOptions {
    /// Straight extrusion with a zero-size bevel, the setting buildings use.
    pub fn flat(depth: f64) -> Self {
        Self {
            depth,
            bevel_enabled: true,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), ExtrudeError> {
        if !self.depth.is_finite() {
            return Err(ExtrudeError::InvalidDepth(self.depth));
        }
        if self.steps == 0 {
            return Err(ExtrudeError::InvalidSteps);
        }
        if self.bevel_enabled && (self.bevel_thickness.abs() > EPSILON || self.bevel_size.abs() > EPSILON) {
            return Err(ExtrudeError::BevelUnsupported);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtrudeOptionsJson {
    #[serde(default = "default_depth")]
    depth: f64,
    #[serde(default = "default_steps")]
    steps: u32,
    #[serde(default)]
    bevel_enabled: bool,
    #[serde(default)]
    bevel_thickness: f64,
    #[serde(default)]
    bevel_size: f64,
    #[serde(default = "default_steps")]
    bevel_segments: u32,
}

fn default_depth() -> f64 {
    1.0
}
fn default_steps() -> u32 {
    1
}

impl From<ExtrudeOptionsJson> for ExtrudeOptions {
    fn from(o: ExtrudeOptionsJson) -> Self {
        Self {
            depth: o.depth,
            steps: o.steps,
            bevel_enabled: o.bevel_enabled,
            bevel_thickness: o.bevel_thickness,
            bevel_size: o.bevel_size,
            bevel_segments: o.bevel_segments,
        }
    }
}

/// Raw shape structure: first vector is contour, remaining vectors are holes.
#[derive(Deserialize)]
pub struct RawShape(pub Vec<Vec<[f64; 2]>>);

impl From<RawShape> for Shape {
    fn from(RawShape(rings): RawShape) -> Self {
        let mut rings = rings
            .into_iter()
            .map(|ring| ring.into_iter().map(|p| Vector2::new(p[0], p[1])).collect::<Vec<_>>());
        Shape {
            contour: rings.next().unwrap_or_default(),
            holes: rings.collect(),
        }
    }
}

/// Signed shoelace area; positive for counter-clockwise rings.
pub fn signed_area(points: &[Vector2]) -> f64 {
    let mut area = 0.0;
    for i in 0..points.len() {
        let j = (i + 1) % points.len();
        area += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    area * 0.5
}

/// Drop the closing duplicate and any coincident neighbours. The result has at
/// least 3 points and a non-zero area.
pub fn clean_ring(points: &[Vector2]) -> Result<Vec<Vector2>, ExtrudeError> {
    let mut cleaned: Vec<Vector2> = Vec::with_capacity(points.len());
    for p in points {
        let scale = p.x.abs().max(p.y.abs()).max(1.0);
        match cleaned.last() {
            Some(prev) if prev.distance_to(p) <= EPSILON * scale => {}
            _ => cleaned.push(*p),
        }
    }
    while cleaned.len() > 1 {
        let first = cleaned[0];
        let last = cleaned[cleaned.len() - 1];
        let scale = first.x.abs().max(first.y.abs()).max(1.0);
        if first.distance_to(&last) <= EPSILON * scale {
            cleaned.pop();
        } else {
            break;
        }
    }
    if cleaned.len() < 3 {
        return Err(ExtrudeError::DegenerateRing {
            points: cleaned.len(),
        });
    }
    if signed_area(&cleaned).abs() <= EPSILON {
        return Err(ExtrudeError::ZeroArea {
            points: cleaned.len(),
        });
    }
    Ok(cleaned)
}

#[derive(Default)]
struct GeometryBuilder {
    positions: Vec<f32>,
    normals: Vec<f32>,
    uvs: Vec<f32>,
    indices: Vec<u32>,
}

impl GeometryBuilder {
    fn vertex(&mut self, p: [f64; 3], n: [f64; 3], uv: [f64; 2]) -> u32 {
        let index = (self.positions.len() / 3) as u32;
        self.positions.extend(p.iter().map(|v| *v as f32));
        self.normals.extend(n.iter().map(|v| *v as f32));
        self.uvs.extend(uv.iter().map(|v| *v as f32));
        index
    }

    fn triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }
}

/// Extrude a shape along Z between 0 and `opts.depth`; a negative depth grows
/// the prism downward. Index range 0 holds the caps (`CAP_MATERIAL`), range 1
/// the walls (`SIDE_MATERIAL`).
pub fn extrude_shape(shape: &Shape, opts: &ExtrudeOptions) -> Result<BufferGeometry, ExtrudeError> {
    opts.validate()?;

    let mut contour = clean_ring(&shape.contour)?;
    if signed_area(&contour) < 0.0 {
        contour.reverse();
    }
    let mut holes = Vec::with_capacity(shape.holes.len());
    for hole in &shape.holes {
        let mut hole = clean_ring(hole)?;
        if signed_area(&hole) > 0.0 {
            hole.reverse();
        }
        holes.push(hole);
    }

    let mut rings: Vec<&[Vector2]> = vec![contour.as_slice()];
    rings.extend(holes.iter().map(|h| h.as_slice()));
    let flat: Vec<Vector2> = rings.iter().flat_map(|r| r.iter().copied()).collect();

    let mut data: Vec<f64> = Vec::with_capacity(flat.len() * 2);
    for p in &flat {
        data.push(p.x);
        data.push(p.y);
    }
    let mut hole_indices: Vec<usize> = Vec::with_capacity(holes.len());
    let mut offset = contour.len();
    for hole in &holes {
        hole_indices.push(offset);
        offset += hole.len();
    }
    let triangles = earcut(&data, &hole_indices, 2)
        .map_err(|e| ExtrudeError::Triangulation(format!("{:?}", e)))?;

    let (z_low, z_high) = (opts.depth.min(0.0), opts.depth.max(0.0));
    let mut b = GeometryBuilder::default();

    // Caps
    let bottom_base = b.positions.len() as u32 / 3;
    for p in &flat {
        b.vertex([p.x, p.y, z_low], [0.0, 0.0, -1.0], [p.x, p.y]);
    }
    let top_base = b.positions.len() as u32 / 3;
    for p in &flat {
        b.vertex([p.x, p.y, z_high], [0.0, 0.0, 1.0], [p.x, p.y]);
    }
    for tri in triangles.chunks_exact(3) {
        let (mut i0, i1, mut i2) = (tri[0], tri[1], tri[2]);
        if signed_area(&[flat[i0], flat[i1], flat[i2]]) < 0.0 {
            std::mem::swap(&mut i0, &mut i2);
        }
        let (i0, i1, i2) = (i0 as u32, i1 as u32, i2 as u32);
        b.triangle(top_base + i0, top_base + i1, top_base + i2);
        b.triangle(bottom_base + i2, bottom_base + i1, bottom_base + i0);
    }
    let cap_count = b.indices.len();

    // Walls
    let steps = opts.steps as usize;
    for ring in &rings {
        let mut distance = 0.0;
        for i in 0..ring.len() {
            let p0 = ring[i];
            let p1 = ring[(i + 1) % ring.len()];
            let (dx, dy) = (p1.x - p0.x, p1.y - p0.y);
            let len = (dx * dx + dy * dy).sqrt();
            let normal = if len > EPSILON {
                [dy / len, -dx / len, 0.0]
            } else {
                [0.0, 0.0, 1.0]
            };
            for s in 0..steps {
                let z0 = z_low + (z_high - z_low) * s as f64 / steps as f64;
                let z1 = z_low + (z_high - z_low) * (s + 1) as f64 / steps as f64;
                let a = b.vertex([p0.x, p0.y, z0], normal, [distance, z0]);
                let bb = b.vertex([p1.x, p1.y, z0], normal, [distance + len, z0]);
                let c = b.vertex([p1.x, p1.y, z1], normal, [distance + len, z1]);
                let d = b.vertex([p0.x, p0.y, z1], normal, [distance, z1]);
                b.triangle(a, bb, c);
                b.triangle(a, c, d);
            }
            distance += len;
        }
    }
    let side_count = b.indices.len() - cap_count;

    Ok(BufferGeometry {
        positions: b.positions,
        normals: b.normals,
        uvs: b.uvs,
        indices: b.indices,
        groups: vec![
            GeometryGroup {
                start: 0,
                count: cap_count,
                material_index: CAP_MATERIAL,
            },
            GeometryGroup {
                start: cap_count,
                count: side_count,
                material_index: SIDE_MATERIAL,
            },
        ],
    })
}

/// Concatenate geometries, offsetting indices and groups.
pub fn merge_geometries(geometries: Vec<BufferGeometry>) -> BufferGeometry {
    let mut merged = BufferGeometry::default();
    for g in geometries {
        let vertex_offset = merged.vertex_count() as u32;
        let index_offset = merged.indices.len();
        merged.positions.extend_from_slice(&g.positions);
        merged.normals.extend_from_slice(&g.normals);
        merged.uvs.extend_from_slice(&g.uvs);
        merged.indices.extend(g.indices.iter().map(|i| i + vertex_offset));
        merged.groups.extend(g.groups.iter().map(|grp| GeometryGroup {
            start: grp.start + index_offset,
            ..*grp
        }));
    }
    merged
}

/// Extrude a list of shapes into geometry. Each shape is an array of rings: first is contour, others are holes.
/// Returns an object with `position`, `normal`, `uv`, `index` typed arrays and the material `groups`.
#[wasm_bindgen]
pub fn extrude_geometry(shapes: &JsValue, options: &JsValue) -> Result<JsValue, JsValue> {
    let raw_shapes: Vec<RawShape> = serde_wasm_bindgen::from_value(shapes.clone())
        .map_err(|e| JsValue::from_str(&format!("Invalid shapes: {}", e)))?;
    let options_json: ExtrudeOptionsJson = serde_wasm_bindgen::from_value(options.clone())
        .map_err(|e| JsValue::from_str(&format!("Invalid options: {}", e)))?;
    let opts = ExtrudeOptions::from(options_json);

    let geometries = raw_shapes
        .into_iter()
        .map(|raw| extrude_shape(&Shape::from(raw), &opts))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let geometry = merge_geometries(geometries);

    let result = Object::new();
    js_sys::Reflect::set(&result, &"position".into(), &Float32Array::from(geometry.positions.as_slice()))?;
    js_sys::Reflect::set(&result, &"normal".into(), &Float32Array::from(geometry.normals.as_slice()))?;
    js_sys::Reflect::set(&result, &"uv".into(), &Float32Array::from(geometry.uvs.as_slice()))?;
    js_sys::Reflect::set(&result, &"index".into(), &Uint32Array::from(geometry.indices.as_slice()))?;
    js_sys::Reflect::set(&result, &"groups".into(), &serde_wasm_bindgen::to_value(&geometry.groups)?)?;

    Ok(result.into())
}
