// Shared scene data structures
use nalgebra::{Matrix4, Point3, Rotation3, Translation3, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub fn from_hex(hex: u32) -> Self {
        Color {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    /// Parse `#RRGGBB`. Anything else yields `None`.
    pub fn parse(color_str: &str) -> Option<Self> {
        let hex = color_str.strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        u32::from_str_radix(hex, 16).ok().map(Color::from_hex)
    }

    pub fn scaled(&self, intensity: f32) -> [f32; 3] {
        [self.r * intensity, self.g * intensity, self.b * intensity]
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl Serialize for HexColor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let c = self.0;
        let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        serializer.serialize_str(&format!(
            "#{:02x}{:02x}{:02x}",
            to_byte(c.r),
            to_byte(c.g),
            to_byte(c.b)
        ))
    }
}

impl<'de> Deserialize<'de> for HexColor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::parse(&s)
            .map(HexColor)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid color '{}', expected #RRGGBB", s)))
    }
}

/// A color that travels through configuration as a `#RRGGBB` string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexColor(pub Color);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Front,
    Back,
    Double,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub color: Color,
    pub side: Side,
}

impl Material {
    pub fn double_sided(color: Color) -> Self {
        Material {
            color,
            side: Side::Double,
        }
    }
}

/// A range of the index buffer drawn with one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryGroup {
    pub start: usize,
    pub count: usize,
    pub material_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferGeometry {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
    pub indices: Vec<u32>,
    pub groups: Vec<GeometryGroup>,
}

impl BufferGeometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn translate(&mut self, dx: f32, dy: f32, dz: f32) {
        for p in self.positions.chunks_exact_mut(3) {
            p[0] += dx;
            p[1] += dy;
            p[2] += dz;
        }
    }

    pub fn bounding_box(&self) -> Box3 {
        let mut bbox = Box3::empty();
        for p in self.positions.chunks_exact(3) {
            bbox.expand_by_point([p[0] as f64, p[1] as f64, p[2] as f64]);
        }
        bbox
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: Option<String>,
    pub geometry: BufferGeometry,
    pub materials: Vec<Material>,
}

/// Node transform: translation plus XYZ Euler rotation in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f64; 3],
    pub rotation: [f64; 3],
}

impl Transform {
    pub fn matrix(&self) -> Matrix4<f64> {
        let [x, y, z] = self.position;
        let [rx, ry, rz] = self.rotation;
        // Same order as an XYZ Euler: X applied first.
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), rz)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), ry)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), rx);
        Translation3::new(x, y, z).to_homogeneous() * rotation.to_homogeneous()
    }

    pub fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        let p = self.matrix().transform_point(&Point3::new(point[0], point[1], point[2]));
        [p.x, p.y, p.z]
    }
}

/// Unordered container of meshes positioned as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshGroup {
    pub meshes: Vec<Mesh>,
    pub transform: Transform,
}

impl MeshGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mesh: Mesh) {
        self.meshes.push(mesh);
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn stats(&self) -> GeometryStats {
        GeometryStats {
            meshes: self.meshes.len(),
            vertices: self.meshes.iter().map(|m| m.geometry.vertex_count()).sum(),
            triangles: self.meshes.iter().map(|m| m.geometry.triangle_count()).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryStats {
    pub meshes: usize,
    pub vertices: usize,
    pub triangles: usize,
}

/// Axis-aligned bounding box. Starts inverted so the first point sets both corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Box3 {
    pub fn empty() -> Self {
        Box3 {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.max[i] < self.min[i])
    }

    pub fn expand_by_point(&mut self, p: [f64; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    pub fn union(&mut self, other: &Box3) {
        if other.is_empty() {
            return;
        }
        self.expand_by_point(other.min);
        self.expand_by_point(other.max);
    }

    pub fn center(&self) -> [f64; 3] {
        if self.is_empty() {
            return [0.0; 3];
        }
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_hex_colors() {
        let c = Color::parse("#008080").expect("valid color");
        assert_relative_eq!(c.r, 0.0);
        assert_relative_eq!(c.g, 128.0 / 255.0);
        assert_relative_eq!(c.b, 128.0 / 255.0);
        assert!(Color::parse("teal").is_none());
        assert!(Color::parse("#12345").is_none());
    }

    #[test]
    fn hex_color_round_trips_through_json() {
        let c: HexColor = serde_json::from_str("\"#f0f0f0\"").unwrap();
        assert_eq!(c.0, Color::from_hex(0xf0f0f0));
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"#f0f0f0\"");
        assert!(serde_json::from_str::<HexColor>("\"red\"").is_err());
    }

    #[test]
    fn rotation_about_x_turns_z_into_y() {
        let t = Transform {
            position: [1.0, 0.0, 0.0],
            rotation: [-std::f64::consts::FRAC_PI_2, 0.0, 0.0],
        };
        let p = t.apply([0.0, 0.0, 5.0]);
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 5.0, epsilon = 1e-9);
        assert_relative_eq!(p[2], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn box_center_of_empty_box_is_origin() {
        let mut b = Box3::empty();
        assert!(b.is_empty());
        assert_eq!(b.center(), [0.0; 3]);
        b.expand_by_point([2.0, 4.0, 6.0]);
        b.expand_by_point([0.0, 0.0, 0.0]);
        assert_eq!(b.center(), [1.0, 2.0, 3.0]);
    }
}
