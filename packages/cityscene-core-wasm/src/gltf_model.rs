// Binary glTF asset loading
use gltf::mesh::Mode;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::console_warn;
use crate::error::SceneError;
use crate::models::{Box3, Color};

/// One triangle primitive with its node transform already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMesh {
    pub name: Option<String>,
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
    pub color: Color,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedModel {
    pub meshes: Vec<ModelMesh>,
    /// Translation applied when the model is placed in the scene.
    pub offset: [f64; 3],
}

impl LoadedModel {
    pub fn bounding_box(&self) -> Box3 {
        let mut bbox = Box3::empty();
        for mesh in &self.meshes {
            for p in mesh.positions.chunks_exact(3) {
                bbox.expand_by_point([p[0] as f64, p[1] as f64, p[2] as f64]);
            }
        }
        bbox
    }

    /// Shift the model so its bounding-box center sits on the origin.
    pub fn center_on_origin(&mut self) {
        let c = self.bounding_box().center();
        self.offset = [-c[0], -c[1], -c[2]];
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.indices.len() / 3).sum()
    }
}

pub fn load_glb(bytes: &[u8]) -> Result<LoadedModel, SceneError> {
    let (document, buffers, _images) = gltf::import_slice(bytes)?;
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| SceneError::Gltf("asset contains no scene".to_string()))?;

    let mut model = LoadedModel::default();
    for node in scene.nodes() {
        visit_node(&node, Matrix4::identity(), &buffers, &mut model);
    }
    Ok(model)
}

fn visit_node(
    node: &gltf::Node,
    parent: Matrix4<f64>,
    buffers: &[gltf::buffer::Data],
    model: &mut LoadedModel,
) {
    let local = Matrix4::<f32>::from(node.transform().matrix()).cast::<f64>();
    let world = parent * local;

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                console_warn!(
                    "Skipping {:?} primitive in mesh {}",
                    primitive.mode(),
                    mesh.name().unwrap_or("<unnamed>")
                );
                continue;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|n| n.collect());
            let [r, g, b, _] = primitive.material().pbr_metallic_roughness().base_color_factor();

            let mut out = ModelMesh {
                name: mesh.name().map(str::to_string),
                positions: transform_points(&positions, &world),
                normals: Vec::new(),
                indices,
                color: Color { r, g, b },
            };
            out.normals = match normals {
                Some(n) if n.len() == positions.len() => transform_normals(&n, &world),
                _ => compute_vertex_normals(&out.positions, &out.indices),
            };
            model.meshes.push(out);
        }
    }

    for child in node.children() {
        visit_node(&child, world, buffers, model);
    }
}

fn transform_points(points: &[[f32; 3]], m: &Matrix4<f64>) -> Vec<f32> {
    let mut out = Vec::with_capacity(points.len() * 3);
    for p in points {
        let t = m.transform_point(&Point3::new(p[0] as f64, p[1] as f64, p[2] as f64));
        out.extend_from_slice(&[t.x as f32, t.y as f32, t.z as f32]);
    }
    out
}

fn transform_normals(normals: &[[f32; 3]], m: &Matrix4<f64>) -> Vec<f32> {
    let linear: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let normal_matrix = linear
        .try_inverse()
        .map(|inv| inv.transpose())
        .unwrap_or(linear);
    let mut out = Vec::with_capacity(normals.len() * 3);
    for n in normals {
        let t = normal_matrix * Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64);
        let t = t.try_normalize(1e-12).unwrap_or_else(Vector3::z);
        out.extend_from_slice(&[t.x as f32, t.y as f32, t.z as f32]);
    }
    out
}

/// Area-weighted vertex normals for indexed triangles.
pub fn compute_vertex_normals(positions: &[f32], indices: &[u32]) -> Vec<f32> {
    let mut normals = vec![0.0f32; positions.len()];
    let vertex = |i: usize| Vector3::new(positions[i * 3], positions[i * 3 + 1], positions[i * 3 + 2]);

    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if a * 3 + 2 >= positions.len() || b * 3 + 2 >= positions.len() || c * 3 + 2 >= positions.len() {
            continue;
        }
        let n = (vertex(b) - vertex(a)).cross(&(vertex(c) - vertex(a)));
        for idx in [a, b, c] {
            normals[idx * 3] += n.x;
            normals[idx * 3 + 1] += n.y;
            normals[idx * 3 + 2] += n.z;
        }
    }

    for n in normals.chunks_exact_mut(3) {
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        if len > 0.0 {
            n[0] /= len;
            n[1] /= len;
            n[2] /= len;
        } else {
            n.copy_from_slice(&[0.0, 0.0, 1.0]);
        }
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export_glb::export_mesh_group_glb;
    use crate::extrude::{extrude_shape, ExtrudeOptions, Shape, Vector2};
    use crate::models::{Material, Mesh, MeshGroup, Transform};
    use approx::assert_relative_eq;

    fn box_glb(offset: [f64; 3]) -> Vec<u8> {
        let shape = Shape {
            contour: vec![
                Vector2::new(0.0, 0.0),
                Vector2::new(2.0, 0.0),
                Vector2::new(2.0, 4.0),
                Vector2::new(0.0, 4.0),
            ],
            holes: Vec::new(),
        };
        let geometry = extrude_shape(&shape, &ExtrudeOptions::flat(6.0)).unwrap();
        let mut group = MeshGroup::new();
        group.add(Mesh {
            name: Some("box".to_string()),
            geometry,
            materials: vec![
                Material::double_sided(Color::from_hex(0xff0000)),
                Material::double_sided(Color::from_hex(0x0000ff)),
            ],
        });
        group.transform = Transform {
            position: offset,
            rotation: [0.0; 3],
        };
        export_mesh_group_glb(&group).unwrap()
    }

    #[test]
    fn loads_exported_glb_and_bakes_node_transform() {
        let model = load_glb(&box_glb([10.0, 0.0, 0.0])).unwrap();
        // caps and walls are separate primitives
        assert_eq!(model.meshes.len(), 2);
        assert_eq!(model.triangle_count(), 4 + 8);
        assert_eq!(model.meshes[0].color, Color::from_hex(0xff0000));

        let bbox = model.bounding_box();
        assert_relative_eq!(bbox.min[0], 10.0, epsilon = 1e-5);
        assert_relative_eq!(bbox.max[0], 12.0, epsilon = 1e-5);
        assert_relative_eq!(bbox.max[2], 6.0, epsilon = 1e-5);
    }

    #[test]
    fn centering_moves_bbox_center_to_origin() {
        let mut model = load_glb(&box_glb([10.0, 0.0, 0.0])).unwrap();
        model.center_on_origin();
        assert_relative_eq!(model.offset[0], -11.0, epsilon = 1e-5);
        assert_relative_eq!(model.offset[1], -2.0, epsilon = 1e-5);
        assert_relative_eq!(model.offset[2], -3.0, epsilon = 1e-5);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(load_glb(b"not a glb"), Err(SceneError::Gltf(_))));
    }

    #[test]
    fn computes_normals_for_flat_triangle() {
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let normals = compute_vertex_normals(&positions, &[0, 1, 2]);
        assert_eq!(&normals[0..3], &[0.0, 0.0, 1.0]);
    }
}
