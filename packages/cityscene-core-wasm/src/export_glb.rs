// Binary glTF 2.0 writer for extruded building groups
use nalgebra::UnitQuaternion;
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;

use crate::buildings::make_buildings;
use crate::config::ViewerConfig;
use crate::console_log;
use crate::error::SceneError;
use crate::geojson_features::FeatureCollection;
use crate::models::{BufferGeometry, Material, MeshGroup, Side};

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;

/// Accumulates the BIN chunk and the JSON arrays that point into it.
#[derive(Default)]
struct GlbBuilder {
    bin: Vec<u8>,
    buffer_views: Vec<Value>,
    accessors: Vec<Value>,
    materials: Vec<Value>,
    material_keys: Vec<(u32, bool)>,
}

impl GlbBuilder {
    fn push_view(&mut self, bytes: &[u8], target: u32) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.buffer_views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": bytes.len(),
            "target": target,
        }));
        self.buffer_views.len() - 1
    }

    fn push_accessor(&mut self, accessor: Value) -> usize {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn vec3_accessor(&mut self, data: &[f32], with_bounds: bool) -> usize {
        let view = self.push_view(bytemuck::cast_slice(data), ARRAY_BUFFER);
        let mut accessor = json!({
            "bufferView": view,
            "componentType": FLOAT,
            "count": data.len() / 3,
            "type": "VEC3",
        });
        if with_bounds {
            let mut min = [f32::INFINITY; 3];
            let mut max = [f32::NEG_INFINITY; 3];
            for p in data.chunks_exact(3) {
                for i in 0..3 {
                    min[i] = min[i].min(p[i]);
                    max[i] = max[i].max(p[i]);
                }
            }
            accessor["min"] = json!(min);
            accessor["max"] = json!(max);
        }
        self.push_accessor(accessor)
    }

    /// Materials are shared across meshes by color and sidedness.
    fn material(&mut self, material: &Material) -> usize {
        let c = material.color;
        let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        let key = (
            (to_byte(c.r) << 16) | (to_byte(c.g) << 8) | to_byte(c.b),
            material.side == Side::Double,
        );
        if let Some(index) = self.material_keys.iter().position(|k| *k == key) {
            return index;
        }
        self.material_keys.push(key);
        self.materials.push(json!({
            "pbrMetallicRoughness": {
                "baseColorFactor": [c.r, c.g, c.b, 1.0],
                "metallicFactor": 0.0,
                "roughnessFactor": 1.0,
            },
            "doubleSided": key.1,
        }));
        self.materials.len() - 1
    }

    fn mesh(&mut self, geometry: &BufferGeometry, materials: &[Material], name: Option<&str>) -> Option<Value> {
        if geometry.is_empty() {
            return None;
        }
        let position = self.vec3_accessor(&geometry.positions, true);
        let normal = (geometry.normals.len() == geometry.positions.len())
            .then(|| self.vec3_accessor(&geometry.normals, false));
        let uv = (geometry.uvs.len() / 2 == geometry.vertex_count()).then(|| {
            let view = self.push_view(bytemuck::cast_slice(&geometry.uvs), ARRAY_BUFFER);
            self.push_accessor(json!({
                "bufferView": view,
                "componentType": FLOAT,
                "count": geometry.uvs.len() / 2,
                "type": "VEC2",
            }))
        });
        let index_view = self.push_view(bytemuck::cast_slice(&geometry.indices), ELEMENT_ARRAY_BUFFER);

        let mut attributes = json!({ "POSITION": position });
        if let Some(normal) = normal {
            attributes["NORMAL"] = json!(normal);
        }
        if let Some(uv) = uv {
            attributes["TEXCOORD_0"] = json!(uv);
        }

        // Without groups the whole index buffer is one primitive.
        let ranges: Vec<(usize, usize, usize)> = if geometry.groups.is_empty() {
            vec![(0, geometry.indices.len(), 0)]
        } else {
            geometry
                .groups
                .iter()
                .map(|g| (g.start, g.count, g.material_index))
                .collect()
        };

        let mut primitives = Vec::new();
        for (start, count, material_index) in ranges {
            if count == 0 || start + count > geometry.indices.len() {
                continue;
            }
            let indices = self.push_accessor(json!({
                "bufferView": index_view,
                "byteOffset": start * 4,
                "componentType": UNSIGNED_INT,
                "count": count,
                "type": "SCALAR",
            }));
            let mut primitive = json!({
                "attributes": attributes.clone(),
                "indices": indices,
                "mode": 4,
            });
            if let Some(material) = materials.get(material_index) {
                primitive["material"] = json!(self.material(material));
            }
            primitives.push(primitive);
        }
        if primitives.is_empty() {
            return None;
        }

        let mut mesh = json!({ "primitives": primitives });
        if let Some(name) = name {
            mesh["name"] = json!(name);
        }
        Some(mesh)
    }
}

/// Serialize a mesh group as GLB. The group transform lands on a root node with
/// one child node per mesh.
pub fn export_mesh_group_glb(group: &MeshGroup) -> Result<Vec<u8>, SceneError> {
    let mut builder = GlbBuilder::default();
    let mut meshes = Vec::new();
    let mut nodes = vec![Value::Null];

    for mesh in &group.meshes {
        if let Some(gltf_mesh) = builder.mesh(&mesh.geometry, &mesh.materials, mesh.name.as_deref()) {
            let mut node = json!({ "mesh": meshes.len() });
            if let Some(name) = &mesh.name {
                node["name"] = json!(name);
            }
            meshes.push(gltf_mesh);
            nodes.push(node);
        }
    }
    if meshes.is_empty() {
        return Err(SceneError::Export("mesh group has no geometry".to_string()));
    }

    let [rx, ry, rz] = group.transform.rotation;
    let q = UnitQuaternion::from_euler_angles(rx, ry, rz);
    let children: Vec<usize> = (1..nodes.len()).collect();
    nodes[0] = json!({
        "name": "buildings",
        "translation": group.transform.position,
        "rotation": [q.i, q.j, q.k, q.w],
        "children": children,
    });

    while builder.bin.len() % 4 != 0 {
        builder.bin.push(0);
    }
    let document = json!({
        "asset": { "version": "2.0", "generator": "cityscene-core-wasm" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": nodes,
        "meshes": meshes,
        "materials": builder.materials,
        "accessors": builder.accessors,
        "bufferViews": builder.buffer_views,
        "buffers": [{ "byteLength": builder.bin.len() }],
    });

    let mut json_bytes =
        serde_json::to_vec(&document).map_err(|e| SceneError::Export(e.to_string()))?;
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }

    let total = 12 + 8 + json_bytes.len() + 8 + builder.bin.len();
    let total = u32::try_from(total).map_err(|_| SceneError::Export("GLB exceeds 4 GiB".to_string()))?;

    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_bytes);
    out.extend_from_slice(&(builder.bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&builder.bin);

    console_log!(
        "Exported {} meshes to GLB ({} bytes)",
        meshes.len(),
        out.len()
    );
    Ok(out)
}

/// Extrude a GeoJSON string and return the result as GLB bytes. `config` is a
/// viewer config object; its `buildings` and `buildingsTransform` sections apply.
#[wasm_bindgen]
pub fn export_buildings_glb(geojson: &str, config: JsValue) -> Result<Vec<u8>, JsValue> {
    let config = ViewerConfig::from_js(config)?;
    let collection = FeatureCollection::from_json(geojson)?;
    let mut output = make_buildings(&collection, &config.buildings);
    output.group.transform = config.buildings_transform;
    Ok(export_mesh_group_glb(&output.group)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Color, GeometryGroup, Mesh, Transform};

    fn triangle_mesh(name: &str, color: u32) -> Mesh {
        Mesh {
            name: Some(name.to_string()),
            geometry: BufferGeometry {
                positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                normals: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
                uvs: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
                indices: vec![0, 1, 2],
                groups: vec![GeometryGroup {
                    start: 0,
                    count: 3,
                    material_index: 0,
                }],
            },
            materials: vec![Material::double_sided(Color::from_hex(color))],
        }
    }

    fn read_json_chunk(glb: &[u8]) -> Value {
        let len = u32::from_le_bytes([glb[12], glb[13], glb[14], glb[15]]) as usize;
        serde_json::from_slice(&glb[20..20 + len]).unwrap()
    }

    #[test]
    fn header_and_chunks_are_aligned() {
        let mut group = MeshGroup::new();
        group.add(triangle_mesh("a", 0x00ff00));
        let glb = export_mesh_group_glb(&group).unwrap();

        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes([glb[4], glb[5], glb[6], glb[7]]), 2);
        assert_eq!(u32::from_le_bytes([glb[8], glb[9], glb[10], glb[11]]) as usize, glb.len());
        assert_eq!(glb.len() % 4, 0);
    }

    #[test]
    fn materials_are_shared_and_root_carries_the_transform() {
        let mut group = MeshGroup::new();
        group.add(triangle_mesh("a", 0x00ff00));
        group.add(triangle_mesh("b", 0x00ff00));
        group.add(triangle_mesh("c", 0x008080));
        group.transform = Transform {
            position: [1.0, 2.0, 3.0],
            rotation: [-std::f64::consts::FRAC_PI_2, 0.0, 0.0],
        };
        let doc = read_json_chunk(&export_mesh_group_glb(&group).unwrap());

        assert_eq!(doc["meshes"].as_array().unwrap().len(), 3);
        assert_eq!(doc["materials"].as_array().unwrap().len(), 2);
        assert_eq!(doc["nodes"][0]["children"], json!([1, 2, 3]));
        assert_eq!(doc["nodes"][0]["translation"], json!([1.0, 2.0, 3.0]));
        let rotation = doc["nodes"][0]["rotation"].as_array().unwrap();
        let x = rotation[0].as_f64().unwrap();
        assert!((x + std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
        assert_eq!(doc["nodes"][1]["name"], "a");
    }

    #[test]
    fn empty_group_is_an_error() {
        let err = export_mesh_group_glb(&MeshGroup::new()).unwrap_err();
        assert!(matches!(err, SceneError::Export(_)));
    }
}
