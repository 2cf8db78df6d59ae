// Scene graph, asset lifecycle and the renderer seam
use std::collections::HashMap;

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::annotations::{AxesHelper, LineGeometry, TextLabel};
use crate::buildings::make_buildings;
use crate::camera::{OrbitControls, PerspectiveCamera};
use crate::config::{DirectionalLightConfig, LightConfig, ViewerConfig};
use crate::error::SceneError;
use crate::geojson_features::FeatureCollection;
use crate::gltf_model::LoadedModel;
use crate::models::{Color, MeshGroup};
use crate::{console_error, console_log, console_warn};

#[derive(Debug, Clone, PartialEq)]
pub enum AssetState {
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneNode {
    Model(LoadedModel),
    Buildings(MeshGroup),
    Axes(LineGeometry),
}

/// Triangles in world space with one color per vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColoredMesh {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub colors: Vec<f32>,
    pub indices: Vec<u32>,
}

impl ColoredMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    fn push_vertex(&mut self, position: Point3<f64>, normal: Vector3<f64>, color: Color) -> u32 {
        let index = self.vertex_count() as u32;
        self.positions
            .extend_from_slice(&[position.x as f32, position.y as f32, position.z as f32]);
        self.normals
            .extend_from_slice(&[normal.x as f32, normal.y as f32, normal.z as f32]);
        self.colors.extend_from_slice(&color.to_array());
        index
    }
}

/// Everything the GPU needs for one upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatScene {
    pub triangles: ColoredMesh,
    pub lines: LineGeometry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub background: Color,
    pub ambient_light: LightConfig,
    pub directional_lights: Vec<DirectionalLightConfig>,
    pub nodes: Vec<SceneNode>,
    pub labels: Vec<TextLabel>,
    /// Bumped whenever `nodes` changes so renderers know to re-upload.
    pub revision: u64,
}

impl Scene {
    pub fn from_config(config: &ViewerConfig) -> Self {
        let mut scene = Scene {
            background: config.background.0,
            ambient_light: config.ambient_light.clone(),
            directional_lights: config.directional_lights.clone(),
            nodes: Vec::new(),
            labels: config.annotations.iter().map(TextLabel::from).collect(),
            revision: 0,
        };
        if let Some(size) = config.axes_size {
            scene.add(SceneNode::Axes(AxesHelper::new(size as f32).geometry()));
        }
        scene
    }

    pub fn add(&mut self, node: SceneNode) {
        self.nodes.push(node);
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.labels.clear();
        self.revision += 1;
    }

    pub fn flatten(&self) -> FlatScene {
        let mut flat = FlatScene::default();
        for node in &self.nodes {
            match node {
                SceneNode::Model(model) => flatten_model(model, &mut flat.triangles),
                SceneNode::Buildings(group) => flatten_group(group, &mut flat.triangles),
                SceneNode::Axes(lines) => {
                    flat.lines.positions.extend_from_slice(&lines.positions);
                    flat.lines.colors.extend_from_slice(&lines.colors);
                }
            }
        }
        flat
    }
}

fn flatten_model(model: &LoadedModel, out: &mut ColoredMesh) {
    let [ox, oy, oz] = model.offset;
    let offset = Vector3::new(ox, oy, oz);
    for mesh in &model.meshes {
        let base = out.vertex_count() as u32;
        for (p, n) in mesh.positions.chunks_exact(3).zip(mesh.normals.chunks_exact(3)) {
            let position = Point3::new(p[0] as f64, p[1] as f64, p[2] as f64) + offset;
            let normal = Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64);
            out.push_vertex(position, normal, mesh.color);
        }
        let count = (out.vertex_count() as u32) - base;
        out.indices
            .extend(mesh.indices.iter().filter(|&&i| i < count).map(|i| base + i));
    }
}

// Vertices are duplicated per material group so each keeps its group's color.
fn flatten_group(group: &MeshGroup, out: &mut ColoredMesh) {
    let matrix: Matrix4<f64> = group.transform.matrix();
    let rotation: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();

    for mesh in &group.meshes {
        let geometry = &mesh.geometry;
        let vertex_count = geometry.vertex_count();
        let has_normals = geometry.normals.len() == geometry.positions.len();
        let whole = [(0, geometry.indices.len(), 0)];
        let groups: Vec<(usize, usize, usize)> = if geometry.groups.is_empty() {
            whole.to_vec()
        } else {
            geometry
                .groups
                .iter()
                .map(|g| (g.start, g.count, g.material_index))
                .collect()
        };

        for (start, count, material_index) in groups {
            let color = mesh
                .materials
                .get(material_index)
                .map(|m| m.color)
                .unwrap_or_else(|| Color::from_hex(0xffffff));
            let end = (start + count).min(geometry.indices.len());
            let mut remap: HashMap<u32, u32> = HashMap::new();

            for &index in geometry.indices.get(start..end).unwrap_or_default() {
                let i = index as usize;
                if i >= vertex_count {
                    continue;
                }
                let mapped = *remap.entry(index).or_insert_with(|| {
                    let p = &geometry.positions[i * 3..i * 3 + 3];
                    let position = matrix.transform_point(&Point3::new(p[0] as f64, p[1] as f64, p[2] as f64));
                    let normal = if has_normals {
                        let n = &geometry.normals[i * 3..i * 3 + 3];
                        rotation * Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64)
                    } else {
                        Vector3::y()
                    };
                    out.push_vertex(position, normal, color)
                });
                out.indices.push(mapped);
            }
        }
    }
}

/// Lighting and clear values a renderer needs each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLighting {
    pub clear_color: [f32; 3],
    pub ambient: [f32; 3],
    /// Up to two directional lights: direction toward the light and scaled color.
    pub directional: [([f32; 3], [f32; 3]); 2],
}

impl Scene {
    pub fn lighting(&self) -> FrameLighting {
        let mut directional = [([0.0, 1.0, 0.0], [0.0; 3]); 2];
        for (slot, light) in directional.iter_mut().zip(&self.directional_lights) {
            let [x, y, z] = light.position;
            let dir = Vector3::new(x, y, z).try_normalize(1e-12).unwrap_or_else(Vector3::y);
            *slot = (
                [dir.x as f32, dir.y as f32, dir.z as f32],
                light.color.0.scaled(light.intensity),
            );
        }
        FrameLighting {
            clear_color: self.background.to_array(),
            ambient: self.ambient_light.color.0.scaled(self.ambient_light.intensity),
            directional,
        }
    }
}

/// Output surface for a scene. The wasm build draws through wgpu; tests use
/// [`HeadlessRenderer`].
pub trait SceneRenderer {
    fn resize(&mut self, width: u32, height: u32);
    fn size(&self) -> (u32, u32);
    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), SceneError>;
}

/// Records frames without touching a GPU.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    width: u32,
    height: u32,
    pub frames: usize,
    pub uploads: usize,
    uploaded_revision: Option<u64>,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }
}

impl SceneRenderer for HeadlessRenderer {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn render(&mut self, scene: &Scene, _camera: &PerspectiveCamera) -> Result<(), SceneError> {
        if self.uploaded_revision != Some(scene.revision) {
            self.uploaded_revision = Some(scene.revision);
            self.uploads += 1;
        }
        self.frames += 1;
        Ok(())
    }
}

/// Everything the render loop and event handlers share.
pub struct SceneContext {
    pub config: ViewerConfig,
    pub scene: Scene,
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    pub model_state: AssetState,
    pub buildings_state: AssetState,
}

impl SceneContext {
    pub fn new(config: ViewerConfig, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let camera = PerspectiveCamera::from_config(&config.camera, width as f64 / height as f64);
        let controls = OrbitControls::new(&config.controls, camera.target);
        Self {
            scene: Scene::from_config(&config),
            camera,
            controls,
            model_state: AssetState::Idle,
            buildings_state: AssetState::Idle,
            config,
        }
    }

    pub fn begin_model_load(&mut self) {
        self.model_state = AssetState::Loading;
    }

    /// Results that arrive after `dispose` are dropped.
    pub fn finish_model_load(&mut self, result: Result<LoadedModel, SceneError>) {
        if self.model_state != AssetState::Loading {
            return;
        }
        match result {
            Ok(mut model) => {
                model.center_on_origin();
                console_log!(
                    "Model loaded: {} meshes, {} triangles",
                    model.meshes.len(),
                    model.triangle_count()
                );
                self.scene.add(SceneNode::Model(model));
                self.model_state = AssetState::Loaded;
            }
            Err(e) => {
                console_error!("An error happened while loading the model: {}", e);
                self.model_state = AssetState::Failed(e.to_string());
            }
        }
    }

    pub fn begin_buildings_load(&mut self) {
        self.buildings_state = AssetState::Loading;
    }

    /// Takes the fetched GeoJSON text (or the fetch error) and extrudes it.
    pub fn finish_buildings_load(&mut self, result: Result<String, SceneError>) {
        if self.buildings_state != AssetState::Loading {
            return;
        }
        let collection = result.and_then(|text| FeatureCollection::from_json(&text));
        match collection {
            Ok(collection) => {
                let output = make_buildings(&collection, &self.config.buildings);
                if !output.errors.is_empty() {
                    console_warn!("{} building features reported problems", output.errors.len());
                }
                self.add_buildings(output.group);
                self.buildings_state = AssetState::Loaded;
            }
            Err(e) => {
                console_error!("An error happened while loading buildings: {}", e);
                self.buildings_state = AssetState::Failed(e.to_string());
            }
        }
    }

    /// Place an extruded group with the configured buildings transform.
    pub fn add_buildings(&mut self, mut group: MeshGroup) {
        group.transform = self.config.buildings_transform;
        self.scene.add(SceneNode::Buildings(group));
    }

    pub fn resize(&mut self, width: u32, height: u32, renderer: &mut dyn SceneRenderer) {
        let (width, height) = (width.max(1), height.max(1));
        self.camera.set_aspect(width as f64 / height as f64);
        renderer.resize(width, height);
    }

    pub fn render(&mut self, renderer: &mut dyn SceneRenderer) -> Result<(), SceneError> {
        self.controls.update(&mut self.camera);
        renderer.render(&self.scene, &self.camera)
    }

    /// Screen positions of the annotation labels for the given viewport.
    pub fn label_positions(&self, width: f64, height: f64) -> Vec<Option<[f64; 2]>> {
        self.scene
            .labels
            .iter()
            .map(|label| label.screen_position(&self.camera, width, height))
            .collect()
    }

    pub fn dispose(&mut self) {
        self.scene.clear();
        self.controls.enabled = false;
        self.model_state = AssetState::Idle;
        self.buildings_state = AssetState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrude::{extrude_shape, ExtrudeOptions, Shape, Vector2};
    use crate::models::{Material, Mesh};
    use approx::assert_relative_eq;

    fn context() -> (SceneContext, HeadlessRenderer) {
        (SceneContext::new(ViewerConfig::default(), 800, 600), HeadlessRenderer::new(800, 600))
    }

    fn unit_building(height: f64) -> MeshGroup {
        let shape = Shape {
            contour: vec![
                Vector2::new(0.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(1.0, 1.0),
                Vector2::new(0.0, 1.0),
            ],
            holes: Vec::new(),
        };
        let mut group = MeshGroup::new();
        group.add(Mesh {
            name: None,
            geometry: extrude_shape(&shape, &ExtrudeOptions::flat(height)).unwrap(),
            materials: vec![
                Material::double_sided(Color::from_hex(0x00ff00)),
                Material::double_sided(Color::from_hex(0x008080)),
            ],
        });
        group
    }

    #[test]
    fn resize_updates_aspect_and_renderer_size() {
        let (mut ctx, mut renderer) = context();
        ctx.resize(1024, 256, &mut renderer);
        assert_relative_eq!(ctx.camera.aspect, 4.0);
        assert_eq!(renderer.size(), (1024, 256));

        ctx.resize(0, 0, &mut renderer);
        assert_eq!(renderer.size(), (1, 1));
        assert_relative_eq!(ctx.camera.aspect, 1.0);
    }

    #[test]
    fn default_scene_has_axes_and_labels() {
        let (ctx, _) = context();
        assert_eq!(ctx.scene.nodes.len(), 1);
        assert_eq!(ctx.scene.labels.len(), 3);
        assert_eq!(ctx.scene.flatten().lines.segment_count(), 3);
        assert_eq!(ctx.camera.position, Point3::new(20.0, 20.0, 20.0));
    }

    #[test]
    fn failed_model_load_keeps_rendering() {
        let (mut ctx, mut renderer) = context();
        ctx.begin_model_load();
        assert_eq!(ctx.model_state, AssetState::Loading);
        ctx.finish_model_load(Err(SceneError::Fetch {
            url: "preview.glb".to_string(),
            reason: "404".to_string(),
        }));
        assert!(matches!(ctx.model_state, AssetState::Failed(ref reason) if reason.contains("404")));

        ctx.render(&mut renderer).unwrap();
        ctx.render(&mut renderer).unwrap();
        assert_eq!(renderer.frames, 2);
    }

    #[test]
    fn buildings_are_rotated_so_extrusion_points_up() {
        let (mut ctx, mut renderer) = context();
        ctx.add_buildings(unit_building(5.0));
        let flat = ctx.scene.flatten();
        let max_y = flat
            .triangles
            .positions
            .chunks_exact(3)
            .map(|p| p[1])
            .fold(f32::MIN, f32::max);
        assert_relative_eq!(max_y, 5.0, epsilon = 1e-5);
        // cap and wall vertices keep their own colors
        assert!(flat.triangles.colors.chunks_exact(3).any(|c| c == [0.0, 1.0, 0.0]));
        assert!(flat.triangles.colors.chunks_exact(3).any(|c| c[0] == 0.0 && c[1] > 0.4 && c[1] < 0.6));

        ctx.render(&mut renderer).unwrap();
        ctx.render(&mut renderer).unwrap();
        assert_eq!(renderer.uploads, 1);
    }

    #[test]
    fn empty_buildings_render_nothing() {
        let (mut ctx, mut renderer) = context();
        ctx.begin_buildings_load();
        ctx.finish_buildings_load(Ok(r#"{"type":"FeatureCollection","features":[]}"#.to_string()));
        assert_eq!(ctx.buildings_state, AssetState::Loaded);
        assert!(ctx.scene.flatten().triangles.indices.is_empty());
        assert!(ctx.render(&mut renderer).is_ok());
    }

    #[test]
    fn broken_geojson_marks_buildings_failed() {
        let (mut ctx, _) = context();
        ctx.begin_buildings_load();
        ctx.finish_buildings_load(Ok("{not json".to_string()));
        assert!(matches!(ctx.buildings_state, AssetState::Failed(_)));
    }

    #[test]
    fn lighting_scales_colors_by_intensity() {
        let (ctx, _) = context();
        let lighting = ctx.scene.lighting();
        assert_relative_eq!(lighting.ambient[0], 0.8);
        assert_eq!(lighting.directional[0].1, [3.0, 0.0, 0.0]);
        assert_eq!(lighting.directional[1].1, [0.0, 5.0, 5.0]);
    }

    #[test]
    fn dispose_clears_everything() {
        let (mut ctx, _) = context();
        ctx.add_buildings(unit_building(1.0));
        ctx.begin_model_load();
        ctx.dispose();
        assert!(ctx.scene.nodes.is_empty());
        assert!(ctx.scene.labels.is_empty());
        assert_eq!(ctx.model_state, AssetState::Idle);
        assert!(!ctx.controls.enabled);

        // a load that was in flight lands after teardown
        ctx.finish_model_load(Ok(LoadedModel::default()));
        assert!(ctx.scene.nodes.is_empty());
        assert_eq!(ctx.model_state, AssetState::Idle);
    }
}
