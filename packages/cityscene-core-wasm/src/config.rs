// Viewer configuration. Every field has a default so hosts only pass overrides.
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;

use crate::buildings::BuildingOptions;
use crate::error::SceneError;
use crate::models::{Color, HexColor, Transform};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraConfig {
    pub fov: f64,
    pub near: f64,
    pub far: f64,
    pub position: [f64; 3],
    pub target: [f64; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 60.0,
            near: 0.1,
            far: 1000.0,
            position: [20.0, 20.0, 20.0],
            target: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlsConfig {
    pub rotate_speed: f64,
    pub zoom_speed: f64,
    pub pan_speed: f64,
    pub min_distance: f64,
    pub max_distance: f64,
    /// Fraction of the pending motion kept after each frame; 0 disables damping.
    pub damping: f64,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            min_distance: 0.5,
            max_distance: 900.0,
            damping: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightConfig {
    pub color: HexColor,
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionalLightConfig {
    pub color: HexColor,
    pub intensity: f32,
    pub position: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationConfig {
    pub text: String,
    pub position: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerConfig {
    pub model_url: Option<String>,
    pub buildings_url: Option<String>,
    pub buildings: BuildingOptions,
    pub buildings_transform: Transform,
    pub camera: CameraConfig,
    pub controls: ControlsConfig,
    pub background: HexColor,
    pub ambient_light: LightConfig,
    pub directional_lights: Vec<DirectionalLightConfig>,
    /// Length of the axes helper; `None` hides it.
    pub axes_size: Option<f64>,
    pub annotations: Vec<AnnotationConfig>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let axes_size = 10.0;
        Self {
            model_url: Some("preview.glb".to_string()),
            buildings_url: None,
            buildings: BuildingOptions::default(),
            buildings_transform: Transform {
                position: [0.0, 0.0, 0.0],
                // Extrusion runs along local +Z; the scene is Y-up.
                rotation: [-std::f64::consts::FRAC_PI_2, 0.0, 0.0],
            },
            camera: CameraConfig::default(),
            controls: ControlsConfig::default(),
            background: HexColor(Color::from_hex(0xf0f0f0)),
            ambient_light: LightConfig {
                color: HexColor(Color::from_hex(0xffffff)),
                intensity: 0.8,
            },
            directional_lights: vec![
                DirectionalLightConfig {
                    color: HexColor(Color::from_hex(0xff0000)),
                    intensity: 3.0,
                    position: [10.0, 100.0, 100.0],
                },
                DirectionalLightConfig {
                    color: HexColor(Color::from_hex(0x00ffff)),
                    intensity: 5.0,
                    position: [50.0, 100.0, 75.0],
                },
            ],
            axes_size: Some(axes_size),
            annotations: ["x", "y", "z"]
                .iter()
                .enumerate()
                .map(|(axis, label)| {
                    let mut position = [0.0; 3];
                    position[axis] = axes_size * 1.05;
                    AnnotationConfig {
                        text: label.to_string(),
                        position,
                    }
                })
                .collect(),
        }
    }
}

impl ViewerConfig {
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let config: Self = serde_json::from_str(json).map_err(|e| SceneError::Parse {
            what: "viewer config",
            reason: e.to_string(),
        })?;
        config.buildings.validate()?;
        Ok(config)
    }

    /// `undefined` and `null` select the defaults.
    pub fn from_js(value: JsValue) -> Result<Self, SceneError> {
        if value.is_undefined() || value.is_null() {
            return Ok(Self::default());
        }
        let config: Self = serde_wasm_bindgen::from_value(value).map_err(|e| SceneError::Parse {
            what: "viewer config",
            reason: e.to_string(),
        })?;
        config.buildings.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = ViewerConfig::from_json("{}").unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.camera.fov, 60.0);
        assert_eq!(config.directional_lights.len(), 2);
        assert_eq!(config.annotations.len(), 3);
        assert_eq!(config.model_url.as_deref(), Some("preview.glb"));
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let config = ViewerConfig::from_json(
            r##"{
                "buildingsUrl": "/geo/buildings.geojson",
                "camera": {"fov": 45},
                "background": "#000000",
                "buildings": {"scale": 5, "heightProperty": "height"}
            }"##,
        )
        .unwrap();
        assert_eq!(config.buildings_url.as_deref(), Some("/geo/buildings.geojson"));
        assert_eq!(config.camera.fov, 45.0);
        assert_eq!(config.camera.far, 1000.0);
        assert_eq!(config.background.0, Color::from_hex(0x000000));
        assert_eq!(config.buildings.scale, 5.0);
        assert_eq!(config.buildings.height_property, "height");
        assert_eq!(config.buildings.default_height, 1.0);
    }

    #[test]
    fn invalid_color_is_a_parse_error() {
        let err = ViewerConfig::from_json(r#"{"background": "grey"}"#).unwrap_err();
        assert!(matches!(err, SceneError::Parse { what: "viewer config", .. }));
    }

    #[test]
    fn non_positive_building_scale_is_rejected() {
        for scale in ["0", "-10"] {
            let json = format!(r#"{{"buildings": {{"scale": {}}}}}"#, scale);
            let err = ViewerConfig::from_json(&json).unwrap_err();
            assert!(matches!(err, SceneError::Config { what: "building options", .. }));
        }
    }
}
