use thiserror::Error;
use wasm_bindgen::JsValue;

use crate::extrude::ExtrudeError;

/// Failures of the scene bootstrap: fetching, decoding and GPU setup.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("invalid glTF asset: {0}")]
    Gltf(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("DOM error: {0}")]
    Dom(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("invalid {what}: {reason}")]
    Config { what: &'static str, reason: String },
}

impl From<serde_json::Error> for SceneError {
    fn from(e: serde_json::Error) -> Self {
        SceneError::Parse {
            what: "GeoJSON",
            reason: e.to_string(),
        }
    }
}

impl From<gltf::Error> for SceneError {
    fn from(e: gltf::Error) -> Self {
        SceneError::Gltf(e.to_string())
    }
}

impl From<SceneError> for JsValue {
    fn from(e: SceneError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}

/// Per-feature problems reported by the building extruder. None of them abort
/// processing of the remaining features.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildingError {
    #[error("feature {feature}: unknown geometry type {geometry_type}")]
    UnsupportedGeometry {
        feature: usize,
        geometry_type: String,
    },

    #[error("feature {feature}: malformed {geometry_type} coordinates: {reason}")]
    MalformedGeometry {
        feature: usize,
        geometry_type: String,
        reason: String,
    },

    #[error("feature {feature}: no geometry")]
    MissingGeometry { feature: usize },

    #[error("feature {feature}: no numeric '{property}' value, using {fallback}")]
    MissingHeight {
        feature: usize,
        property: String,
        fallback: f64,
    },

    #[error("feature {feature}, polygon {polygon}: {source}")]
    Extrude {
        feature: usize,
        polygon: usize,
        #[source]
        source: ExtrudeError,
    },

    #[error("feature {feature}, polygon {polygon}: skipping hole {hole}: {source}")]
    InvalidHole {
        feature: usize,
        polygon: usize,
        hole: usize,
        #[source]
        source: ExtrudeError,
    },
}

impl BuildingError {
    /// Warnings still yield a mesh; everything else drops geometry.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            BuildingError::MissingHeight { .. } | BuildingError::InvalidHole { .. }
        )
    }
}
