use wasm_bindgen::prelude::*;

// Create a console module for logging
pub mod console;
pub mod error;
pub mod models;
pub mod config;
// Projected map coordinates to scene units
pub mod transform;
pub mod geojson_features;
// Import our geometry functions
#[path = "../geometry_functions/extrude.rs"]
pub mod extrude;
pub mod buildings;
pub mod camera;
pub mod annotations;
pub mod gltf_model;
pub mod export_glb;
pub mod scene;

// Browser-only pieces: GPU surface, animation frames, DOM wiring
#[cfg(target_arch = "wasm32")]
mod gpu_renderer;
#[cfg(target_arch = "wasm32")]
mod render_loop;
#[cfg(target_arch = "wasm32")]
pub mod viewer;

pub use buildings::{make_buildings, BuildingOptions, BuildingsOutput};
pub use config::ViewerConfig;
pub use error::{BuildingError, SceneError};
pub use scene::{AssetState, SceneContext, SceneRenderer};

// Enable better panic messages in console during development
#[cfg(feature = "console_error_panic_hook")]
pub use console_error_panic_hook::set_once as set_panic_hook;

#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => ($crate::console::log(&format!($($t)*)))
}

#[macro_export]
macro_rules! console_warn {
    ($($t:tt)*) => ($crate::console::warn(&format!($($t)*)))
}

#[macro_export]
macro_rules! console_error {
    ($($t:tt)*) => ($crate::console::error(&format!($($t)*)))
}

use std::sync::Once;
static INIT: Once = Once::new();

#[wasm_bindgen(start)]
pub fn start() {
    INIT.call_once(|| {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        console_log!("cityscene wasm module initialized");
    });
}
