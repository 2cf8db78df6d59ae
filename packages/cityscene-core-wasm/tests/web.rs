//! Browser tests for the JS-facing exports.
#![cfg(target_arch = "wasm32")]

use cityscene_core_wasm::buildings::make_buildings_js;
use cityscene_core_wasm::export_glb::export_buildings_glb;
use cityscene_core_wasm::extrude::extrude_geometry;
use js_sys::{Array, Float32Array, Reflect, Uint32Array, JSON};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

const BUILDINGS: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"hoehe": 50},
         "geometry": {"type": "Polygon", "coordinates": [[
            [935570.065, 6276230.155], [935580.065, 6276230.155],
            [935580.065, 6276240.155], [935570.065, 6276240.155],
            [935570.065, 6276230.155]]]}},
        {"type": "Feature", "properties": {"hoehe": 10},
         "geometry": {"type": "Point", "coordinates": [935570.0, 6276230.0]}}
    ]
}"#;

fn get(value: &JsValue, key: &str) -> JsValue {
    Reflect::get(value, &key.into()).unwrap()
}

#[wasm_bindgen_test]
fn make_buildings_js_reports_meshes_and_errors() {
    let result = make_buildings_js(BUILDINGS, JsValue::UNDEFINED).unwrap();
    let meshes: Array = get(&result, "meshes").dyn_into().unwrap();
    let errors: Array = get(&result, "errors").dyn_into().unwrap();
    assert_eq!(meshes.length(), 1);
    assert_eq!(errors.length(), 1);
    assert!(errors.get(0).as_string().unwrap().contains("Point"));
}

#[wasm_bindgen_test]
fn make_buildings_js_rejects_invalid_json() {
    assert!(make_buildings_js("{", JsValue::UNDEFINED).is_err());
}

#[wasm_bindgen_test]
fn make_buildings_js_rejects_zero_scale() {
    let options = JSON::parse(r#"{"scale": 0}"#).unwrap();
    let err = make_buildings_js(BUILDINGS, options).unwrap_err();
    assert!(err.as_string().unwrap().contains("scale"));
}

#[wasm_bindgen_test]
fn extrude_geometry_returns_typed_arrays() {
    let shapes = JSON::parse("[[[[0,0],[2,0],[2,2],[0,2]]]]").unwrap();
    let options = JSON::parse(r#"{"depth": 3}"#).unwrap();
    let geometry = extrude_geometry(&shapes, &options).unwrap();

    let position: Float32Array = get(&geometry, "position").dyn_into().unwrap();
    let index: Uint32Array = get(&geometry, "index").dyn_into().unwrap();
    let groups: Array = get(&geometry, "groups").dyn_into().unwrap();
    assert_eq!(index.length() % 3, 0);
    assert_eq!(position.length() % 3, 0);
    assert_eq!(groups.length(), 2);

    let max_z = position
        .to_vec()
        .chunks_exact(3)
        .map(|p| p[2])
        .fold(f32::MIN, f32::max);
    assert_eq!(max_z, 3.0);
}

#[wasm_bindgen_test]
fn export_buildings_glb_writes_a_glb_header() {
    let bytes = export_buildings_glb(BUILDINGS, JsValue::UNDEFINED).unwrap();
    assert_eq!(&bytes[0..4], b"glTF");
}
