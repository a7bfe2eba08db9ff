//! WASM bridge for `planar_core`: one configured model per `WasmPlanarModel`,
//! results handed to JavaScript as plain serialized objects.

mod analysis;
mod model;

pub use model::WasmPlanarModel;
