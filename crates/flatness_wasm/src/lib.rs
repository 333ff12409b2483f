//! WASM bridge for `flatness_core`: model loading, a stepped reduction runner
//! and the unimodularity check.

mod reduction;
mod system;
mod unimodular;

pub use reduction::WasmReductionRunner;
pub use system::WasmFlatnessSystem;
pub use unimodular::check_unimodular;
