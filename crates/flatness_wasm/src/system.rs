//! Core WASM model wrapper and low-level utilities.

use flatness_core::model::FlatnessModel;
use flatness_core::probe::ProbeSettings;
use flatness_core::reduction::ReductionSettings;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmFlatnessSystem {
    pub(crate) model: FlatnessModel,
}

pub(crate) fn build_model(
    equations: &[String],
    param_names: &[String],
    var_names: &[String],
) -> anyhow::Result<FlatnessModel> {
    FlatnessModel::from_equations(var_names, param_names, equations)
}

pub(crate) fn build_model_from_pair(
    p1: &str,
    p0: &str,
    param_names: &[String],
    var_names: &[String],
) -> anyhow::Result<FlatnessModel> {
    FlatnessModel::from_tangent_system(var_names, param_names, p1, p0)
}

/// `seed == 0` draws fresh entropy for every run.
pub(crate) fn reduction_settings(max_iterations: u32, seed: u32) -> ReductionSettings {
    ReductionSettings {
        max_iterations: max_iterations as usize,
        probe: ProbeSettings {
            seed: (seed != 0).then_some(u64::from(seed)),
            ..ProbeSettings::default()
        },
    }
}

pub(crate) fn to_js_error(context: &str, err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{context}: {err:#}"))
}

#[wasm_bindgen]
impl WasmFlatnessSystem {
    #[wasm_bindgen(constructor)]
    pub fn new(
        equations: Vec<String>,
        param_names: Vec<String>,
        var_names: Vec<String>,
    ) -> Result<WasmFlatnessSystem, JsValue> {
        console_error_panic_hook::set_once();

        let model = build_model(&equations, &param_names, &var_names)
            .map_err(|e| to_js_error("Model setup failed", e))?;
        Ok(WasmFlatnessSystem { model })
    }

    pub fn from_tangent_pair(
        p1: &str,
        p0: &str,
        param_names: Vec<String>,
        var_names: Vec<String>,
    ) -> Result<WasmFlatnessSystem, JsValue> {
        console_error_panic_hook::set_once();

        let model = build_model_from_pair(p1, p0, &param_names, &var_names)
            .map_err(|e| to_js_error("Model setup failed", e))?;
        Ok(WasmFlatnessSystem { model })
    }

    pub fn dimension(&self) -> usize {
        self.model.context().dimension()
    }

    pub fn get_tangent_system(&self) -> Result<JsValue, JsValue> {
        to_value(self.model.tangent()).map_err(|e| to_js_error("Serialization error", e))
    }

    /// Runs the whole reduction in one call; see `WasmReductionRunner` for the stepped form.
    pub fn compute_flat_outputs(&self, max_iterations: u32, seed: u32) -> Result<JsValue, JsValue> {
        let sequence = self
            .model
            .run(reduction_settings(max_iterations, seed))
            .map_err(|e| to_js_error("Reduction failed", e))?;
        to_value(&sequence).map_err(|e| to_js_error("Serialization error", e))
    }
}
