//! Stepped reduction runner.

use crate::system::{build_model, build_model_from_pair, reduction_settings, to_js_error};
use flatness_core::model::FlatnessModel;
use flatness_core::reduction::{ReductionEngine, StepOutcome};
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

/// Progress payload for the stepped reduction.
#[derive(Debug, Serialize, PartialEq)]
struct ReductionProgress {
    done: bool,
    terminal: bool,
    iterations: usize,
    max_iterations: usize,
}

#[wasm_bindgen]
pub struct WasmReductionRunner {
    engine: Option<ReductionEngine<'static>>,
}

impl WasmReductionRunner {
    fn from_model(model: &FlatnessModel, max_iterations: u32, seed: u32) -> Self {
        WasmReductionRunner {
            engine: Some(model.engine(reduction_settings(max_iterations, seed))),
        }
    }

    fn engine(&self) -> Result<&ReductionEngine<'static>, String> {
        self.engine
            .as_ref()
            .ok_or_else(|| "Runner not initialized".to_string())
    }

    fn progress(&self) -> Result<ReductionProgress, String> {
        let engine = self.engine()?;
        Ok(ReductionProgress {
            done: engine.is_done(),
            terminal: engine.is_terminal(),
            iterations: engine.sequence().len(),
            max_iterations: engine.run_context().settings.max_iterations,
        })
    }

    fn advance(&mut self, batch_size: u32) -> Result<ReductionProgress, String> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| "Runner not initialized".to_string())?;

        for _ in 0..batch_size {
            if engine.is_done() {
                break;
            }
            match engine.step() {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Terminal) => break,
                Err(err) => return Err(format!("Reduction failed: {err}")),
            }
        }
        self.progress()
    }
}

#[wasm_bindgen]
impl WasmReductionRunner {
    #[wasm_bindgen(constructor)]
    pub fn new(
        equations: Vec<String>,
        param_names: Vec<String>,
        var_names: Vec<String>,
        max_iterations: u32,
        seed: u32,
    ) -> Result<WasmReductionRunner, JsValue> {
        console_error_panic_hook::set_once();

        let model = build_model(&equations, &param_names, &var_names)
            .map_err(|e| to_js_error("Model setup failed", e))?;
        Ok(Self::from_model(&model, max_iterations, seed))
    }

    pub fn from_tangent_pair(
        p1: &str,
        p0: &str,
        param_names: Vec<String>,
        var_names: Vec<String>,
        max_iterations: u32,
        seed: u32,
    ) -> Result<WasmReductionRunner, JsValue> {
        console_error_panic_hook::set_once();

        let model = build_model_from_pair(p1, p0, &param_names, &var_names)
            .map_err(|e| to_js_error("Model setup failed", e))?;
        Ok(Self::from_model(&model, max_iterations, seed))
    }

    pub fn is_done(&self) -> bool {
        self.engine.as_ref().map_or(true, |engine| engine.is_done())
    }

    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let progress = self.advance(batch_size).map_err(|e| JsValue::from_str(&e))?;
        to_value(&progress).map_err(|e| to_js_error("Serialization error", e))
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        let progress = self.progress().map_err(|e| JsValue::from_str(&e))?;
        to_value(&progress).map_err(|e| to_js_error("Serialization error", e))
    }

    /// The iteration sequence so far; complete once the runner is terminal.
    pub fn get_result(&self) -> Result<JsValue, JsValue> {
        let engine = self.engine().map_err(|e| JsValue::from_str(&e))?;
        if !engine.is_terminal() {
            return Err(JsValue::from_str("Reduction has not reached a terminal iteration."));
        }
        to_value(engine.sequence()).map_err(|e| to_js_error("Serialization error", e))
    }
}
