//! Unimodularity check of a Lie–Bäcklund map.

use crate::system::to_js_error;
use anyhow::Context;
use flatness_core::context::DifferentiationContext;
use flatness_core::equation_engine::parse_expression;
use flatness_core::matrix::SymbolicMatrix;
use flatness_core::probe::ProbeSettings;
use flatness_core::unimodular::{
    lie_baecklund_jacobian, UnimodularCertificate, UnimodularSettings, UnimodularityChecker,
};
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

pub(crate) fn check_map(
    components: &[String],
    param_names: &[String],
    var_names: &[String],
    order: u32,
    ansatz_degree: u32,
    seed: u32,
) -> anyhow::Result<Option<UnimodularCertificate>> {
    let context = DifferentiationContext::new(var_names, param_names)
        .context("Invalid variable or parameter declaration.")?;
    let rows = components
        .iter()
        .enumerate()
        .map(|(idx, expr)| {
            parse_expression(expr, &context)
                .with_context(|| format!("Failed to parse component {}.", idx + 1))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let jacobian = lie_baecklund_jacobian(&SymbolicMatrix::column_vector(rows), &context, order)
        .context("Failed to differentiate the map.")?;

    let settings = UnimodularSettings {
        ansatz_degree: ansatz_degree as usize,
        probe: ProbeSettings {
            seed: (seed != 0).then_some(u64::from(seed)),
            ..ProbeSettings::default()
        },
    };
    UnimodularityChecker::new(context, settings)
        .check(&jacobian)
        .context("Unimodularity check failed.")
}

/// Returns the certificate `{ inverse, jacobian }`, or `null` when no inverse
/// up to `ansatz_degree` was found.
#[wasm_bindgen]
pub fn check_unimodular(
    components: Vec<String>,
    param_names: Vec<String>,
    var_names: Vec<String>,
    order: u32,
    ansatz_degree: u32,
    seed: u32,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let certificate = check_map(&components, &param_names, &var_names, order, ansatz_degree, seed)
        .map_err(|e| to_js_error("Unimodularity check failed", e))?;
    to_value(&certificate).map_err(|e| to_js_error("Serialization error", e))
}
