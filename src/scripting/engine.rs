//! Formula evaluation
//!
//! [`FormulaEngine`] wraps a restricted Rhai engine. [`VariableTransforms`]
//! holds one compiled transform per chart variable and applies it to
//! decoded samples and bins.

use crate::error::Result;
use crate::scripting::{CompiledFormula, FormulaCache};
use crate::types::{Bin, Sample, Variable};
use rhai::{Dynamic, Engine, Scope};

/// Upper bound on Rhai operations per evaluation
const MAX_OPERATIONS: u64 = 10_000;

/// Restricted Rhai engine for display formulas
pub struct FormulaEngine {
    engine: Engine,
    cache: FormulaCache,
}

impl FormulaEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_expr_depths(64, 32);
        engine.set_max_call_levels(8);
        engine.disable_symbol("eval");
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});

        Self {
            engine,
            cache: FormulaCache::new(),
        }
    }

    /// Compile `source` for the variable labelled `name`
    pub fn compile(&mut self, name: &str, source: &str) -> Result<CompiledFormula> {
        self.cache.get_or_compile(&self.engine, name, source)
    }

    /// Evaluate a formula with `x` bound to `value`
    pub fn evaluate(
        &self,
        formula: &CompiledFormula,
        value: f64,
    ) -> std::result::Result<f64, String> {
        let mut scope = Scope::new();
        scope.push("x", value);

        let result: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, formula.ast())
            .map_err(|e| e.to_string())?;

        if let Ok(v) = result.as_float() {
            Ok(v)
        } else if let Ok(v) = result.as_int() {
            Ok(v as f64)
        } else if let Ok(v) = result.as_bool() {
            Ok(if v { 1.0 } else { 0.0 })
        } else {
            Err(format!("formula returned {}", result.type_name()))
        }
    }
}

impl Default for FormulaEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// One transform per chart variable
pub struct VariableTransforms {
    engine: FormulaEngine,
    formulas: Vec<Option<CompiledFormula>>,
    warned: Vec<bool>,
}

impl VariableTransforms {
    /// Compile every variable's formula. A formula that fails to compile
    /// is an error for the whole chart.
    pub fn compile(variables: &[Variable]) -> Result<Self> {
        let mut engine = FormulaEngine::new();
        let formulas = variables
            .iter()
            .map(|v| {
                v.formula
                    .as_deref()
                    .map(|src| engine.compile(&v.label, src))
                    .transpose()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            engine,
            warned: vec![false; formulas.len()],
            formulas,
        })
    }

    pub fn is_identity(&self, index: usize) -> bool {
        !matches!(self.formulas.get(index), Some(Some(_)))
    }

    /// Displayed value for one raw value; NaN when evaluation fails
    pub fn apply(&mut self, index: usize, raw: f64) -> f64 {
        let Some(Some(formula)) = self.formulas.get(index) else {
            return raw;
        };

        match self.engine.evaluate(formula, raw) {
            Ok(v) => v,
            Err(e) => {
                if !self.warned[index] {
                    tracing::warn!(
                        "Formula '{}' for {} failed: {}",
                        formula.source(),
                        formula.name(),
                        e
                    );
                    self.warned[index] = true;
                }
                f64::NAN
            }
        }
    }

    /// Build displayed samples from raw `(time, value)` pairs
    pub fn samples(&mut self, index: usize, raw: &[(f64, f64)]) -> Vec<Sample> {
        raw.iter()
            .map(|&(time, raw_value)| Sample {
                time,
                value: self.apply(index, raw_value),
                raw_value,
            })
            .collect()
    }

    /// Apply the transform to bin statistics. Raw statistics are kept and
    /// min/max are swapped when the formula is decreasing.
    pub fn bin(&mut self, index: usize, mut bin: Bin) -> Bin {
        if self.is_identity(index) {
            return bin;
        }
        bin.first = self.apply(index, bin.raw_first);
        bin.last = self.apply(index, bin.raw_last);
        let a = self.apply(index, bin.raw_min);
        let b = self.apply(index, bin.raw_max);
        if a <= b {
            bin.min = a;
            bin.max = b;
        } else {
            bin.min = b;
            bin.max = a;
        }
        bin
    }
}
