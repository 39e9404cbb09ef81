//! Sandboxed display formulas
//!
//! Each variable may carry a formula mapping the raw history value to the
//! displayed value. Formulas are Rhai *expressions* over a single free
//! variable `x`, compiled once per variable and evaluated per sample.
//!
//! ## Examples
//!
//! ```rhai
//! x * 1000
//! ```
//!
//! ```rhai
//! (x - 32.0) / 1.8
//! ```
//!
//! ```rhai
//! sqrt(x) * 0.5
//! ```
//!
//! Statements, function definitions and `eval` are rejected at compile time,
//! and evaluation is bounded by an operation limit.

mod engine;

pub use engine::{FormulaEngine, VariableTransforms};

use crate::error::{HistScopeError, Result};
use rhai::{Engine, AST};
use std::collections::HashMap;

/// A compiled formula that can be evaluated repeatedly
#[derive(Clone)]
pub struct CompiledFormula {
    /// The compiled AST
    ast: AST,
    /// Formula source text
    source: String,
    /// Label of the variable this formula belongs to
    name: String,
}

impl CompiledFormula {
    /// Get the source code of this formula
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get the variable label
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

impl std::fmt::Debug for CompiledFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFormula")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// Cache of compiled formulas keyed by source
#[derive(Default)]
pub struct FormulaCache {
    cache: HashMap<String, CompiledFormula>,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Get a cached formula or compile and cache it
    pub fn get_or_compile(
        &mut self,
        engine: &Engine,
        name: &str,
        source: &str,
    ) -> Result<CompiledFormula> {
        if let Some(formula) = self.cache.get(source) {
            return Ok(CompiledFormula {
                name: name.to_string(),
                ..formula.clone()
            });
        }

        let ast = engine
            .compile_expression(source)
            .map_err(|e| HistScopeError::from_parse_error(name, e))?;

        let formula = CompiledFormula {
            ast,
            source: source.to_string(),
            name: name.to_string(),
        };

        self.cache.insert(source.to_string(), formula.clone());
        Ok(formula)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_reuses_compiled_source() {
        let engine = Engine::new();
        let mut cache = FormulaCache::new();

        let a = cache.get_or_compile(&engine, "a", "x * 2").unwrap();
        let b = cache.get_or_compile(&engine, "b", "x * 2").unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(a.source(), b.source());
        assert_eq!(b.name(), "b");

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_rejects_statements() {
        let engine = Engine::new();
        let mut cache = FormulaCache::new();
        let err = cache
            .get_or_compile(&engine, "rate", "let y = x; y")
            .unwrap_err();
        assert!(err.to_string().contains("rate"));
        assert!(cache.is_empty());
    }
}
