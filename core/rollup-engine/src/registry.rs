//! FILENAME: core/rollup-engine/src/registry.rs
//! Aggregate Function Registry - name -> reducer table.
//!
//! Each engine instance owns its own registry, pre-loaded with the built-ins.
//! Custom names are added through `register`; nothing is global.
//!
//! Numeric handling:
//! - `sum`, `min`, `max`, `avg` only look at `CellValue::Number` elements and
//!   yield `Empty` when there are none.
//! - `first`, `last` are positional and pass any value through unchanged.
//! - `count` counts non-empty elements.

use engine::CellValue;
use rustc_hash::FxHashMap;

use crate::definition::{AggFn, AggFuncRef};
use crate::error::RollupError;

/// Folds the numeric elements, seeding with the first one.
/// Yields `Empty` if no element is numeric.
fn fold_numbers(values: &[CellValue], combine: impl Fn(f64, f64) -> f64) -> CellValue {
    let mut result: Option<f64> = None;
    for n in values.iter().filter_map(CellValue::as_number) {
        result = Some(match result {
            None => n,
            Some(acc) => combine(acc, n),
        });
    }
    result.map_or(CellValue::Empty, CellValue::Number)
}

pub fn agg_sum(values: &[CellValue]) -> CellValue {
    fold_numbers(values, |acc, n| acc + n)
}

pub fn agg_min(values: &[CellValue]) -> CellValue {
    fold_numbers(values, |acc, n| if n < acc { n } else { acc })
}

pub fn agg_max(values: &[CellValue]) -> CellValue {
    fold_numbers(values, |acc, n| if n > acc { n } else { acc })
}

pub fn agg_first(values: &[CellValue]) -> CellValue {
    values.first().cloned().unwrap_or(CellValue::Empty)
}

pub fn agg_last(values: &[CellValue]) -> CellValue {
    values.last().cloned().unwrap_or(CellValue::Empty)
}

pub fn agg_count(values: &[CellValue]) -> CellValue {
    CellValue::Number(values.iter().filter(|v| !v.is_empty()).count() as f64)
}

pub fn agg_avg(values: &[CellValue]) -> CellValue {
    let (sum, count) = values
        .iter()
        .filter_map(CellValue::as_number)
        .fold((0.0, 0u64), |(sum, count), n| (sum + n, count + 1));
    if count == 0 {
        CellValue::Empty
    } else {
        CellValue::Number(sum / count as f64)
    }
}

/// Name -> aggregate function table.
#[derive(Debug, Clone)]
pub struct AggFunctionRegistry {
    functions: FxHashMap<String, AggFn>,
}

impl AggFunctionRegistry {
    /// Creates a registry holding the built-in functions.
    pub fn new() -> Self {
        let mut registry = AggFunctionRegistry::empty();
        registry.register("sum", AggFn::new(agg_sum));
        registry.register("min", AggFn::new(agg_min));
        registry.register("max", AggFn::new(agg_max));
        registry.register("first", AggFn::new(agg_first));
        registry.register("last", AggFn::new(agg_last));
        registry.register("count", AggFn::new(agg_count));
        registry.register("avg", AggFn::new(agg_avg));
        registry
    }

    /// Creates a registry with no functions at all.
    pub fn empty() -> Self {
        AggFunctionRegistry {
            functions: FxHashMap::default(),
        }
    }

    /// Adds or replaces a named function.
    pub fn register(&mut self, name: &str, function: AggFn) {
        self.functions.insert(name.to_string(), function);
    }

    /// Builder-style `register`.
    pub fn with(mut self, name: &str, function: AggFn) -> Self {
        self.register(name, function);
        self
    }

    /// Resolves a column's function reference to something callable.
    pub fn resolve(&self, agg_func: &AggFuncRef) -> Result<AggFn, RollupError> {
        match agg_func {
            AggFuncRef::Custom(function) => Ok(function.clone()),
            AggFuncRef::Named(name) => self
                .functions
                .get(name)
                .cloned()
                .ok_or_else(|| RollupError::UnknownAggregateFunction(name.clone())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for AggFunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
