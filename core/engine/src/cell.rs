//! FILENAME: core/engine/src/cell.rs
//! PURPOSE: Defines the value model shared by row records and aggregated results.
//! CONTEXT: This file contains the `CellValue` enum and the `RowRecord` backing
//! record of a raw data row. `CellValue::Empty` doubles as the "no value" marker
//! produced by aggregate functions that have nothing to reduce.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Represents the possible errors a value can hold (e.g., #DIV/0!)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellError {
    Div0,       // Division by zero
    Ref,        // Invalid reference
    Name,       // Unknown function name
    Value,      // Wrong type of argument
    NA,         // Value not available
}

/// A raw or aggregated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl CellValue {
    /// Returns the numeric payload, or None for every non-numeric variant.
    /// Numeric-looking text is NOT numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, CellValue::Number(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Empty, Into::into)
    }
}

/// The backing record of a raw data row, keyed by column id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    values: HashMap<String, CellValue>,
}

impl RowRecord {
    pub fn new() -> Self {
        RowRecord {
            values: HashMap::new(),
        }
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with(mut self, column_id: &str, value: impl Into<CellValue>) -> Self {
        self.set(column_id, value);
        self
    }

    pub fn set(&mut self, column_id: &str, value: impl Into<CellValue>) {
        self.values.insert(column_id.to_string(), value.into());
    }

    /// Returns the value for a column, or None when the record has no such column.
    pub fn get(&self, column_id: &str) -> Option<&CellValue> {
        self.values.get(column_id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for RowRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RowRecord {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
