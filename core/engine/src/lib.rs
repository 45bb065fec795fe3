//! FILENAME: core/engine/src/lib.rs
//! PURPOSE: Shared value types for the rollup workspace.
//! CONTEXT: Re-exports the value model used by row records and aggregated results.

pub mod cell;

// Re-export commonly used types at the crate root
pub use cell::{CellError, CellValue, RowRecord};
