//! FILENAME: core/rollup-engine/src/logging.rs
// PURPOSE: Category-tagged logging macros for the rollup engine.
// CONTEXT: Lines go through the `log` facade with the category as the target,
// so the host application decides where they end up. The engine never installs
// a logger itself.

/// Category used for everything the aggregation stage reports.
pub const AGG: &str = "AGG";

#[macro_export]
macro_rules! log_debug {
    ($cat:expr, $($arg:tt)*) => {
        ::log::debug!(target: $cat, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($cat:expr, $($arg:tt)*) => {
        ::log::warn!(target: $cat, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($cat:expr, $($arg:tt)*) => {
        ::log::error!(target: $cat, $($arg)*)
    };
}
