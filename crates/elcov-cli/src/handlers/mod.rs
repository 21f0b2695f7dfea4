//! Command handlers - extracted from main.rs for testability

pub mod instrument;
pub mod report;

pub use instrument::execute_instrument;
pub use report::{execute_report, resolve_options};
