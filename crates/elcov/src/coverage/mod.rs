//! Multi-Process Coverage Aggregation
//!
//! Collects partial coverage snapshots from any number of renderer
//! processes, merges them with zero baselines for files that never ran, and
//! writes one unified report at the end of a run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  renderer close ──┐                                             │
//! │  IPC push ────────┼──→ SnapshotStore (<pid>-<kind>-<ts>.json)   │
//! │                   │                 ↓                           │
//! │  live map ────────┴──→ Coverage::generate_report ──→ Reporter   │
//! │  lib_path/**/*.js ───→ zero backfill ↗                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod collector;
pub mod formatters;
mod map;
mod store;

pub use collector::{Coverage, CoverageOptions, CoverageOptionsBuilder};
pub use formatters::{ReportFormat, ReportWriter, Reporter};
pub use map::{
    BranchMeta, CoverageMap, CoverageSummary, FileCoverage, FunctionMeta, Position, Range, Totals,
};
pub use store::{ProcessReport, SnapshotStore, WorkerInfo};
