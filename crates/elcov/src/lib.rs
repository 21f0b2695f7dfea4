//! elcov: Coverage for Multi-Process Electron Apps
//!
//! Instruments an application's JavaScript sources, packages them into an
//! asar archive, and merges the coverage reported by every process of a run
//! into one istanbul-compatible report.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ lib/**/*.js│───►│ Instrument │───►│ app.asar   │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! │                                              │ run              │
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Reports    │◄───│ Coverage   │◄───│ hooks      │            │
//! │   │ lcov/json  │    │ collector  │    │ pull/push  │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

/// asar archive writer and reader
pub mod archive;

/// Coverage data model, snapshot store, collector and report formats
pub mod coverage;

pub(crate) mod digest;

/// Source tree instrumentation
pub mod instrument;

/// Window and IPC hooks that get coverage out of renderer processes
#[cfg(feature = "host")]
pub mod hooks;

mod result;

pub use archive::{package_directory, AsarArchive};
pub use coverage::{
    Coverage, CoverageMap, CoverageOptions, FileCoverage, ReportFormat, ReportWriter, Reporter,
    SnapshotStore, WorkerInfo,
};
#[cfg(feature = "host")]
pub use hooks::{
    BrowserWindow, CoverageHooks, CoverageWindow, HookOptions, IpcEvent, IpcMessage, WebContents,
};
pub use instrument::{
    instrument_to_archive, instrument_tree, Instrument, Instrumented, InstrumentedTree,
    StatementInstrumenter,
};
pub use result::{ElcovError, ElcovResult};
