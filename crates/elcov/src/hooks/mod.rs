//! Process Lifecycle Hooks
//!
//! Gets renderer coverage out of processes before they disappear, through
//! two independent paths that both land in the [`SnapshotStore`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  pull: CoverageWindow::close ── query devtools ──→ save ──→ close │
//! │  push: beforeunload ── IPC ──→ mpsc ──→ CoverageHooks::listen     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures on either path are logged and swallowed; a window always closes.
//!
//! [`SnapshotStore`]: crate::coverage::SnapshotStore

mod host;
mod ipc;
mod window;

pub use host::{BrowserWindow, WebContents};
pub use ipc::{
    CoverageHooks, IpcEvent, IpcMessage, REPORT_COVERAGE_CHANNEL, SAVE_COVERAGE_CHANNEL,
    UNLOAD_HOOK_SCRIPT,
};
pub use window::{CoverageWindow, COVERAGE_QUERY_SCRIPT};

use crate::coverage::CoverageMap;
use serde_json::Value;
use std::time::Duration;

/// Default limit for the close-time coverage query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Hook configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookOptions {
    /// How long `close` waits for a window's coverage; `None` waits forever
    pub query_timeout: Option<Duration>,
}

impl HookOptions {
    /// Set the close-time query timeout
    #[must_use]
    pub const fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }
}

impl Default for HookOptions {
    fn default() -> Self {
        Self {
            query_timeout: Some(DEFAULT_QUERY_TIMEOUT),
        }
    }
}

/// Decode a coverage payload sent by a renderer.
///
/// `null`/`undefined` means the page was not instrumented. Anything that is
/// not a coverage map is logged and dropped.
pub(crate) fn decode_coverage(value: Option<&Value>) -> Option<CoverageMap> {
    let value = value.filter(|v| !v.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(map) => Some(map),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring undecodable coverage payload");
            None
        }
    }
}

/// Render a renderer-reported pid as a file name component
pub(crate) fn pid_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
