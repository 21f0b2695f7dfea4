//! Push path: renderers report their own coverage over IPC

use super::host::{BrowserWindow, WebContents};
use super::window::CoverageWindow;
use super::{decode_coverage, pid_string, HookOptions};
use crate::coverage::{CoverageMap, SnapshotStore};
use crate::result::ElcovResult;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Channel used by instrumented pages on unload: `(coverage, pid)`
pub const SAVE_COVERAGE_CHANNEL: &str = "save-coverage";

/// Channel used by extensions: `{coverage, pid}`
pub const REPORT_COVERAGE_CHANNEL: &str = "report-coverage";

/// Installed into every new renderer; sends its coverage when the page unloads
pub const UNLOAD_HOOK_SCRIPT: &str = r#"
window.addEventListener('beforeunload', function () {
  if (typeof require !== 'undefined') {
    require('electron').ipcRenderer.send('save-coverage', window.__coverage__, window.process && window.process.pid)
  }
})
"#;

/// A coverage message received from a renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcMessage {
    /// Page unload report
    SaveCoverage {
        /// Page coverage, absent when the page was not instrumented
        coverage: Option<CoverageMap>,
        /// Renderer process id, when known
        pid: Option<String>,
    },
    /// Extension report
    ReportCoverage {
        /// Extension coverage
        coverage: Option<CoverageMap>,
        /// Extension process id, when known
        pid: Option<String>,
    },
}

impl IpcMessage {
    /// Decode the arguments of a message on `channel`.
    ///
    /// Returns `None` for channels that carry no coverage.
    #[must_use]
    pub fn from_channel(channel: &str, args: &[Value]) -> Option<Self> {
        match channel {
            SAVE_COVERAGE_CHANNEL => Some(Self::SaveCoverage {
                coverage: decode_coverage(args.first()),
                pid: pid_string(args.get(1)),
            }),
            REPORT_COVERAGE_CHANNEL => {
                let message = args.first();
                Some(Self::ReportCoverage {
                    coverage: decode_coverage(message.and_then(|m| m.get("coverage"))),
                    pid: pid_string(message.and_then(|m| m.get("pid"))),
                })
            }
            _ => None,
        }
    }
}

/// An IPC message together with the renderer that sent it
#[derive(Clone)]
pub struct IpcEvent {
    /// Sending renderer
    pub sender: Arc<dyn WebContents>,
    /// Decoded message
    pub message: IpcMessage,
}

impl IpcEvent {
    /// Pair a message with its sender
    #[must_use]
    pub fn new(sender: Arc<dyn WebContents>, message: IpcMessage) -> Self {
        Self { sender, message }
    }
}

impl fmt::Debug for IpcEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcEvent")
            .field("sender", &self.sender.id())
            .field("message", &self.message)
            .finish()
    }
}

/// Persists renderer coverage into a [`SnapshotStore`] for the app lifetime
#[derive(Debug, Clone)]
pub struct CoverageHooks {
    store: SnapshotStore,
    options: HookOptions,
}

impl CoverageHooks {
    /// Create hooks writing into `store`
    #[must_use]
    pub fn new(store: SnapshotStore, options: HookOptions) -> Self {
        Self { store, options }
    }

    /// Destination store
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Wrap a newly created window so closing it saves its coverage
    #[must_use]
    pub fn wrap_window<W: BrowserWindow>(&self, window: W) -> CoverageWindow<W> {
        CoverageWindow::new(window, self.store.clone(), &self.options)
    }

    /// Persist the payload of one IPC event
    pub fn handle_event(&self, event: &IpcEvent) -> ElcovResult<Option<PathBuf>> {
        let worker = event.sender.worker();
        match &event.message {
            IpcMessage::SaveCoverage { coverage, pid } => {
                self.store.save(&worker, coverage.as_ref(), pid.as_deref())
            }
            IpcMessage::ReportCoverage { coverage, pid } => {
                let pid = format!("{}-extension", pid.as_deref().unwrap_or(&worker.id));
                self.store.save(&worker, coverage.as_ref(), Some(&pid))
            }
        }
    }

    /// Consume IPC events until the channel closes.
    ///
    /// The task resolves to the number of snapshots written.
    pub fn listen(&self, mut events: mpsc::Receiver<IpcEvent>) -> JoinHandle<usize> {
        let hooks = self.clone();
        tokio::spawn(async move {
            let mut saved = 0;
            while let Some(event) = events.recv().await {
                match hooks.handle_event(&event) {
                    Ok(Some(path)) => {
                        tracing::debug!(path = %path.display(), "saved pushed coverage");
                        saved += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(sender = %event.sender.id(), error = %e, "failed to save pushed coverage");
                    }
                }
            }
            tracing::debug!(saved, "coverage listener stopped");
            saved
        })
    }

    /// Install the unload hook into a newly created renderer.
    ///
    /// Injection failures are logged; the renderer keeps running.
    pub async fn on_web_contents_created(&self, contents: &dyn WebContents) {
        if let Err(e) = contents.execute_javascript(UNLOAD_HOOK_SCRIPT).await {
            tracing::warn!(contents = %contents.id(), error = %e, "failed to install unload hook");
        }
    }
}
