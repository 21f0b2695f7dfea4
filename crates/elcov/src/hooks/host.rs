//! Host runtime abstraction
//!
//! The embedding application implements these for its renderer handles.

use crate::coverage::WorkerInfo;
use crate::result::ElcovResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A renderer process able to evaluate script
#[async_trait]
pub trait WebContents: Send + Sync {
    /// Host-assigned identifier
    fn id(&self) -> String;

    /// Process kind (`window`, `webview`, `backgroundPage`, ...)
    fn kind(&self) -> String;

    /// Evaluate `script` in the page and return its completion value
    async fn execute_javascript(&self, script: &str) -> ElcovResult<Value>;

    /// Identity used for snapshot file names
    fn worker(&self) -> WorkerInfo {
        WorkerInfo::new(self.id(), self.kind())
    }
}

/// A top-level window whose close can be intercepted
#[async_trait]
pub trait BrowserWindow: Send + Sync {
    /// Whether the window is already gone
    fn is_destroyed(&self) -> bool;

    /// Loaded URL, empty when nothing was loaded
    fn url(&self) -> String;

    /// Contents of the attached devtools, when open
    fn devtools_web_contents(&self) -> Option<Arc<dyn WebContents>>;

    /// Close the window
    async fn close(&self) -> ElcovResult<()>;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::result::ElcovError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted renderer: answers every script with `response`
    #[derive(Debug, Default)]
    pub struct MockContents {
        pub id: String,
        pub kind: String,
        pub response: Value,
        pub delay: Option<Duration>,
        pub fail: bool,
        pub scripts: Mutex<Vec<String>>,
    }

    impl MockContents {
        pub fn new(id: &str, kind: &str, response: Value) -> Self {
            Self {
                id: id.to_string(),
                kind: kind.to_string(),
                response,
                ..Self::default()
            }
        }

        pub fn query_count(&self) -> usize {
            self.scripts.lock().map(|s| s.len()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl WebContents for MockContents {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn kind(&self) -> String {
            self.kind.clone()
        }

        async fn execute_javascript(&self, script: &str) -> ElcovResult<Value> {
            if let Ok(mut scripts) = self.scripts.lock() {
                scripts.push(script.to_string());
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ElcovError::host("renderer crashed"));
            }
            Ok(self.response.clone())
        }
    }

    #[derive(Debug, Default)]
    pub struct MockWindow {
        pub destroyed: AtomicBool,
        pub url: String,
        pub devtools: Option<Arc<MockContents>>,
        pub closes: AtomicUsize,
    }

    impl MockWindow {
        pub fn new(url: &str, devtools: Option<Arc<MockContents>>) -> Self {
            Self {
                url: url.to_string(),
                devtools,
                ..Self::default()
            }
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BrowserWindow for MockWindow {
        fn is_destroyed(&self) -> bool {
            self.destroyed.load(Ordering::SeqCst)
        }

        fn url(&self) -> String {
            self.url.clone()
        }

        fn devtools_web_contents(&self) -> Option<Arc<dyn WebContents>> {
            self.devtools
                .clone()
                .map(|contents| contents as Arc<dyn WebContents>)
        }

        async fn close(&self) -> ElcovResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.destroyed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
