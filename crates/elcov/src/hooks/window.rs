//! Pull path: harvest a window's coverage as it closes

use super::host::{BrowserWindow, WebContents};
use super::{decode_coverage, pid_string, HookOptions};
use crate::coverage::{CoverageMap, SnapshotStore};
use crate::result::{ElcovError, ElcovResult};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Evaluates to `[coverage, pid]` in a renderer
pub const COVERAGE_QUERY_SCRIPT: &str =
    "[window.__coverage__, window.process && window.process.pid]";

/// Window decorator that saves coverage before closing
///
/// `close` on the wrapper always reaches the wrapped window, whatever happens
/// to the coverage query.
#[derive(Debug)]
pub struct CoverageWindow<W> {
    inner: W,
    store: SnapshotStore,
    query_timeout: Option<Duration>,
}

impl<W: BrowserWindow> CoverageWindow<W> {
    /// Wrap `inner`, persisting into `store`
    #[must_use]
    pub fn new(inner: W, store: SnapshotStore, options: &HookOptions) -> Self {
        Self {
            inner,
            store,
            query_timeout: options.query_timeout,
        }
    }

    /// The wrapped window
    #[must_use]
    pub fn inner(&self) -> &W {
        &self.inner
    }

    /// Unwrap the window
    #[must_use]
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Devtools contents worth querying, if any
    fn coverage_source(&self) -> Option<Arc<dyn WebContents>> {
        if self.inner.is_destroyed() || self.inner.url().is_empty() {
            return None;
        }
        self.inner.devtools_web_contents()
    }

    async fn save_coverage(&self, contents: &dyn WebContents) -> Option<PathBuf> {
        let (coverage, pid) = match self.query(contents).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(contents = %contents.id(), error = %e, "coverage query failed");
                return None;
            }
        };
        match self
            .store
            .save(&contents.worker(), coverage.as_ref(), pid.as_deref())
        {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(contents = %contents.id(), error = %e, "failed to save window coverage");
                None
            }
        }
    }

    async fn query(
        &self,
        contents: &dyn WebContents,
    ) -> ElcovResult<(Option<CoverageMap>, Option<String>)> {
        let pending = contents.execute_javascript(COVERAGE_QUERY_SCRIPT);
        let result = match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| ElcovError::host(format!("coverage query timed out after {limit:?}")))??,
            None => pending.await?,
        };

        match result {
            Value::Array(items) => Ok((
                decode_coverage(items.first()),
                pid_string(items.get(1)),
            )),
            Value::Null => Ok((None, None)),
            other => Err(ElcovError::host(format!(
                "unexpected coverage query result: {other}"
            ))),
        }
    }
}

#[async_trait]
impl<W: BrowserWindow> BrowserWindow for CoverageWindow<W> {
    fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    fn url(&self) -> String {
        self.inner.url()
    }

    fn devtools_web_contents(&self) -> Option<Arc<dyn WebContents>> {
        self.inner.devtools_web_contents()
    }

    async fn close(&self) -> ElcovResult<()> {
        if let Some(contents) = self.coverage_source() {
            if let Some(path) = self.save_coverage(contents.as_ref()).await {
                tracing::debug!(path = %path.display(), "saved coverage on close");
            }
        }
        self.inner.close().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::hooks::host::mock::{MockContents, MockWindow};
    use serde_json::json;

    fn coverage_payload() -> Value {
        json!({"/app/renderer.js": {"path": "/app/renderer.js", "s": {"1": 1}}})
    }

    fn devtools(response: Value) -> Arc<MockContents> {
        Arc::new(MockContents::new("3", "window", response))
    }

    fn wrap(window: MockWindow, store: &SnapshotStore) -> CoverageWindow<MockWindow> {
        CoverageWindow::new(window, store.clone(), &HookOptions::default())
    }

    fn snapshot_names(store: &SnapshotStore) -> Vec<String> {
        store
            .snapshot_paths()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_close_without_devtools_skips_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let window = wrap(MockWindow::new("file:///app/index.html", None), &store);

        window.close().await.unwrap();

        assert_eq!(window.inner().close_count(), 1);
        assert!(store.snapshot_paths().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_destroyed_or_blank_window_skips_query() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let contents = devtools(json!([coverage_payload(), 11]));
        let blank = wrap(MockWindow::new("", Some(contents.clone())), &store);
        blank.close().await.unwrap();

        let destroyed = MockWindow::new("file:///app/index.html", Some(contents.clone()));
        destroyed.destroyed.store(true, std::sync::atomic::Ordering::SeqCst);
        let destroyed = wrap(destroyed, &store);
        destroyed.close().await.unwrap();

        assert_eq!(contents.query_count(), 0);
        assert_eq!(blank.inner().close_count(), 1);
        assert_eq!(destroyed.inner().close_count(), 1);
    }

    #[tokio::test]
    async fn test_close_saves_coverage_with_reported_pid() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let contents = devtools(json!([coverage_payload(), 4242]));
        let window = wrap(
            MockWindow::new("file:///app/index.html", Some(contents.clone())),
            &store,
        );

        window.close().await.unwrap();

        assert_eq!(contents.query_count(), 1);
        assert_eq!(
            contents.scripts.lock().unwrap()[0],
            COVERAGE_QUERY_SCRIPT.to_string()
        );
        let names = snapshot_names(&store);
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("4242-window-"));
        assert_eq!(window.inner().close_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_pid_falls_back_to_contents_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let window = wrap(
            MockWindow::new(
                "file:///app/index.html",
                Some(devtools(json!([coverage_payload(), null]))),
            ),
            &store,
        );

        window.close().await.unwrap();
        assert!(snapshot_names(&store)[0].starts_with("3-window-"));
    }

    #[tokio::test]
    async fn test_uninstrumented_page_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let window = wrap(
            MockWindow::new("file:///app/index.html", Some(devtools(json!([null, 9])))),
            &store,
        );

        window.close().await.unwrap();
        assert!(store.snapshot_paths().unwrap().is_empty());
        assert_eq!(window.inner().close_count(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_still_closes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut contents = MockContents::new("3", "window", Value::Null);
        contents.fail = true;
        let window = wrap(
            MockWindow::new("file:///app/index.html", Some(Arc::new(contents))),
            &store,
        );

        window.close().await.unwrap();
        assert_eq!(window.inner().close_count(), 1);
        assert!(store.snapshot_paths().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_timeout_still_closes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut contents = MockContents::new("3", "window", json!([coverage_payload(), 1]));
        contents.delay = Some(Duration::from_secs(5));
        let options = HookOptions::default().with_query_timeout(Some(Duration::from_millis(20)));
        let window = CoverageWindow::new(
            MockWindow::new("file:///app/index.html", Some(Arc::new(contents))),
            store.clone(),
            &options,
        );

        window.close().await.unwrap();
        assert_eq!(window.inner().close_count(), 1);
        assert!(store.snapshot_paths().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_result_still_closes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let window = wrap(
            MockWindow::new("file:///app/index.html", Some(devtools(json!("oops")))),
            &store,
        );

        window.close().await.unwrap();
        assert_eq!(window.inner().close_count(), 1);
    }
}
