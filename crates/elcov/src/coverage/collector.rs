//! Coverage Collector
//!
//! Owns the merged coverage of one run: the live in-process map, zero
//! baselines for library files that never loaded, and every durable
//! snapshot written by renderer processes.

use super::formatters::{ReportFormat, ReportWriter, Reporter};
use super::{CoverageMap, SnapshotStore};
use crate::instrument::{absolute_path, discover_js_files, Instrument, StatementInstrumenter};
use crate::result::{ElcovError, ElcovResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "host")]
use crate::hooks::{CoverageHooks, HookOptions};

/// Name of the snapshot directory under the output path
const DATA_DIR: &str = "data";

/// Collector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoverageOptions {
    /// Report directory (snapshots go to `<output_path>/data`)
    pub output_path: PathBuf,
    /// Root scanned for never-loaded `.js` files
    pub lib_path: PathBuf,
    /// Report format identifiers
    pub formats: Vec<String>,
}

impl CoverageOptions {
    /// Create a builder for collector options
    #[must_use]
    pub fn builder() -> CoverageOptionsBuilder {
        CoverageOptionsBuilder::default()
    }

    /// Load options from a JSON file such as `{"outputPath": "coverage"}`
    pub fn from_json_file(path: &Path) -> ElcovResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| ElcovError::path_io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Default for CoverageOptions {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("."),
            lib_path: PathBuf::from("."),
            formats: vec!["lcov".to_string(), "json".to_string()],
        }
    }
}

/// Builder for [`CoverageOptions`]
#[derive(Debug, Default)]
pub struct CoverageOptionsBuilder {
    options: CoverageOptions,
}

impl CoverageOptionsBuilder {
    /// Set the report directory
    #[must_use]
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.output_path = path.into();
        self
    }

    /// Set the library root used for backfill
    #[must_use]
    pub fn lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.lib_path = path.into();
        self
    }

    /// Replace the report formats
    #[must_use]
    pub fn formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.formats = formats.into_iter().map(Into::into).collect();
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> CoverageOptions {
        self.options
    }
}

/// Aggregates coverage from every process of one application run
///
/// A collector built without a live coverage map is disabled: `setup` and
/// `generate_report` then touch neither the filesystem nor the writer.
pub struct Coverage {
    output_path: PathBuf,
    lib_path: PathBuf,
    formats: Vec<ReportFormat>,
    store: SnapshotStore,
    live: Option<CoverageMap>,
    aggregate: CoverageMap,
    report: CoverageMap,
    instrumenter: Arc<dyn Instrument>,
    writer: Box<dyn ReportWriter>,
}

impl fmt::Debug for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coverage")
            .field("output_path", &self.output_path)
            .field("lib_path", &self.lib_path)
            .field("formats", &self.formats)
            .field("enabled", &self.is_enabled())
            .field("files", &self.aggregate.len())
            .finish_non_exhaustive()
    }
}

impl Coverage {
    /// Create a collector.
    ///
    /// `live` is the coverage map of the coordinating process itself; pass
    /// `None` when the application was not instrumented.
    pub fn new(options: CoverageOptions, live: Option<CoverageMap>) -> ElcovResult<Self> {
        let output_path = absolute_path(&options.output_path)?;
        let lib_path = absolute_path(&options.lib_path)?;
        let reporter = Reporter::from_ids(&options.formats)?;
        let store = SnapshotStore::new(output_path.join(DATA_DIR));

        Ok(Self {
            formats: reporter.formats().to_vec(),
            writer: Box::new(reporter),
            instrumenter: Arc::new(StatementInstrumenter::new()),
            output_path,
            lib_path,
            store,
            live,
            aggregate: CoverageMap::new(),
            report: CoverageMap::new(),
        })
    }

    /// Replace the report writer
    #[must_use]
    pub fn with_report_writer(mut self, writer: impl ReportWriter + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    /// Replace the instrumenter used for backfill
    #[must_use]
    pub fn with_instrumenter(mut self, instrumenter: impl Instrument + 'static) -> Self {
        self.instrumenter = Arc::new(instrumenter);
        self
    }

    /// Whether a live coverage map was supplied
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.live.is_some()
    }

    /// Resolved report directory
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Resolved library root
    #[must_use]
    pub fn lib_path(&self) -> &Path {
        &self.lib_path
    }

    /// Snapshot directory (`<output_path>/data`)
    #[must_use]
    pub fn data_path(&self) -> &Path {
        self.store.dir()
    }

    /// Configured report formats
    #[must_use]
    pub fn formats(&self) -> &[ReportFormat] {
        &self.formats
    }

    /// Snapshot store shared with the lifecycle hooks
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Start a fresh run by discarding snapshots left by a previous one.
    ///
    /// Returns `false` when the collector is disabled.
    pub fn setup(&self) -> ElcovResult<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }
        self.store.clear()?;
        tracing::info!(data = %self.store.dir().display(), "coverage collection armed");
        Ok(true)
    }

    /// Lifecycle hooks persisting into this collector's store
    #[cfg(feature = "host")]
    #[must_use]
    pub fn hooks(&self, options: HookOptions) -> Option<CoverageHooks> {
        self.is_enabled()
            .then(|| CoverageHooks::new(self.store.clone(), options))
    }

    /// Merge a raw coverage map into the aggregate
    pub fn add_coverage(&mut self, raw: Option<&CoverageMap>) {
        if let Some(raw) = raw {
            self.aggregate.merge(raw);
        }
    }

    /// Insert zero-count states for library files absent from the live map.
    ///
    /// Returns the number of files added.
    pub fn add_unrequired_files(&mut self) -> ElcovResult<usize> {
        let Some(live) = self.live.as_mut() else {
            return Ok(0);
        };
        if !self.lib_path.is_dir() {
            tracing::debug!(lib = %self.lib_path.display(), "library root missing, nothing to backfill");
            return Ok(0);
        }

        let mut added = 0;
        for relative in discover_js_files(&self.lib_path)? {
            let path = self.lib_path.join(&relative);
            let key = path.to_string_lossy().into_owned();
            if live.contains(&key) {
                continue;
            }
            let source = fs::read_to_string(&path).map_err(|e| ElcovError::path_io(&path, e))?;
            let mut state = self.instrumenter.instrument(&source, &path)?.state;
            state.reset_counts();
            live.insert(key, state);
            added += 1;
        }

        tracing::debug!(added, "backfilled unexecuted files");
        Ok(added)
    }

    /// Merge every durable snapshot into the aggregate.
    ///
    /// Unreadable snapshots are skipped with a warning. Returns the number of
    /// snapshots merged.
    pub fn add_browser_window_data(&mut self) -> ElcovResult<usize> {
        merge_snapshots(&self.store, &mut self.aggregate)
    }

    /// Merge everything and write the reports.
    ///
    /// Each call starts from the coverage added through [`Self::add_coverage`]
    /// and re-reads the live map and snapshots, so repeated calls report the
    /// same counts. Returns `None` when disabled, otherwise the merged map.
    pub fn generate_report(&mut self) -> ElcovResult<Option<&CoverageMap>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let backfilled = self.add_unrequired_files()?;
        let mut merged = self.aggregate.clone();
        if let Some(live) = &self.live {
            merged.merge(live);
        }
        let snapshots = merge_snapshots(&self.store, &mut merged)?;
        let written = self.writer.write(&merged, &self.output_path)?;

        let summary = merged.summary();
        tracing::info!(
            files = merged.len(),
            backfilled,
            snapshots,
            reports = written.len(),
            statements = format!("{:.2}%", summary.statements.pct()),
            "generated coverage report"
        );
        self.report = merged;
        Ok(Some(&self.report))
    }

    /// The live in-process map, for counters updated by the host
    #[must_use]
    pub fn live_coverage_mut(&mut self) -> Option<&mut CoverageMap> {
        self.live.as_mut()
    }

    /// Coverage merged through `add_coverage` and `add_browser_window_data`
    #[must_use]
    pub fn aggregate(&self) -> &CoverageMap {
        &self.aggregate
    }
}

fn merge_snapshots(store: &SnapshotStore, into: &mut CoverageMap) -> ElcovResult<usize> {
    let mut merged = 0;
    for path in store.snapshot_paths()? {
        match SnapshotStore::read(&path) {
            Ok(snapshot) => {
                into.merge(&snapshot);
                merged += 1;
                tracing::debug!(path = %path.display(), files = snapshot.len(), "merged snapshot");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable snapshot");
            }
        }
    }
    Ok(merged)
}
