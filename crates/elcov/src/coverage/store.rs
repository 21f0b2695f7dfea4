//! Durable per-process coverage snapshots
//!
//! Every payload pulled from or pushed by a renderer process is written to
//! its own `<pid>-<kind>-<timestampMillis>.json` file the moment it arrives,
//! so a crash of the coordinating process loses nothing already reported.
//! Payloads are staged under a `.tmp` name and moved into place without
//! overwriting; the timestamp is bumped on collision. A crash mid-write
//! leaves only a staging file, which the `*.json` listing never picks up.

use super::CoverageMap;
use crate::result::{ElcovError, ElcovResult};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Identity of the process a snapshot came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Host-assigned identifier, used when the payload carries no pid
    pub id: String,
    /// Process kind (`window`, `webview`, `backgroundPage`, ...)
    pub kind: String,
}

impl WorkerInfo {
    /// Create a worker identity
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
        }
    }
}

/// A persisted coverage snapshot
#[derive(Debug, Clone)]
pub struct ProcessReport {
    /// Originating process id (may carry an `-extension` suffix)
    pub process_id: String,
    /// Originating process kind
    pub process_kind: String,
    /// Milliseconds since the Unix epoch at save time
    pub timestamp_ms: i64,
    /// File the snapshot was read from
    pub path: PathBuf,
    /// Snapshot contents
    pub coverage: CoverageMap,
}

impl ProcessReport {
    /// Split a snapshot file name into `(process_id, kind, timestamp)`
    pub fn parse_file_name(name: &str) -> ElcovResult<(String, String, i64)> {
        let invalid = || ElcovError::InvalidSnapshotName {
            name: name.to_string(),
        };
        let stem = name.strip_suffix(".json").ok_or_else(invalid)?;
        let (rest, timestamp) = stem.rsplit_once('-').ok_or_else(invalid)?;
        let timestamp = timestamp.parse::<i64>().map_err(|_| invalid())?;
        let (pid, kind) = rest.rsplit_once('-').ok_or_else(invalid)?;
        if pid.is_empty() || kind.is_empty() {
            return Err(invalid());
        }
        Ok((pid.to_string(), kind.to_string(), timestamp))
    }
}

/// Directory of durable snapshots shared by every writer in a run
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Create a store rooted at `dir` (created lazily on first save)
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Snapshot directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove all snapshots from a previous run
    pub fn clear(&self) -> ElcovResult<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                tracing::debug!(dir = %self.dir.display(), "cleared snapshot directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ElcovError::path_io(&self.dir, e)),
        }
    }

    /// Persist one coverage payload.
    ///
    /// Does nothing when `coverage` is `None`. The process id is `id` when
    /// given, the worker's own id otherwise. Returns the written file.
    pub fn save<C: Serialize + ?Sized>(
        &self,
        worker: &WorkerInfo,
        coverage: Option<&C>,
        id: Option<&str>,
    ) -> ElcovResult<Option<PathBuf>> {
        let Some(coverage) = coverage else {
            return Ok(None);
        };
        let pid = sanitize(id.unwrap_or(&worker.id));
        let kind = sanitize(&worker.kind);
        let json = serde_json::to_vec(coverage)?;

        fs::create_dir_all(&self.dir).map_err(|e| ElcovError::path_io(&self.dir, e))?;

        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{pid}-{kind}-"))
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| ElcovError::path_io(&self.dir, e))?;
        staged
            .write_all(&json)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|e| ElcovError::path_io(staged.path(), e))?;

        let mut timestamp = chrono::Utc::now().timestamp_millis();
        loop {
            let path = self.dir.join(format!("{pid}-{kind}-{timestamp}.json"));
            match staged.persist_noclobber(&path) {
                Ok(_) => {
                    tracing::debug!(path = %path.display(), bytes = json.len(), "saved coverage snapshot");
                    return Ok(Some(path));
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    staged = e.file;
                    timestamp += 1;
                }
                Err(e) => return Err(ElcovError::path_io(&path, e.error)),
            }
        }
    }

    /// Snapshot files currently on disk, in name order
    pub fn snapshot_paths(&self) -> ElcovResult<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = format!(
            "{}/*.json",
            glob::Pattern::escape(&self.dir.to_string_lossy())
        );
        let mut paths = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Read one snapshot as a coverage map
    pub fn read(path: &Path) -> ElcovResult<CoverageMap> {
        let text = fs::read_to_string(path).map_err(|e| ElcovError::path_io(path, e))?;
        Ok(CoverageMap::from_json(&text)?)
    }

    /// Load every snapshot with its parsed name
    pub fn load_all(&self) -> ElcovResult<Vec<ProcessReport>> {
        let mut reports = Vec::new();
        for path in self.snapshot_paths()? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let (process_id, process_kind, timestamp_ms) = ProcessReport::parse_file_name(&name)?;
            let coverage = Self::read(&path)?;
            reports.push(ProcessReport {
                process_id,
                process_kind,
                timestamp_ms,
                path,
                coverage,
            });
        }
        Ok(reports)
    }
}

/// Keep ids usable as a single path component
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}
