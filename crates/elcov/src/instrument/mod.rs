//! Source Tree Instrumentation
//!
//! Rewrites every `.js` file under a source root with coverage counters and
//! mirrors the result into a temporary directory, ready for packaging.
//!
//! ## Usage
//!
//! ```ignore
//! let tree = instrument_tree(Path::new("app/lib"), &StatementInstrumenter::new())?;
//! package_directory(tree.path(), Path::new("out/app.asar"))?;
//! ```

mod scanner;

pub use scanner::StatementInstrumenter;

use crate::archive::package_directory;
use crate::coverage::FileCoverage;
use crate::result::{ElcovError, ElcovResult};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;

/// Output of instrumenting one file
#[derive(Debug, Clone)]
pub struct Instrumented {
    /// Rewritten source text
    pub code: String,
    /// Initial counter state, keyed by the file's identity path
    pub state: FileCoverage,
}

/// A static instrumentation transform
pub trait Instrument: Send + Sync {
    /// Rewrite `source`, using `path` as the coverage identity key
    fn instrument(&self, source: &str, path: &Path) -> ElcovResult<Instrumented>;
}

/// Find `.js` files under `root` (glob `**/*.js`, dotfiles excluded).
///
/// Returns paths relative to `root` in sorted order.
pub fn discover_js_files(root: &Path) -> ElcovResult<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/*.js",
        glob::Pattern::escape(&root.to_string_lossy())
    );
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let mut files = Vec::new();
    for entry in glob::glob_with(&pattern, options)? {
        let path = entry?;
        if !path.is_file() {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Resolve `path` against the current directory, folding `.` and `..`
/// lexically so the same file always yields the same coverage key.
pub fn absolute_path(path: &Path) -> ElcovResult<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    Ok(resolved)
}

/// An instrumented copy of a source tree
///
/// The temporary directory is removed when this value is dropped.
#[derive(Debug)]
pub struct InstrumentedTree {
    dir: TempDir,
    file_count: usize,
}

impl InstrumentedTree {
    /// Root of the instrumented copy
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Number of files instrumented
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.file_count
    }
}

/// Instrument every `.js` file under `source_root` into a fresh temp directory.
///
/// Any read, transform or write failure aborts the whole pass.
pub fn instrument_tree(
    source_root: &Path,
    instrumenter: &dyn Instrument,
) -> ElcovResult<InstrumentedTree> {
    let source_root = absolute_path(source_root)?;
    if !source_root.is_dir() {
        return Err(ElcovError::SourceNotFound { path: source_root });
    }

    let dir = tempfile::Builder::new().prefix("elcov").tempdir()?;
    let mut file_count = 0;

    for relative in discover_js_files(&source_root)? {
        let raw_path = source_root.join(&relative);
        let raw = fs::read_to_string(&raw_path).map_err(|e| ElcovError::path_io(&raw_path, e))?;
        let generated = instrumenter.instrument(&raw, &raw_path)?;

        let generated_path = dir.path().join(&relative);
        if let Some(parent) = generated_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ElcovError::path_io(parent, e))?;
        }
        fs::write(&generated_path, generated.code)
            .map_err(|e| ElcovError::path_io(&generated_path, e))?;

        tracing::debug!(file = %raw_path.display(), "instrumented");
        file_count += 1;
    }

    tracing::info!(
        root = %source_root.display(),
        files = file_count,
        "instrumented source tree"
    );
    Ok(InstrumentedTree { dir, file_count })
}

/// Instrument `input` and package the result as an asar archive at `output`.
///
/// Returns the resolved archive path and the number of instrumented files.
pub fn instrument_to_archive(
    input: &Path,
    output: &Path,
    instrumenter: &dyn Instrument,
) -> ElcovResult<(PathBuf, usize)> {
    let output = absolute_path(output)?;
    let tree = instrument_tree(input, instrumenter)?;
    let archive = package_directory(tree.path(), &output)?;
    Ok((archive, tree.file_count()))
}
