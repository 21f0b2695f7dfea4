//! Istanbul-compatible coverage data model
//!
//! A [`CoverageMap`] maps absolute file paths to [`FileCoverage`] counter
//! states. The JSON shape matches what instrumented code stores in
//! `__coverage__`, so payloads read from renderer processes deserialize
//! directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source position (line is 1-based, column is 0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Position {
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

impl Position {
    /// Create a position
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Range {
    /// Start of the range
    pub start: Position,
    /// End of the range
    pub end: Position,
}

/// Location metadata for one function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMeta {
    /// Function name, `(anonymous_N)` when unnamed
    pub name: String,
    /// Declaration line
    pub line: u32,
    /// Full extent of the function
    pub loc: Range,
}

/// Location metadata for one branch point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchMeta {
    /// Line of the branch point
    pub line: u32,
    /// Branch type (`if`, `cond-expr`, `switch`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// One location per arm
    pub locations: Vec<Range>,
}

/// Counter state for a single file
///
/// Counter ids are the string keys istanbul uses (`"1"`, `"2"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileCoverage {
    /// Absolute path used as identity key
    pub path: String,
    /// Statement hit counts
    #[serde(default)]
    pub s: BTreeMap<String, u64>,
    /// Branch hit counts, one entry per arm
    #[serde(default)]
    pub b: BTreeMap<String, Vec<u64>>,
    /// Function hit counts
    #[serde(default)]
    pub f: BTreeMap<String, u64>,
    /// Function locations
    #[serde(default, rename = "fnMap")]
    pub fn_map: BTreeMap<String, FunctionMeta>,
    /// Statement locations
    #[serde(default, rename = "statementMap")]
    pub statement_map: BTreeMap<String, Range>,
    /// Branch locations
    #[serde(default, rename = "branchMap")]
    pub branch_map: BTreeMap<String, BranchMeta>,
}

impl FileCoverage {
    /// Create an empty counter state for `path`
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Add another state's counts into this one, position by position.
    ///
    /// Both states must come from the same instrumentation pass. Ids only
    /// present in `other` are carried over along with their locations.
    pub fn merge(&mut self, other: &Self) {
        sum_counts(&mut self.s, &other.s);
        sum_counts(&mut self.f, &other.f);
        for (id, arms) in &other.b {
            let mine = self.b.entry(id.clone()).or_default();
            if mine.len() < arms.len() {
                mine.resize(arms.len(), 0);
            }
            for (slot, hits) in mine.iter_mut().zip(arms) {
                *slot = slot.saturating_add(*hits);
            }
        }
        fill_missing(&mut self.statement_map, &other.statement_map);
        fill_missing(&mut self.fn_map, &other.fn_map);
        fill_missing(&mut self.branch_map, &other.branch_map);
        if self.path.is_empty() {
            self.path.clone_from(&other.path);
        }
    }

    /// Zero every statement, function and branch counter
    pub fn reset_counts(&mut self) {
        self.s.values_mut().for_each(|c| *c = 0);
        self.f.values_mut().for_each(|c| *c = 0);
        self.b
            .values_mut()
            .for_each(|arms| arms.iter_mut().for_each(|c| *c = 0));
    }

    /// Per-line hits: the highest statement count starting on each line
    #[must_use]
    pub fn line_hits(&self) -> BTreeMap<u32, u64> {
        let mut lines = BTreeMap::new();
        for (id, range) in &self.statement_map {
            let count = self.s.get(id).copied().unwrap_or(0);
            let entry = lines.entry(range.start.line).or_insert(0);
            if *entry < count {
                *entry = count;
            }
        }
        lines
    }

    /// Functions in declaration order with their hit counts
    #[must_use]
    pub fn functions(&self) -> Vec<(&FunctionMeta, u64)> {
        let mut functions: Vec<_> = self
            .fn_map
            .iter()
            .map(|(id, meta)| (meta, self.f.get(id).copied().unwrap_or(0)))
            .collect();
        functions.sort_by_key(|(meta, _)| (meta.loc.start, meta.line));
        functions
    }

    /// Branch arms as `(line, branch index, arm index, hits)`
    #[must_use]
    pub fn branch_arms(&self) -> Vec<(u32, usize, usize, u64)> {
        let mut metas: Vec<_> = self.branch_map.iter().collect();
        metas.sort_by_key(|(id, meta)| (meta.line, id.parse::<u64>().unwrap_or(u64::MAX)));

        let mut arms = Vec::new();
        for (index, (id, meta)) in metas.into_iter().enumerate() {
            let counts = self.b.get(id.as_str());
            for arm in 0..meta.locations.len() {
                let hits = counts.and_then(|c| c.get(arm)).copied().unwrap_or(0);
                arms.push((meta.line, index, arm, hits));
            }
        }
        arms
    }

    /// Summary totals for this file
    #[must_use]
    pub fn summary(&self) -> CoverageSummary {
        let lines = self.line_hits();
        CoverageSummary {
            lines: Totals::from_counts(lines.values().copied()),
            statements: Totals::from_counts(self.s.values().copied()),
            functions: Totals::from_counts(self.f.values().copied()),
            branches: Totals::from_counts(self.b.values().flatten().copied()),
        }
    }
}

fn sum_counts(into: &mut BTreeMap<String, u64>, from: &BTreeMap<String, u64>) {
    for (id, hits) in from {
        let slot = into.entry(id.clone()).or_insert(0);
        *slot = slot.saturating_add(*hits);
    }
}

fn fill_missing<V: Clone>(into: &mut BTreeMap<String, V>, from: &BTreeMap<String, V>) {
    for (id, value) in from {
        into.entry(id.clone()).or_insert_with(|| value.clone());
    }
}

/// Covered/total counter for one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    /// Number of items
    pub total: usize,
    /// Number of items hit at least once
    pub covered: usize,
}

impl Totals {
    fn from_counts(counts: impl Iterator<Item = u64>) -> Self {
        counts.fold(Self::default(), |mut acc, hits| {
            acc.total += 1;
            if hits > 0 {
                acc.covered += 1;
            }
            acc
        })
    }

    /// Coverage percentage; an empty metric counts as fully covered
    #[must_use]
    pub fn pct(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.covered as f64 / self.total as f64) * 100.0
    }

    fn add(&mut self, other: Self) {
        self.total += other.total;
        self.covered += other.covered;
    }
}

/// Summary statistics across the four istanbul metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// Line totals
    pub lines: Totals,
    /// Statement totals
    pub statements: Totals,
    /// Function totals
    pub functions: Totals,
    /// Branch arm totals
    pub branches: Totals,
}

impl CoverageSummary {
    /// Accumulate another summary
    pub fn add(&mut self, other: &Self) {
        self.lines.add(other.lines);
        self.statements.add(other.statements);
        self.functions.add(other.functions);
        self.branches.add(other.branches);
    }
}

/// Mapping of absolute file path to counter state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageMap {
    files: BTreeMap<String, FileCoverage>,
}

impl CoverageMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a map from JSON text
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Number of files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the map holds no files
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether `path` has an entry
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Counter state for `path`
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileCoverage> {
        self.files.get(path)
    }

    /// Mutable counter state for `path`
    pub fn get_mut(&mut self, path: &str) -> Option<&mut FileCoverage> {
        self.files.get_mut(path)
    }

    /// Insert or replace the state for `path`
    pub fn insert(&mut self, path: impl Into<String>, state: FileCoverage) -> Option<FileCoverage> {
        self.files.insert(path.into(), state)
    }

    /// Iterate files in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileCoverage)> {
        self.files.iter().map(|(path, state)| (path.as_str(), state))
    }

    /// File paths in order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Merge one file's state, summing counts when the path already exists
    pub fn merge_file(&mut self, path: &str, state: &FileCoverage) {
        match self.files.get_mut(path) {
            Some(existing) => existing.merge(state),
            None => {
                let _ = self.files.insert(path.to_string(), state.clone());
            }
        }
    }

    /// Merge every file of `other` into this map
    pub fn merge(&mut self, other: &Self) {
        for (path, state) in &other.files {
            self.merge_file(path, state);
        }
    }

    /// Summary totals across all files
    #[must_use]
    pub fn summary(&self) -> CoverageSummary {
        let mut summary = CoverageSummary::default();
        for state in self.files.values() {
            summary.add(&state.summary());
        }
        summary
    }
}

impl FromIterator<(String, FileCoverage)> for CoverageMap {
    fn from_iter<I: IntoIterator<Item = (String, FileCoverage)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}
