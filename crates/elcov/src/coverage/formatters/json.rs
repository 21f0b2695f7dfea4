//! istanbul JSON reports: `coverage-final.json` and `coverage-summary.json`

use crate::coverage::{CoverageMap, CoverageSummary, Totals};
use crate::result::ElcovResult;
use serde::Serialize;
use std::collections::BTreeMap;

/// Writes the merged map verbatim
#[derive(Debug)]
pub struct JsonFormatter<'a> {
    coverage: &'a CoverageMap,
}

impl<'a> JsonFormatter<'a> {
    /// Create a new JSON formatter
    #[must_use]
    pub fn new(coverage: &'a CoverageMap) -> Self {
        Self { coverage }
    }

    /// Serialize the coverage map
    pub fn generate(&self) -> ElcovResult<String> {
        Ok(serde_json::to_string(self.coverage)?)
    }
}

#[derive(Serialize)]
struct MetricJson {
    total: usize,
    covered: usize,
    skipped: usize,
    pct: f64,
}

impl From<Totals> for MetricJson {
    fn from(totals: Totals) -> Self {
        Self {
            total: totals.total,
            covered: totals.covered,
            skipped: 0,
            pct: (totals.pct() * 100.0).round() / 100.0,
        }
    }
}

#[derive(Serialize)]
struct SummaryJson {
    lines: MetricJson,
    statements: MetricJson,
    functions: MetricJson,
    branches: MetricJson,
}

impl From<CoverageSummary> for SummaryJson {
    fn from(summary: CoverageSummary) -> Self {
        Self {
            lines: summary.lines.into(),
            statements: summary.statements.into(),
            functions: summary.functions.into(),
            branches: summary.branches.into(),
        }
    }
}

/// Per-file percentages keyed by path, plus a `total` entry
#[derive(Debug)]
pub struct JsonSummaryFormatter<'a> {
    coverage: &'a CoverageMap,
}

impl<'a> JsonSummaryFormatter<'a> {
    /// Create a new JSON summary formatter
    #[must_use]
    pub fn new(coverage: &'a CoverageMap) -> Self {
        Self { coverage }
    }

    /// Serialize the summary
    pub fn generate(&self) -> ElcovResult<String> {
        let mut out = BTreeMap::new();
        out.insert("total", SummaryJson::from(self.coverage.summary()));
        for (path, file) in self.coverage.iter() {
            out.insert(path, SummaryJson::from(file.summary()));
        }
        Ok(serde_json::to_string(&out)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::FileCoverage;

    fn create_test_map() -> CoverageMap {
        let mut file = FileCoverage::new("/app/a.js");
        file.s.insert("1".into(), 1);
        file.s.insert("2".into(), 0);
        file.f.insert("1".into(), 0);
        let mut map = CoverageMap::new();
        map.insert("/app/a.js", file);
        map
    }

    #[test]
    fn test_final_json_round_trips() {
        let map = create_test_map();
        let json = JsonFormatter::new(&map).generate().unwrap();
        assert_eq!(CoverageMap::from_json(&json).unwrap(), map);
    }

    #[test]
    fn test_summary_has_total_and_files() {
        let map = create_test_map();
        let json = JsonSummaryFormatter::new(&map).generate().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["total"]["statements"]["total"], 2);
        assert_eq!(value["total"]["statements"]["covered"], 1);
        assert_eq!(value["total"]["statements"]["pct"], 50.0);
        assert_eq!(value["/app/a.js"]["functions"]["pct"], 0.0);
        assert_eq!(value["/app/a.js"]["branches"]["pct"], 100.0);
    }
}
