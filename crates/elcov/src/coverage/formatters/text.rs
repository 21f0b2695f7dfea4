//! Plain-text totals in the istanbul `text-summary` layout

use crate::coverage::{CoverageMap, Totals};
use std::fmt::Write;

const RULE_WIDTH: usize = 80;

/// Text summary report generator
#[derive(Debug)]
pub struct TextSummaryFormatter<'a> {
    coverage: &'a CoverageMap,
}

impl<'a> TextSummaryFormatter<'a> {
    /// Create a new text summary formatter
    #[must_use]
    pub fn new(coverage: &'a CoverageMap) -> Self {
        Self { coverage }
    }

    /// Generate the summary block
    #[must_use]
    pub fn generate(&self) -> String {
        let summary = self.coverage.summary();
        let title = " Coverage summary ";
        let side = (RULE_WIDTH - title.len()) / 2;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{}{}{}",
            "=".repeat(side),
            title,
            "=".repeat(RULE_WIDTH - side - title.len())
        );
        write_metric(&mut out, "Statements", summary.statements);
        write_metric(&mut out, "Branches", summary.branches);
        write_metric(&mut out, "Functions", summary.functions);
        write_metric(&mut out, "Lines", summary.lines);
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        out
    }
}

fn write_metric(out: &mut String, label: &str, totals: Totals) {
    let _ = writeln!(
        out,
        "{label:<13}: {:.2}% ( {}/{} )",
        totals.pct(),
        totals.covered,
        totals.total
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::FileCoverage;

    #[test]
    fn test_summary_lines() {
        let mut file = FileCoverage::new("/app/a.js");
        file.s.insert("1".into(), 3);
        file.s.insert("2".into(), 0);
        file.f.insert("1".into(), 0);
        let mut map = CoverageMap::new();
        map.insert("/app/a.js", file);

        let text = TextSummaryFormatter::new(&map).generate();
        assert!(text.contains("Coverage summary"));
        assert!(text.contains("Statements   : 50.00% ( 1/2 )"));
        assert!(text.contains("Functions    : 0.00% ( 0/1 )"));
        assert!(text.contains("Branches     : 100.00% ( 0/0 )"));
        assert_eq!(text.lines().count(), 6);
    }
}
