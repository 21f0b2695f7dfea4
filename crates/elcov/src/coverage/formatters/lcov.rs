//! LCOV Report Formatter
//!
//! Generates LCOV-format coverage reports for CI integration.
//!
//! ## LCOV Format
//!
//! ```text
//! TN:<test name>
//! SF:<source file>
//! FN:<line>,<function name>
//! FNDA:<execution count>,<function name>
//! FNF:<functions found>
//! FNH:<functions hit>
//! BRDA:<line>,<block>,<branch>,<taken>
//! BRF:<branches found>
//! BRH:<branches hit>
//! DA:<line>,<execution count>
//! LF:<lines found>
//! LH:<lines hit>
//! end_of_record
//! ```

use crate::coverage::CoverageMap;
use crate::result::ElcovResult;
use std::fmt::Write;
use std::path::Path;

/// LCOV format report generator
#[derive(Debug)]
pub struct LcovFormatter<'a> {
    coverage: &'a CoverageMap,
    test_name: Option<String>,
}

impl<'a> LcovFormatter<'a> {
    /// Create a new LCOV formatter from coverage data
    #[must_use]
    pub fn new(coverage: &'a CoverageMap) -> Self {
        Self {
            coverage,
            test_name: None,
        }
    }

    /// Set the test name for the report
    #[must_use]
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }

    /// Generate LCOV format report as a string
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        for (path, file) in self.coverage.iter() {
            let _ = writeln!(output, "TN:{}", self.test_name.as_deref().unwrap_or(""));
            let _ = writeln!(output, "SF:{path}");

            let functions = file.functions();
            for (meta, _) in &functions {
                let _ = writeln!(output, "FN:{},{}", meta.line, meta.name);
            }
            for (meta, hits) in &functions {
                let _ = writeln!(output, "FNDA:{hits},{}", meta.name);
            }
            let functions_hit = functions.iter().filter(|(_, hits)| *hits > 0).count();
            let _ = writeln!(output, "FNF:{}", functions.len());
            let _ = writeln!(output, "FNH:{functions_hit}");

            let lines = file.line_hits();
            for (line, hits) in &lines {
                let _ = writeln!(output, "DA:{line},{hits}");
            }
            let lines_hit = lines.values().filter(|hits| **hits > 0).count();
            let _ = writeln!(output, "LF:{}", lines.len());
            let _ = writeln!(output, "LH:{lines_hit}");

            let arms = file.branch_arms();
            for (line, block, arm, hits) in &arms {
                let _ = writeln!(output, "BRDA:{line},{block},{arm},{hits}");
            }
            let arms_hit = arms.iter().filter(|(.., hits)| *hits > 0).count();
            let _ = writeln!(output, "BRF:{}", arms.len());
            let _ = writeln!(output, "BRH:{arms_hit}");

            output.push_str("end_of_record\n");
        }

        output
    }

    /// Save the LCOV report to a file
    ///
    /// # Errors
    ///
    /// Returns error if file write fails
    pub fn save(&self, path: &Path) -> ElcovResult<()> {
        std::fs::write(path, self.generate())?;
        Ok(())
    }
}
