//! Cobertura XML Coverage Report Formatter
//!
//! Generates Cobertura XML format coverage reports for CI integration.
//!
//! ## Cobertura XML Format
//!
//! ```xml
//! <?xml version="1.0" ?>
//! <!DOCTYPE coverage SYSTEM "http://cobertura.sourceforge.net/xml/coverage-04.dtd">
//! <coverage line-rate="0.8" branch-rate="0.7" version="1.0">
//!   <packages>
//!     <package name="lib" line-rate="0.8" branch-rate="0.7" complexity="0">
//!       <classes>
//!         <class name="main.js" filename="lib/main.js" line-rate="0.9">
//!           <methods>...</methods>
//!           <lines>
//!             <line number="10" hits="5"/>
//!           </lines>
//!         </class>
//!       </classes>
//!     </package>
//!   </packages>
//! </coverage>
//! ```

use super::xml_escape;
use crate::coverage::{CoverageMap, FileCoverage, Totals};
use crate::result::ElcovResult;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// Files grouped by directory
type PackageMap<'a> = BTreeMap<String, Vec<(&'a str, &'a FileCoverage)>>;

/// Cobertura XML format report generator
#[derive(Debug)]
pub struct CoberturaFormatter<'a> {
    coverage: &'a CoverageMap,
    version: String,
}

impl<'a> CoberturaFormatter<'a> {
    /// Create a new Cobertura formatter
    #[must_use]
    pub fn new(coverage: &'a CoverageMap) -> Self {
        Self {
            coverage,
            version: "1.0".to_string(),
        }
    }

    /// Set the version string
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Generate Cobertura XML report as a string
    #[must_use]
    pub fn generate(&self) -> String {
        let summary = self.coverage.summary();
        let packages = self.group_by_package();

        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<!DOCTYPE coverage SYSTEM "http://cobertura.sourceforge.net/xml/coverage-04.dtd">"#,
        );
        xml.push('\n');
        let _ = writeln!(
            xml,
            r#"<coverage line-rate="{:.4}" branch-rate="{:.4}" lines-covered="{}" lines-valid="{}" branches-covered="{}" branches-valid="{}" complexity="0" version="{}" timestamp="{}">"#,
            rate(summary.lines),
            rate(summary.branches),
            summary.lines.covered,
            summary.lines.total,
            summary.branches.covered,
            summary.branches.total,
            xml_escape(&self.version),
            chrono::Utc::now().timestamp_millis(),
        );

        xml.push_str("  <packages>\n");

        for (package_name, files) in &packages {
            let mut lines = Totals::default();
            let mut branches = Totals::default();
            for (_, file) in files {
                let file_summary = file.summary();
                lines.total += file_summary.lines.total;
                lines.covered += file_summary.lines.covered;
                branches.total += file_summary.branches.total;
                branches.covered += file_summary.branches.covered;
            }

            let _ = writeln!(
                xml,
                r#"    <package name="{}" line-rate="{:.4}" branch-rate="{:.4}" complexity="0">"#,
                xml_escape(package_name),
                rate(lines),
                rate(branches),
            );
            xml.push_str("      <classes>\n");

            for (path, file) in files {
                Self::write_class(&mut xml, path, file);
            }

            xml.push_str("      </classes>\n");
            xml.push_str("    </package>\n");
        }

        xml.push_str("  </packages>\n");
        xml.push_str("</coverage>\n");

        xml
    }

    /// Save the Cobertura report to a file
    ///
    /// # Errors
    ///
    /// Returns error if file write fails
    pub fn save(&self, path: &Path) -> ElcovResult<()> {
        std::fs::write(path, self.generate())?;
        Ok(())
    }

    fn write_class(xml: &mut String, path: &str, file: &FileCoverage) {
        let summary = file.summary();
        let _ = writeln!(
            xml,
            r#"        <class name="{}" filename="{}" line-rate="{:.4}" branch-rate="{:.4}" complexity="0">"#,
            xml_escape(Self::extract_class_name(path)),
            xml_escape(path),
            rate(summary.lines),
            rate(summary.branches),
        );

        xml.push_str("          <methods>\n");
        for (meta, hits) in file.functions() {
            let _ = writeln!(
                xml,
                r#"            <method name="{}" hits="{}" signature="()V">"#,
                xml_escape(&meta.name),
                hits
            );
            let _ = writeln!(
                xml,
                r#"              <lines><line number="{}" hits="{}"/></lines>"#,
                meta.line, hits
            );
            xml.push_str("            </method>\n");
        }
        xml.push_str("          </methods>\n");

        let mut arms_by_line: BTreeMap<u32, Totals> = BTreeMap::new();
        for (line, _, _, hits) in file.branch_arms() {
            let totals = arms_by_line.entry(line).or_default();
            totals.total += 1;
            if hits > 0 {
                totals.covered += 1;
            }
        }

        xml.push_str("          <lines>\n");
        for (line, hits) in file.line_hits() {
            match arms_by_line.get(&line) {
                Some(arms) => {
                    let _ = writeln!(
                        xml,
                        r#"            <line number="{}" hits="{}" branch="true" condition-coverage="{:.0}% ({}/{})"/>"#,
                        line,
                        hits,
                        arms.pct(),
                        arms.covered,
                        arms.total
                    );
                }
                None => {
                    let _ = writeln!(
                        xml,
                        r#"            <line number="{}" hits="{}" branch="false"/>"#,
                        line, hits
                    );
                }
            }
        }
        xml.push_str("          </lines>\n");
        xml.push_str("        </class>\n");
    }

    /// Group files by package (directory)
    fn group_by_package(&self) -> PackageMap<'a> {
        let mut packages: PackageMap<'a> = BTreeMap::new();
        for (path, file) in self.coverage.iter() {
            let package = path
                .trim_start_matches('/')
                .rsplit_once('/')
                .map_or_else(|| "default".to_string(), |(dir, _)| dir.replace('/', "."));
            packages.entry(package).or_default().push((path, file));
        }
        packages
    }

    /// Extract class name (file name) from a path
    fn extract_class_name(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
    }
}

fn rate(totals: Totals) -> f64 {
    totals.pct() / 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::{FunctionMeta, Position, Range};

    fn range(line: u32) -> Range {
        Range {
            start: Position::new(line, 0),
            end: Position::new(line, 1),
        }
    }

    fn create_test_map() -> CoverageMap {
        let mut file = FileCoverage::new("/app/lib/main.js");
        file.statement_map.insert("1".into(), range(1));
        file.statement_map.insert("2".into(), range(2));
        file.s.insert("1".into(), 4);
        file.s.insert("2".into(), 0);
        file.fn_map.insert(
            "1".into(),
            FunctionMeta {
                name: "start<T>".into(),
                line: 1,
                loc: range(1),
            },
        );
        file.f.insert("1".into(), 4);

        let mut map = CoverageMap::new();
        map.insert("/app/lib/main.js", file);
        map
    }

    #[test]
    fn test_generate_header() {
        let map = create_test_map();
        let xml = CoberturaFormatter::new(&map).generate();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<!DOCTYPE coverage"));
        assert!(xml.contains(r#"lines-covered="1" lines-valid="2""#));
        assert!(xml.contains(r#"line-rate="0.5000""#));
    }

    #[test]
    fn test_package_and_class() {
        let map = create_test_map();
        let xml = CoberturaFormatter::new(&map).generate();
        assert!(xml.contains(r#"<package name="app.lib""#));
        assert!(xml.contains(r#"<class name="main.js" filename="/app/lib/main.js""#));
        assert!(xml.contains(r#"<line number="1" hits="4" branch="false"/>"#));
        assert!(xml.contains(r#"<line number="2" hits="0" branch="false"/>"#));
    }

    #[test]
    fn test_method_names_escaped() {
        let map = create_test_map();
        let xml = CoberturaFormatter::new(&map).generate();
        assert!(xml.contains(r#"<method name="start&lt;T&gt;" hits="4""#));
    }

    #[test]
    fn test_with_version() {
        let map = CoverageMap::new();
        let xml = CoberturaFormatter::new(&map).with_version("2.1").generate();
        assert!(xml.contains(r#"version="2.1""#));
        assert!(xml.contains("<packages>"));
    }
}
