//! Coverage Report Formatters
//!
//! LCOV, Cobertura XML, istanbul JSON and text summary generators, plus the
//! [`Reporter`] that writes a configured set of them into an output
//! directory.

mod cobertura;
mod json;
mod lcov;
mod text;

pub use cobertura::CoberturaFormatter;
pub use json::{JsonFormatter, JsonSummaryFormatter};
pub use lcov::LcovFormatter;
pub use text::TextSummaryFormatter;

use crate::coverage::CoverageMap;
use crate::result::{ElcovError, ElcovResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supported report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFormat {
    /// `lcov.info`
    Lcov,
    /// `coverage-final.json`
    Json,
    /// `coverage-summary.json`
    JsonSummary,
    /// `cobertura-coverage.xml`
    Cobertura,
    /// `coverage-summary.txt`
    TextSummary,
}

impl ReportFormat {
    /// File written for this format
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Lcov => "lcov.info",
            Self::Json => "coverage-final.json",
            Self::JsonSummary => "coverage-summary.json",
            Self::Cobertura => "cobertura-coverage.xml",
            Self::TextSummary => "coverage-summary.txt",
        }
    }

    /// Render the report contents
    pub fn render(self, coverage: &CoverageMap) -> ElcovResult<String> {
        Ok(match self {
            Self::Lcov => LcovFormatter::new(coverage).generate(),
            Self::Json => JsonFormatter::new(coverage).generate()?,
            Self::JsonSummary => JsonSummaryFormatter::new(coverage).generate()?,
            Self::Cobertura => CoberturaFormatter::new(coverage).generate(),
            Self::TextSummary => TextSummaryFormatter::new(coverage).generate(),
        })
    }
}

impl FromStr for ReportFormat {
    type Err = ElcovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lcov" | "lcovonly" => Ok(Self::Lcov),
            "json" => Ok(Self::Json),
            "json-summary" => Ok(Self::JsonSummary),
            "cobertura" => Ok(Self::Cobertura),
            "text-summary" => Ok(Self::TextSummary),
            other => Err(ElcovError::UnknownReportFormat {
                format: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            Self::Lcov => "lcov",
            Self::Json => "json",
            Self::JsonSummary => "json-summary",
            Self::Cobertura => "cobertura",
            Self::TextSummary => "text-summary",
        };
        f.write_str(id)
    }
}

/// Sink for the final merged coverage
pub trait ReportWriter: Send {
    /// Write reports for `coverage` into `output_dir`, returning the files
    /// written. Must finish writing before returning.
    fn write(&mut self, coverage: &CoverageMap, output_dir: &Path) -> ElcovResult<Vec<PathBuf>>;
}

/// Writes one file per requested format
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    formats: Vec<ReportFormat>,
}

impl Reporter {
    /// Create a reporter for the given formats
    #[must_use]
    pub fn new(formats: Vec<ReportFormat>) -> Self {
        let mut unique = Vec::with_capacity(formats.len());
        for format in formats {
            if !unique.contains(&format) {
                unique.push(format);
            }
        }
        Self { formats: unique }
    }

    /// Create a reporter from format identifiers such as `"lcov"`
    pub fn from_ids<I, S>(ids: I) -> ElcovResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let formats = ids
            .into_iter()
            .map(|id| id.as_ref().parse())
            .collect::<ElcovResult<Vec<_>>>()?;
        Ok(Self::new(formats))
    }

    /// Configured formats
    #[must_use]
    pub fn formats(&self) -> &[ReportFormat] {
        &self.formats
    }
}

impl ReportWriter for Reporter {
    fn write(&mut self, coverage: &CoverageMap, output_dir: &Path) -> ElcovResult<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir).map_err(|e| ElcovError::path_io(output_dir, e))?;
        let mut written = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let path = output_dir.join(format.file_name());
            let content = format.render(coverage)?;
            std::fs::write(&path, content).map_err(|e| ElcovError::path_io(&path, e))?;
            tracing::debug!(%format, path = %path.display(), "wrote coverage report");
            written.push(path);
        }
        Ok(written)
    }
}

/// Escape text for XML attribute values
pub(crate) fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
