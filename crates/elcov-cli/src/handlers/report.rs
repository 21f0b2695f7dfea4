//! Report command handler
//!
//! Offline merge of a finished run: the snapshots under `<output>/data`, an
//! optional live map, and zero baselines for library files that never loaded.

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::ReportArgs;
use elcov::coverage::formatters::TextSummaryFormatter;
use elcov::coverage::CoverageSummary;
use elcov::{Coverage, CoverageMap, CoverageOptions};
use std::fs;
use std::path::Path;

/// Combine the options file (if any) with command-line overrides
pub fn resolve_options(args: &ReportArgs) -> CliResult<CoverageOptions> {
    let base = match &args.config {
        Some(path) => CoverageOptions::from_json_file(path)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?,
        None => CoverageOptions::default(),
    };

    let mut builder = CoverageOptions::builder()
        .output_path(args.output_path.clone().unwrap_or(base.output_path))
        .lib_path(args.lib_path.clone().unwrap_or(base.lib_path));
    builder = if args.formats.is_empty() {
        builder.formats(base.formats)
    } else {
        builder.formats(args.formats.iter().cloned())
    };
    Ok(builder.build())
}

fn load_live(path: &Path) -> CliResult<CoverageMap> {
    let text = fs::read_to_string(path)?;
    CoverageMap::from_json(&text)
        .map_err(|e| CliError::invalid_argument(format!("--live {}: {e}", path.display())))
}

/// Merge and write the reports, returning the overall totals
pub fn execute_report(config: &CliConfig, args: &ReportArgs) -> CliResult<CoverageSummary> {
    let options = resolve_options(args)?;
    let live = match &args.live {
        Some(path) => load_live(path)?,
        None => CoverageMap::new(),
    };

    let mut coverage = Coverage::new(options, Some(live))?;
    let output_dir = coverage.output_path().to_path_buf();
    tracing::info!(
        data = %coverage.data_path().display(),
        lib = %coverage.lib_path().display(),
        "merging coverage"
    );

    let Some(merged) = coverage.generate_report()? else {
        return Ok(CoverageSummary::default());
    };
    let summary = merged.summary();

    if !config.verbosity.is_quiet() {
        print!("{}", TextSummaryFormatter::new(merged).generate());
        println!("Reports written to {}", output_dir.display());
    }
    Ok(summary)
}
