//! Instrument command handler

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::InstrumentArgs;
use elcov::{instrument_to_archive, StatementInstrumenter};
use std::path::PathBuf;

/// Instrument `--input-path` into the archive at `--output-path`.
///
/// Returns the archive path and the number of instrumented files.
pub fn execute_instrument(config: &CliConfig, args: &InstrumentArgs) -> CliResult<(PathBuf, usize)> {
    if args.coverage_variable.trim().is_empty() {
        return Err(CliError::invalid_argument(
            "--coverage-variable must not be empty",
        ));
    }

    let instrumenter =
        StatementInstrumenter::new().with_coverage_variable(args.coverage_variable.clone());
    let (archive, count) = instrument_to_archive(&args.input_path, &args.output_path, &instrumenter)?;

    if !config.verbosity.is_quiet() {
        println!("Created {} with {count} instrumented files", archive.display());
    }
    Ok((archive, count))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Verbosity;
    use elcov::AsarArchive;
    use std::fs;

    fn args(input: PathBuf, output: PathBuf) -> InstrumentArgs {
        InstrumentArgs {
            input_path: input,
            output_path: output,
            coverage_variable: "__coverage__".to_string(),
        }
    }

    fn quiet() -> CliConfig {
        CliConfig::new().with_verbosity(Verbosity::Quiet)
    }

    #[test]
    fn test_instrument_creates_archive() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        fs::create_dir_all(lib.join("views")).unwrap();
        fs::write(lib.join("main.js"), "start();\n").unwrap();
        fs::write(lib.join("views/list.js"), "render();\n").unwrap();

        let (archive, count) =
            execute_instrument(&quiet(), &args(lib, dir.path().join("app.asar"))).unwrap();

        assert_eq!(count, 2);
        let archive = AsarArchive::open(&archive).unwrap();
        let main = String::from_utf8(archive.read_file("main.js").unwrap()).unwrap();
        assert!(main.contains("__coverage__"));
    }

    #[test]
    fn test_custom_coverage_variable() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("main.js"), "start();\n").unwrap();

        let mut args = args(lib, dir.path().join("app.asar"));
        args.coverage_variable = "__appCoverage__".to_string();
        let (archive, _) = execute_instrument(&quiet(), &args).unwrap();

        let archive = AsarArchive::open(&archive).unwrap();
        let main = String::from_utf8(archive.read_file("main.js").unwrap()).unwrap();
        assert!(main.contains("__appCoverage__"));
    }

    #[test]
    fn test_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute_instrument(
            &quiet(),
            &args(dir.path().join("nope"), dir.path().join("app.asar")),
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Elcov(_)));
        assert!(!dir.path().join("app.asar").exists());
    }

    #[test]
    fn test_empty_coverage_variable_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(dir.path().to_path_buf(), dir.path().join("app.asar"));
        args.coverage_variable = " ".to_string();
        let err = execute_instrument(&quiet(), &args).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { .. }));
    }
}
