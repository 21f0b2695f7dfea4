//! Instrument, package, run and report an app with one loaded and one
//! never-loaded file.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use elcov::{
    instrument_to_archive, AsarArchive, Coverage, CoverageMap, CoverageOptions, FileCoverage,
    Instrument, StatementInstrumenter,
};
use std::fs;
use std::path::Path;

const A_JS: &str = "function unused() {\n  return 1;\n}\nstart();\n";
const B_JS: &str = "var later = 1;\nfunction never() { return later; }\n";

fn write_app(root: &Path) {
    fs::create_dir_all(root.join("lib/sub")).unwrap();
    fs::write(root.join("lib/a.js"), A_JS).unwrap();
    fs::write(root.join("lib/sub/b.js"), B_JS).unwrap();
    fs::write(root.join("lib/notes.txt"), "not code").unwrap();
}

/// Counters of `a.js` after the app ran `start();` and nothing else
fn executed_a(lib: &Path) -> FileCoverage {
    let path = lib.join("a.js");
    let mut state = StatementInstrumenter::new()
        .instrument(A_JS, &path)
        .unwrap()
        .state;
    let executed = state
        .statement_map
        .iter()
        .find(|(_, range)| range.start.line == 4)
        .map(|(id, _)| id.clone())
        .unwrap();
    *state.s.get_mut(&executed).unwrap() += 1;
    state
}

fn statement_on_line(state: &FileCoverage, line: u32) -> u64 {
    state
        .statement_map
        .iter()
        .filter(|(_, range)| range.start.line == line)
        .map(|(id, _)| state.s[id])
        .sum()
}

#[test]
fn test_instrument_run_report() {
    let root = tempfile::tempdir().unwrap();
    write_app(root.path());
    let lib = root.path().join("lib");

    let (archive_path, count) = instrument_to_archive(
        &lib,
        &root.path().join("out/app.asar"),
        &StatementInstrumenter::new(),
    )
    .unwrap();
    assert_eq!(count, 2);

    let archive = AsarArchive::open(&archive_path).unwrap();
    let mut files = archive.list_files();
    files.sort();
    assert_eq!(files, vec!["a.js", "sub/b.js"]);
    let packaged = String::from_utf8(archive.read_file("a.js").unwrap()).unwrap();
    assert!(packaged.contains("__coverage__"));
    assert!(packaged.contains("start();"));

    let a = executed_a(&lib);
    let a_key = a.path.clone();
    let mut live = CoverageMap::new();
    live.insert(a_key.clone(), a);

    let options = CoverageOptions::builder()
        .output_path(root.path().join("coverage"))
        .lib_path(&lib)
        .formats(["lcov", "json", "text-summary"])
        .build();
    let mut coverage = Coverage::new(options, Some(live)).unwrap();
    assert!(coverage.setup().unwrap());

    let merged = coverage.generate_report().unwrap().unwrap().clone();
    assert_eq!(merged.len(), 2);

    let a = merged.get(&a_key).unwrap();
    assert!(statement_on_line(a, 4) >= 1);
    assert!(a.f.values().all(|hits| *hits == 0));
    assert_eq!(statement_on_line(a, 2), 0);

    let b_key = lib.join("sub/b.js").to_string_lossy().into_owned();
    let b = merged.get(&b_key).unwrap();
    assert!(!b.s.is_empty());
    assert!(b.s.values().all(|hits| *hits == 0));
    assert!(b.f.values().all(|hits| *hits == 0));

    let lcov = fs::read_to_string(root.path().join("coverage/lcov.info")).unwrap();
    assert!(lcov.contains(&format!("SF:{a_key}")));
    assert!(lcov.contains(&format!("SF:{b_key}")));
    assert!(root.path().join("coverage/coverage-final.json").exists());
    assert!(root.path().join("coverage/coverage-summary.txt").exists());
}

#[cfg(feature = "host")]
mod with_renderers {
    use super::*;
    use async_trait::async_trait;
    use elcov::hooks::{IpcEvent, IpcMessage, SAVE_COVERAGE_CHANNEL};
    use elcov::{BrowserWindow, ElcovResult, HookOptions, WebContents};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Renderer {
        id: String,
        answer: Value,
    }

    #[async_trait]
    impl WebContents for Renderer {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn kind(&self) -> String {
            "window".to_string()
        }

        async fn execute_javascript(&self, _script: &str) -> ElcovResult<Value> {
            Ok(self.answer.clone())
        }
    }

    struct Window {
        devtools: Arc<Renderer>,
        closed: AtomicBool,
    }

    #[async_trait]
    impl BrowserWindow for Window {
        fn is_destroyed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn url(&self) -> String {
            "file:///app/index.html".to_string()
        }

        fn devtools_web_contents(&self) -> Option<Arc<dyn WebContents>> {
            Some(self.devtools.clone())
        }

        async fn close(&self) -> ElcovResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// The same renderer reports through both paths; both snapshots count
    #[tokio::test]
    async fn test_pull_and_push_are_additive() {
        let root = tempfile::tempdir().unwrap();
        write_app(root.path());
        let lib = root.path().join("lib");

        let renderer_state = executed_a(&lib);
        let key = renderer_state.path.clone();
        let mut renderer_map = CoverageMap::new();
        renderer_map.insert(key.clone(), renderer_state);
        let payload = serde_json::to_value(&renderer_map).unwrap();

        let options = CoverageOptions::builder()
            .output_path(root.path().join("coverage"))
            .lib_path(&lib)
            .build();
        let mut coverage = Coverage::new(options, Some(CoverageMap::new())).unwrap();
        coverage.setup().unwrap();
        let hooks = coverage.hooks(HookOptions::default()).unwrap();

        let devtools = Arc::new(Renderer {
            id: "2".to_string(),
            answer: json!([payload.clone(), 300]),
        });
        let window = hooks.wrap_window(Window {
            devtools: devtools.clone(),
            closed: AtomicBool::new(false),
        });
        window.close().await.unwrap();
        assert!(window.inner().closed.load(Ordering::SeqCst));

        let (tx, rx) = mpsc::channel(4);
        let listener = hooks.listen(rx);
        let message =
            IpcMessage::from_channel(SAVE_COVERAGE_CHANNEL, &[payload, json!(300)]).unwrap();
        tx.send(IpcEvent::new(devtools, message)).await.unwrap();
        drop(tx);
        assert_eq!(listener.await.unwrap(), 1);

        let reports = coverage.store().load_all().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.process_id == "300"));

        let merged = coverage.generate_report().unwrap().unwrap();
        assert_eq!(statement_on_line(merged.get(&key).unwrap(), 4), 2);
        let b_key = lib.join("sub/b.js").to_string_lossy().into_owned();
        assert!(merged.get(&b_key).unwrap().s.values().all(|hits| *hits == 0));
    }
}
