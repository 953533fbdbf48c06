// tests/orchestration_test.rs

//! End-to-end cycles against stand-in `meson` and `ninja` scripts that record their argv.

#![cfg(unix)]

use mesonctl::core::coordinator::{Coordinator, CoordinatorError};
use mesonctl::core::events::Outcome;
use mesonctl::core::kit::StaticKit;
use mesonctl::core::settings::{BuildConfiguration, Settings};
use mesonctl::core::tasks::CollectingTaskSink;
use mesonctl::core::tool_registry::ToolRegistry;
use mesonctl::models::KitData;
use mesonctl::system::tool_wrapper::{ToolKind, ToolWrapper, is_setup};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(20);

const FAKE_MESON: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
    echo "1.4.0"
    exit 0
fi
echo "$*" >> "@LOG@"
case "$1" in
@EXTRA_CASES@
    setup)
        for build; do :; done
        info="$build/meson-info"
        mkdir -p "$info"
        for f in intro-tests.json intro-installed.json intro-benchmarks.json intro-buildoptions.json intro-dependencies.json; do
            echo '[]' > "$info/$f"
        done
        echo '{"descriptive_name": "demo", "version": "0.1", "subprojects": []}' > "$info/intro-projectinfo.json"
        echo '["@SRC@/meson.build"]' > "$info/intro-buildsystem_files.json"
        cat > "$info/intro-targets.json" <<JSON
[
  {"name": "app", "id": "app@exe", "type": "executable", "defined_in": "@SRC@/meson.build",
   "filename": ["$build/app"],
   "target_sources": [{"language": "c", "compiler": ["cc"], "parameters": [], "sources": ["@SRC@/main.c"], "generated_sources": []}]},
  {"name": "helper", "id": "helper@exe", "type": "executable", "defined_in": "@SRC@/tools/meson.build",
   "filename": ["$build/tools/helper"],
   "target_sources": [{"language": "c", "compiler": ["cc"], "parameters": [], "sources": ["@SRC@/tools/helper.c"], "generated_sources": []}]}
]
JSON
        echo '{"meson_version": {"full": "1.4.0", "major": 1, "minor": 4, "patch": 0}}' > "$info/meson-info.json"
        ;;
esac
exit 0
"#;

const FAKE_NINJA: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
    echo "1.11.1"
    exit 0
fi
echo "ninja $*" >> "@LOG@"
echo "[1/2] Compiling C object app.p/main.c.o"
echo "[2/2] Linking target app"
exit 0
"#;

struct Fixture {
    _dir: TempDir,
    source: PathBuf,
    build: PathBuf,
    log: PathBuf,
    sink: Arc<CollectingTaskSink>,
    coordinator: Coordinator,
}

/// Makes `configure` fail with a located error on stderr.
const FAILING_CONFIGURE: &str = r#"    configure)
        echo "meson.build:3:0: ERROR: Unknown variable \"foo\"." >&2
        exit 1
        ;;"#;

/// Answers `introspect --all` with a document on stdout.
const INTROSPECT_DOCUMENT: &str = r#"    introspect)
        cat <<JSON
{"projectinfo": {"descriptive_name": "demo", "version": "0.1", "subprojects": []},
 "buildsystem_files": ["@SRC@/meson.build"],
 "buildoptions": [{"name": "docs", "section": "user", "type": "feature", "value": "auto"}],
 "targets": [{"name": "app", "id": "app@exe", "type": "executable", "defined_in": "@SRC@/meson.build",
              "filename": ["@BUILD@/app"], "target_sources": []}]}
JSON
        ;;"#;

/// Makes `introspect` fail the way Meson does on an unparsable project.
const FAILING_INTROSPECT: &str = r#"    introspect)
        echo "meson.build:1:0: ERROR: Meson version is 1.4.0 but project requires >=9.0" >&2
        exit 1
        ;;"#;

fn write_script(path: &Path, template: &str, extra_cases: &str, log: &Path, source: &Path, build: &Path) {
    let text = template
        .replace("@EXTRA_CASES@", extra_cases)
        .replace("@LOG@", &log.to_string_lossy())
        .replace("@SRC@", &source.to_string_lossy())
        .replace("@BUILD@", &build.to_string_lossy());
    fs::write(path, text).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn fixture() -> Fixture {
    fixture_with("", Settings::default())
}

fn fixture_with(extra_cases: &str, settings: Settings) -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dunce::canonicalize(dir.path()).unwrap();
    let source = root.join("project");
    let build = root.join("project-build");
    let log = root.join("argv.log");
    fs::create_dir_all(source.join("tools")).unwrap();
    fs::write(source.join("meson.build"), "project('demo', 'c')\n").unwrap();

    let meson = root.join("meson");
    let ninja = root.join("ninja");
    write_script(&meson, FAKE_MESON, extra_cases, &log, &source, &build);
    write_script(&ninja, FAKE_NINJA, "", &log, &source, &build);

    let mut registry = ToolRegistry::new();
    registry.add(ToolWrapper::new(ToolKind::Meson, "fake meson", meson, false)).unwrap();
    registry.add(ToolWrapper::new(ToolKind::Ninja, "fake ninja", ninja, false)).unwrap();
    assert!(registry.meson(None).unwrap().version().is_valid);

    let sink = Arc::new(CollectingTaskSink::new());
    let coordinator = Coordinator::new(
        BuildConfiguration::new(source.clone(), build.clone()),
        settings,
        registry.into_shared(),
        Arc::new(StaticKit(KitData::default())),
        sink.clone(),
    );
    Fixture {
        _dir: dir,
        source,
        build,
        log,
        sink,
        coordinator,
    }
}

fn logged_commands(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_configure_of_empty_build_dir_sets_up_regenerates_and_parses() {
    let mut fx = fixture();
    assert!(!is_setup(&fx.build));

    fx.coordinator.configure().unwrap();
    let outcome = fx.coordinator.wait_for_outcome(TIMEOUT).unwrap();
    assert_eq!(outcome, Outcome::ParsingCompleted(true));
    assert!(is_setup(&fx.build));

    let commands = logged_commands(&fx.log);
    assert_eq!(commands.len(), 2, "{:?}", commands);
    assert!(commands[0].starts_with("setup "));
    assert!(!commands[0].contains("--wipe"));
    assert!(commands[0].contains("-Dbuildtype=debug"));
    assert!(commands[1].starts_with("--internal regenerate "));
    assert!(commands[1].ends_with("--backend ninja"));

    let snapshot = fx.coordinator.snapshot().unwrap();
    let names: Vec<&str> = snapshot.result.targets.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["app", "helper"]);
    assert!(snapshot.target_names.contains(&"app".to_string()));
    assert!(snapshot.target_names.contains(&"tools/helper".to_string()));
    assert!(snapshot.target_names.contains(&"all".to_string()));
    assert_eq!(
        snapshot.result.build_system_files,
        [fx.source.join("meson.build")]
    );
    assert!(fx.sink.errors().is_empty());
}

#[test]
fn test_configure_of_set_up_dir_runs_regenerate_right_after_configure() {
    let mut fx = fixture();
    fx.coordinator.setup().unwrap();
    assert_eq!(fx.coordinator.wait_for_outcome(TIMEOUT).unwrap(), Outcome::ParsingCompleted(true));
    fs::remove_file(&fx.log).unwrap();

    fx.coordinator.set_pending_config_args(vec!["-Dwarning_level=3".to_string()]);
    fx.coordinator.configure().unwrap();
    assert_eq!(fx.coordinator.wait_for_outcome(TIMEOUT).unwrap(), Outcome::ParsingCompleted(true));

    let commands = logged_commands(&fx.log);
    assert_eq!(commands.len(), 2, "{:?}", commands);
    assert!(commands[0].starts_with("configure -Dwarning_level=3"));
    assert!(commands[1].starts_with("--internal regenerate "));
    assert!(fx.coordinator.pending_config_args().is_empty());
}

#[test]
fn test_second_request_while_busy_spawns_nothing() {
    let mut fx = fixture();
    fx.coordinator.configure().unwrap();
    assert!(matches!(fx.coordinator.configure(), Err(CoordinatorError::Busy)));
    assert!(matches!(fx.coordinator.build("all"), Err(CoordinatorError::Busy)));
    fx.coordinator.wait_for_outcome(TIMEOUT).unwrap();

    let commands = logged_commands(&fx.log);
    assert_eq!(commands.iter().filter(|c| c.starts_with("setup ")).count(), 1);
    assert!(!commands.iter().any(|c| c.starts_with("ninja")));
}

#[test]
fn test_setup_of_set_up_dir_wipes() {
    let mut fx = fixture();
    fx.coordinator.setup().unwrap();
    fx.coordinator.wait_for_outcome(TIMEOUT).unwrap();
    fx.coordinator.setup().unwrap();
    fx.coordinator.wait_for_outcome(TIMEOUT).unwrap();

    let commands = logged_commands(&fx.log);
    assert!(!commands[0].contains("--wipe"));
    assert!(commands[1].contains("--wipe"));
}

#[test]
fn test_build_runs_backend_in_build_dir() {
    let mut fx = fixture();
    fx.coordinator.configure().unwrap();
    fx.coordinator.wait_for_outcome(TIMEOUT).unwrap();

    let lines = Arc::new(std::sync::Mutex::new(Vec::new()));
    let captured = lines.clone();
    fx.coordinator
        .set_output_handler(Box::new(move |line| captured.lock().unwrap().push(line.to_string())));

    fx.coordinator.build("app").unwrap();
    assert_eq!(fx.coordinator.wait_for_outcome(TIMEOUT).unwrap(), Outcome::BuildCompleted(true));
    assert!(logged_commands(&fx.log).contains(&"ninja app".to_string()));
    assert!(lines.lock().unwrap().iter().any(|l| l.contains("Linking target app")));
    assert!(!fx.coordinator.is_busy());
}

#[test]
fn test_failed_configure_skips_regenerate_and_keeps_previous_model() {
    let mut fx = fixture_with(FAILING_CONFIGURE, Settings::default());
    fx.coordinator.setup().unwrap();
    assert_eq!(fx.coordinator.wait_for_outcome(TIMEOUT).unwrap(), Outcome::ParsingCompleted(true));
    let previous = fx.coordinator.snapshot().unwrap();
    fs::remove_file(&fx.log).unwrap();

    fx.coordinator.configure().unwrap();
    assert_eq!(fx.coordinator.wait_for_outcome(TIMEOUT).unwrap(), Outcome::ParsingCompleted(false));
    assert!(!fx.coordinator.is_busy());
    assert!(fx.coordinator.orchestrator().is_idle());

    let commands = logged_commands(&fx.log);
    assert_eq!(commands.len(), 1, "{:?}", commands);
    assert!(commands[0].starts_with("configure "));

    assert!(Arc::ptr_eq(&previous, &fx.coordinator.snapshot().unwrap()));
    let errors = fx.sink.errors();
    assert!(errors
        .iter()
        .any(|t| t.file.as_deref() == Some(fx.source.join("meson.build").as_path()) && t.line == Some(3)));
    assert!(errors.iter().any(|t| t.message == "Meson build: Parsing failed"));
}

#[test]
fn test_parse_without_autorun_reads_introspection_from_stdout() {
    let settings = Settings {
        autorun_meson: false,
        ..Settings::default()
    };
    let mut fx = fixture_with(INTROSPECT_DOCUMENT, settings);

    fx.coordinator.parse_project().unwrap();
    assert_eq!(fx.coordinator.wait_for_outcome(TIMEOUT).unwrap(), Outcome::ParsingCompleted(true));
    assert!(!is_setup(&fx.build));

    let commands = logged_commands(&fx.log);
    assert_eq!(
        commands,
        [format!("introspect --all {}", fx.source.join("meson.build").display())]
    );

    let snapshot = fx.coordinator.snapshot().unwrap();
    assert_eq!(snapshot.result.targets.len(), 1);
    assert_eq!(snapshot.result.targets[0].name, "app");
    assert_eq!(snapshot.result.build_options.len(), 1);
    assert!(!snapshot.result.meson_version.is_valid);
    assert!(snapshot.target_names.contains(&"app".to_string()));
}

#[test]
fn test_failed_introspect_reports_located_error_from_stderr() {
    let settings = Settings {
        autorun_meson: false,
        ..Settings::default()
    };
    let mut fx = fixture_with(FAILING_INTROSPECT, settings);

    fx.coordinator.parse_project().unwrap();
    assert_eq!(fx.coordinator.wait_for_outcome(TIMEOUT).unwrap(), Outcome::ParsingCompleted(false));
    assert!(!fx.coordinator.is_busy());
    assert!(fx.coordinator.snapshot().is_none());

    let errors = fx.sink.errors();
    let located = errors
        .iter()
        .find(|t| t.file.as_deref() == Some(fx.source.join("meson.build").as_path()))
        .expect("located error task");
    assert_eq!(located.line, Some(1));
    assert!(located.message.contains("requires >=9.0"));
}

#[test]
fn test_wipe_of_fresh_dir_passes_wipe_flag() {
    let mut fx = fixture();
    fx.coordinator.wipe().unwrap();
    assert_eq!(fx.coordinator.wait_for_outcome(TIMEOUT).unwrap(), Outcome::ParsingCompleted(true));

    let commands = logged_commands(&fx.log);
    assert_eq!(commands.len(), 1, "{:?}", commands);
    assert!(commands[0].starts_with("setup "));
    assert!(commands[0].contains("--wipe"));
    assert!(is_setup(&fx.build));
}
