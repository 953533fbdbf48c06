// src/constants.rs

use std::time::Duration;

/// The directory (inside a build directory) where Meson writes its introspection files.
pub const MESON_INFO_DIR: &str = "meson-info";

/// Written last by Meson on every successful run, which makes it a safe completion signal.
pub const MESON_INFO: &str = "meson-info.json";

pub const MESON_INTRO_TARGETS: &str = "intro-targets.json";
pub const MESON_INTRO_BUILDOPTIONS: &str = "intro-buildoptions.json";
pub const MESON_INTRO_BUILDSYSTEM_FILES: &str = "intro-buildsystem_files.json";
pub const MESON_INTRO_PROJECTINFO: &str = "intro-projectinfo.json";
pub const MESON_INTRO_TESTS: &str = "intro-tests.json";
pub const MESON_INTRO_INSTALLED: &str = "intro-installed.json";
pub const MESON_INTRO_BENCHMARKS: &str = "intro-benchmarks.json";
pub const MESON_INTRO_DEPENDENCIES: &str = "intro-dependencies.json";

/// Every one of these must exist under `<build>/meson-info/` for a directory to count as set up.
pub const SETUP_MARKER_FILES: [&str; 8] = [
    MESON_INTRO_TESTS,
    MESON_INTRO_TARGETS,
    MESON_INTRO_INSTALLED,
    MESON_INTRO_BENCHMARKS,
    MESON_INTRO_BUILDOPTIONS,
    MESON_INTRO_PROJECTINFO,
    MESON_INTRO_DEPENDENCIES,
    MESON_INTRO_BUILDSYSTEM_FILES,
];

pub const MESON_BUILD_FILE: &str = "meson.build";
pub const MESON_OPTIONS_FILES: [&str; 2] = ["meson_options.txt", "meson.options"];

/// The backend name passed to `meson --internal regenerate`.
pub const BACKEND_NAME: &str = "ninja";

/// Targets the backend always understands, independently of the project.
pub const BUILTIN_BUILD_TARGETS: [&str; 6] =
    ["all", "clean", "install", "benchmark", "scan-build", "test"];

pub const DEFAULT_BUILD_TARGET: &str = "all";

/// Name of the directory (under the system config dir) holding mesonctl's files.
pub const CONFIG_DIR_NAME: &str = "mesonctl";
pub const SETTINGS_FILENAME: &str = "settings.toml";
pub const TOOLS_FILENAME: &str = "tools.toml";

/// How long a generator/backend process may run before it is deemed stuck.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(600);

/// Polling period of the process supervisor loop.
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Polling period of the `meson-info.json` watcher.
pub const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(500);
