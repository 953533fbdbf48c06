// src/core/kit.rs

use crate::models::{KitData, QtMajorVersion};
use std::path::PathBuf;

/// Supplies the toolchain the project is supposed to be built with.
pub trait KitProvider: Send + Sync {
    fn kit_data(&self) -> KitData;
}

/// Resolves compilers the way a shell build would: `$CC`/`$CXX`, else `cc`/`c++` on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentKit {
    /// Optional machine file handed to Meson as `--native-file`.
    pub machine_file: Option<PathBuf>,
}

impl EnvironmentKit {
    pub fn new(machine_file: Option<PathBuf>) -> Self {
        Self { machine_file }
    }
}

impl KitProvider for EnvironmentKit {
    fn kit_data(&self) -> KitData {
        KitData {
            c_compiler_path: resolve_compiler("CC", "cc"),
            cxx_compiler_path: resolve_compiler("CXX", "c++"),
            qt_version: QtMajorVersion::None,
            machine_file: self.machine_file.clone(),
        }
    }
}

/// A fixed kit, mostly useful in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticKit(pub KitData);

impl KitProvider for StaticKit {
    fn kit_data(&self) -> KitData {
        self.0.clone()
    }
}

fn resolve_compiler(variable: &str, fallback: &str) -> Option<PathBuf> {
    let requested = std::env::var(variable)
        .ok()
        .and_then(|value| shlex::split(&value))
        .and_then(|argv| argv.into_iter().next())
        .unwrap_or_else(|| fallback.to_string());
    let resolved = which::which(&requested).ok();
    if resolved.is_none() {
        log::debug!("Compiler '{}' (from ${}) not found on PATH.", requested, variable);
    }
    resolved
}
