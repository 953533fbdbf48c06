// src/system/tool_wrapper.rs

use crate::constants::{BACKEND_NAME, MESON_BUILD_FILE, MESON_INFO_DIR, SETUP_MARKER_FILES};
use crate::models::Version;
use crate::system::command::Command;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};
use thiserror::Error;
use uuid::Uuid;

/// Which external program a [`ToolWrapper`] drives.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// The build generator.
    Meson,
    /// The build backend.
    Ninja,
}

impl ToolKind {
    /// Executable names searched on `PATH` during auto-detection, in order of preference.
    pub fn executable_names(self) -> &'static [&'static str] {
        match self {
            Self::Meson => &["meson", "meson.py"],
            Self::Ninja => &["ninja", "ninja-build"],
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meson => f.write_str("meson"),
            Self::Ninja => f.write_str("ninja"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool '{name}' is a {actual} tool but '{operation}' requires {expected}.")]
    WrongKind {
        name: String,
        operation: &'static str,
        expected: ToolKind,
        actual: ToolKind,
    },
}

/// Wraps one external executable (Meson or Ninja) and builds the command lines for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolWrapper {
    id: Uuid,
    kind: ToolKind,
    name: String,
    exe: PathBuf,
    auto_detected: bool,
    version: Version,
}

impl ToolWrapper {
    /// Creates a wrapper with a fresh id, probing the executable's version.
    pub fn new(kind: ToolKind, name: impl Into<String>, exe: impl Into<PathBuf>, auto_detected: bool) -> Self {
        Self::with_id(kind, name, exe, None, auto_detected)
    }

    /// Like [`Self::new`], keeping `id` when one is given.
    pub fn with_id(
        kind: ToolKind,
        name: impl Into<String>,
        exe: impl Into<PathBuf>,
        id: Option<Uuid>,
        auto_detected: bool,
    ) -> Self {
        let exe = exe.into();
        let version = Self::read_version(&exe);
        Self::from_parts(id.unwrap_or_else(Uuid::new_v4), kind, name, exe, auto_detected, version)
    }

    /// Assembles a wrapper from already-known parts, without touching the executable.
    pub fn from_parts(
        id: Uuid,
        kind: ToolKind,
        name: impl Into<String>,
        exe: impl Into<PathBuf>,
        auto_detected: bool,
        version: Version,
    ) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            exe: exe.into(),
            auto_detected,
            version,
        }
    }

    /// Locates the first of `kind`'s executable names on `PATH`.
    pub fn find_tool(kind: ToolKind) -> Option<PathBuf> {
        kind.executable_names()
            .iter()
            .find_map(|name| which::which(name).ok())
    }

    /// Runs `<exe> --version` and extracts `major.minor.patch` from the first stdout line.
    ///
    /// Any failure (missing binary, crash, garbage output) yields an invalid version.
    pub fn read_version(exe: &Path) -> Version {
        if !exe.exists() {
            return Version::default();
        }
        let output = match StdCommand::new(exe)
            .arg("--version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                log::debug!("Could not probe version of '{}': {}", exe.display(), e);
                return Version::default();
            }
        };
        let first_line = output.stdout.as_slice().lines().next().and_then(Result::ok).unwrap_or_default();
        let version = Version::parse(&first_line);
        log::debug!("'{}' reports version {}", exe.display(), version);
        version
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    pub fn auto_detected(&self) -> bool {
        self.auto_detected
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Points the wrapper at a new executable and re-probes its version.
    pub fn set_exe(&mut self, exe: impl Into<PathBuf>) {
        self.exe = exe.into();
        self.version = Self::read_version(&self.exe);
    }

    pub fn is_valid(&self) -> bool {
        self.exe.exists() && self.version.is_valid
    }

    fn require(&self, expected: ToolKind, operation: &'static str) -> Result<(), ToolError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(ToolError::WrongKind {
                name: self.name.clone(),
                operation,
                expected,
                actual: self.kind,
            })
        }
    }

    // --- Generator command lines ---

    /// `meson setup <options> <src> <build>`, run from the source directory.
    pub fn setup(&self, source_dir: &Path, build_dir: &Path, options: &[String]) -> Result<Command, ToolError> {
        self.require(ToolKind::Meson, "setup")?;
        let mut args = vec!["setup".to_string()];
        args.extend(options.iter().cloned());
        args.push(path_arg(source_dir));
        args.push(path_arg(build_dir));
        Ok(Command::new(&self.exe, source_dir, args))
    }

    /// `meson configure <options> <build>`, or [`Self::setup`] if `build_dir` is not set up yet.
    pub fn configure(&self, source_dir: &Path, build_dir: &Path, options: &[String]) -> Result<Command, ToolError> {
        self.require(ToolKind::Meson, "configure")?;
        if !is_setup(build_dir) {
            return self.setup(source_dir, build_dir, options);
        }
        let mut args = vec!["configure".to_string()];
        args.extend(options.iter().cloned());
        args.push(path_arg(build_dir));
        Ok(Command::new(&self.exe, build_dir, args))
    }

    /// `meson --internal regenerate <src> <build> --backend ninja`.
    pub fn regenerate(&self, source_dir: &Path, build_dir: &Path) -> Result<Command, ToolError> {
        self.require(ToolKind::Meson, "regenerate")?;
        let args = vec![
            "--internal".to_string(),
            "regenerate".to_string(),
            path_arg(source_dir),
            path_arg(build_dir),
            "--backend".to_string(),
            BACKEND_NAME.to_string(),
        ];
        Ok(Command::new(&self.exe, build_dir, args))
    }

    /// `meson introspect --all <src>/meson.build`; the whole stdout is the JSON payload.
    pub fn introspect(&self, source_dir: &Path) -> Result<Command, ToolError> {
        self.require(ToolKind::Meson, "introspect")?;
        let args = vec![
            "introspect".to_string(),
            "--all".to_string(),
            path_arg(&source_dir.join(MESON_BUILD_FILE)),
        ];
        Ok(Command::new(&self.exe, source_dir, args))
    }

    // --- Backend command lines ---

    /// `ninja [-v] <target>`, run from the build directory.
    pub fn compile(&self, build_dir: &Path, target: &str, verbose: bool) -> Result<Command, ToolError> {
        self.require(ToolKind::Ninja, "compile")?;
        let mut args = Vec::new();
        if verbose {
            args.push("-v".to_string());
        }
        args.push(target.to_string());
        Ok(Command::new(&self.exe, build_dir, args))
    }
}

/// True iff every introspection marker file exists under `<build_dir>/meson-info/`.
pub fn is_setup(build_dir: &Path) -> bool {
    let info_dir = build_dir.join(MESON_INFO_DIR);
    SETUP_MARKER_FILES
        .iter()
        .all(|file| info_dir.join(file).is_file())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn meson() -> ToolWrapper {
        ToolWrapper::from_parts(
            Uuid::new_v4(),
            ToolKind::Meson,
            "meson",
            "/usr/bin/meson",
            false,
            Version::new(1, 4, 0),
        )
    }

    fn make_setup(build_dir: &Path) {
        let info = build_dir.join(MESON_INFO_DIR);
        fs::create_dir_all(&info).unwrap();
        for file in SETUP_MARKER_FILES {
            fs::write(info.join(file), "[]").unwrap();
        }
    }

    #[test]
    fn test_is_setup_requires_all_markers() {
        let build = TempDir::new().unwrap();
        assert!(!is_setup(build.path()));

        make_setup(build.path());
        assert!(is_setup(build.path()));

        for file in SETUP_MARKER_FILES {
            let marker = build.path().join(MESON_INFO_DIR).join(file);
            fs::remove_file(&marker).unwrap();
            assert!(!is_setup(build.path()), "{} should be required", file);
            fs::write(&marker, "[]").unwrap();
        }
    }

    #[test]
    fn test_setup_argv() {
        let cmd = meson()
            .setup(Path::new("/src"), Path::new("/build"), &["-Dfoo=1".to_string()])
            .unwrap();
        assert_eq!(cmd.args(), ["setup", "-Dfoo=1", "/src", "/build"]);
        assert_eq!(cmd.work_dir(), Path::new("/src"));
    }

    #[test]
    fn test_configure_falls_back_to_setup() {
        let build = TempDir::new().unwrap();
        let cmd = meson().configure(Path::new("/src"), build.path(), &[]).unwrap();
        assert_eq!(cmd.args().first().map(String::as_str), Some("setup"));

        make_setup(build.path());
        let cmd = meson()
            .configure(Path::new("/src"), build.path(), &["-Dx=y".to_string()])
            .unwrap();
        assert_eq!(
            cmd.args(),
            ["configure".to_string(), "-Dx=y".to_string(), build.path().to_string_lossy().into_owned()]
        );
        assert_eq!(cmd.work_dir(), build.path());
    }

    #[test]
    fn test_regenerate_and_introspect_argv() {
        let regen = meson().regenerate(Path::new("/src"), Path::new("/build")).unwrap();
        assert_eq!(
            regen.args(),
            ["--internal", "regenerate", "/src", "/build", "--backend", "ninja"]
        );
        let intro = meson().introspect(Path::new("/src")).unwrap();
        assert_eq!(intro.args(), ["introspect", "--all", "/src/meson.build"]);
    }

    #[test]
    fn test_kind_is_checked() {
        let ninja = ToolWrapper::from_parts(
            Uuid::new_v4(),
            ToolKind::Ninja,
            "ninja",
            "/usr/bin/ninja",
            true,
            Version::new(1, 11, 1),
        );
        let cmd = ninja.compile(Path::new("/build"), "all", true).unwrap();
        assert_eq!(cmd.args(), ["-v", "all"]);
        assert!(matches!(
            ninja.setup(Path::new("/s"), Path::new("/b"), &[]),
            Err(ToolError::WrongKind { .. })
        ));
        assert!(meson().compile(Path::new("/b"), "all", false).is_err());
    }

    #[test]
    fn test_missing_executable_has_invalid_version() {
        let tool = ToolWrapper::new(ToolKind::Meson, "ghost", "/definitely/not/here/meson", false);
        assert!(!tool.version().is_valid);
        assert!(!tool.is_valid());
    }
}
