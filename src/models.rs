// src/models.rs

use crate::core::build_options::BuildOption;
use crate::core::paths::{clean_path, to_slash_string};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap();
}

// --- VERSIONS ---

/// A `major.minor.patch` version as reported by a tool or recorded in `meson-info.json`.
///
/// An unparsable version is represented by `is_valid == false`, never by an error.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub is_valid: bool,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            is_valid: true,
        }
    }

    /// Extracts the first `major.minor.patch` triple found in `text`.
    pub fn parse(text: &str) -> Self {
        let Some(caps) = VERSION_RE.captures(text) else {
            return Self::default();
        };
        let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        match (field(1), field(2), field(3)) {
            (Some(major), Some(minor), Some(patch)) => Self::new(major, minor, patch),
            _ => Self::default(),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        } else {
            f.write_str("<invalid>")
        }
    }
}

// --- TARGETS ---

/// The kind of a build target. Derived from Meson's `type` string through a closed mapping.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum TargetType {
    Executable,
    StaticLibrary,
    SharedLibrary,
    SharedModule,
    Custom,
    Run,
    Jar,
    #[default]
    Unknown,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executable => "executable",
            Self::StaticLibrary => "static library",
            Self::SharedLibrary => "shared library",
            Self::SharedModule => "shared module",
            Self::Custom => "custom",
            Self::Run => "run",
            Self::Jar => "jar",
            Self::Unknown => "unknown",
        }
    }
}

impl From<&str> for TargetType {
    fn from(raw: &str) -> Self {
        match raw {
            "executable" => Self::Executable,
            "static library" => Self::StaticLibrary,
            "shared library" => Self::SharedLibrary,
            "shared module" => Self::SharedModule,
            "custom" => Self::Custom,
            "run" => Self::Run,
            "jar" => Self::Jar,
            _ => Self::Unknown,
        }
    }
}

impl From<String> for TargetType {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<TargetType> for String {
    fn from(kind: TargetType) -> Self {
        kind.as_str().to_string()
    }
}

/// The sources of one target compiled by one compiler for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceGroup {
    pub language: String,
    /// Argv of the compiler; the first element is the compiler executable.
    pub compiler: Vec<String>,
    pub parameters: Vec<String>,
    pub sources: Vec<PathBuf>,
    pub generated_sources: Vec<PathBuf>,
}

impl SourceGroup {
    pub fn new(
        language: String,
        compiler: Vec<String>,
        parameters: Vec<String>,
        sources: Vec<String>,
        generated_sources: Vec<String>,
    ) -> Self {
        Self {
            language,
            compiler,
            parameters,
            sources: sources.iter().map(clean_path).collect(),
            generated_sources: generated_sources.iter().map(clean_path).collect(),
        }
    }

    /// The compiler executable recorded by the generator, if any.
    pub fn compiler_path(&self) -> Option<&str> {
        self.compiler.first().map(String::as_str)
    }
}

/// One build target as described by `intro-targets.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub target_type: TargetType,
    pub name: String,
    pub id: String,
    /// The `meson.build` file declaring this target.
    pub defined_in: PathBuf,
    /// Output paths; the first one is the primary artifact.
    pub file_name: Vec<PathBuf>,
    pub extra_files: Vec<PathBuf>,
    pub subproject: Option<String>,
    pub sources: Vec<SourceGroup>,
}

impl Target {
    pub fn new(
        target_type: TargetType,
        name: String,
        id: String,
        defined_in: &str,
        file_name: Vec<String>,
        extra_files: Vec<String>,
        subproject: Option<String>,
        sources: Vec<SourceGroup>,
    ) -> Self {
        Self {
            target_type,
            name,
            id,
            defined_in: clean_path(defined_in),
            file_name: file_name.iter().map(clean_path).collect(),
            extra_files: extra_files.iter().map(clean_path).collect(),
            subproject,
            sources,
        }
    }

    /// The directory holding the `meson.build` that defines this target.
    pub fn defined_in_dir(&self) -> &Path {
        self.defined_in.parent().unwrap_or(Path::new(""))
    }

    /// The canonical name of this target as understood by the backend (its build key).
    ///
    /// Absolute outputs below `build_dir` lose that prefix exactly once; other absolute
    /// outputs fall back to [`Self::relative_display_name`]. Relative outputs are kept.
    pub fn full_name(&self, build_dir: &Path) -> String {
        let Some(output) = self.file_name.first() else {
            return self.name.clone();
        };
        if !output.is_absolute() {
            return to_slash_string(output);
        }
        let build_dir = clean_path(build_dir);
        match output.strip_prefix(&build_dir) {
            Ok(relative) if relative.as_os_str().is_empty() => self.name.clone(),
            Ok(relative) => to_slash_string(relative),
            Err(_) => self.relative_display_name(output),
        }
    }

    /// Shortest relative name for an output that does not live under the build directory.
    ///
    /// Walks the defining directory and the output directory from their ends; the directory
    /// names they share there are the part of the path the output mirrors from the source
    /// tree, and are kept in front of the file name.
    fn relative_display_name(&self, output: &Path) -> String {
        let file = output
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let defined: Vec<_> = self.defined_in_dir().components().collect();
        let produced: Vec<_> = output
            .parent()
            .map(|p| p.components().collect())
            .unwrap_or_default();

        let shared: Vec<String> = defined
            .iter()
            .rev()
            .zip(produced.iter().rev())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.as_os_str().to_string_lossy().into_owned())
            .filter(|c| c != "/")
            .collect();

        let mut parts: Vec<String> = shared.into_iter().rev().collect();
        parts.push(file);
        parts.join("/")
    }
}

/// An executable target that can be launched after a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationTarget {
    pub name: String,
    pub build_key: String,
    pub executable: PathBuf,
}

// --- PROJECT INFO ---

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SubprojectInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub descriptive_name: String,
}

/// The content of `intro-projectinfo.json`, minus the build-system file lists.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectInfo {
    #[serde(default)]
    pub descriptive_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub subprojects: Vec<SubprojectInfo>,
}

// --- PARSE RESULT ---

/// Everything one introspection pass extracted. Built fresh on every parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    pub targets: Vec<Target>,
    pub build_options: Vec<BuildOption>,
    /// Build-system files of the project and of every nested subproject.
    pub build_system_files: Vec<PathBuf>,
    pub meson_version: Version,
    pub project_info: Option<ProjectInfo>,
}

impl ParseResult {
    /// Executable targets with the path the backend produces them at.
    pub fn application_targets(&self, build_dir: &Path) -> Vec<ApplicationTarget> {
        self.targets
            .iter()
            .filter(|t| t.target_type == TargetType::Executable)
            .filter_map(|t| {
                let output = t.file_name.first()?;
                let executable = if output.is_absolute() {
                    output.clone()
                } else {
                    build_dir.join(output)
                };
                Some(ApplicationTarget {
                    name: t.name.clone(),
                    build_key: t.full_name(build_dir),
                    executable,
                })
            })
            .collect()
    }
}

// --- KIT ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QtMajorVersion {
    #[default]
    None,
    Qt4,
    Qt5,
    Qt6,
}

/// What the toolchain provider knows about the active kit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KitData {
    pub c_compiler_path: Option<PathBuf>,
    pub cxx_compiler_path: Option<PathBuf>,
    pub qt_version: QtMajorVersion,
    /// Machine file generated for this kit, handed to Meson as `--native-file`.
    pub machine_file: Option<PathBuf>,
}

// --- TASKS (error reports) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    /// Generator runs, tool lookup and introspection.
    BuildSystem,
    /// Backend (compile) runs.
    Compile,
}

/// A structured error/warning report handed to the task sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSystemTask {
    pub kind: TaskKind,
    pub category: TaskCategory,
    pub message: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
}

impl BuildSystemTask {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: TaskKind::Error,
            category: TaskCategory::BuildSystem,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: TaskKind::Warning,
            ..Self::error(message)
        }
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = category;
        self
    }

    pub fn at(mut self, file: PathBuf, line: Option<u32>) -> Self {
        self.file = Some(file);
        self.line = line;
        self
    }
}
