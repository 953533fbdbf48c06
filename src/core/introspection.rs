// src/core/introspection.rs

//! Reads Meson's JSON introspection output into a [`ParseResult`].
//!
//! Two equivalent sources are supported: the `meson-info/` directory of a configured build
//! directory, and the single document printed by `meson introspect --all`. Broken or missing
//! facets degrade to empty lists; only a document that is not JSON at all is an error.

use crate::constants::{
    MESON_INFO, MESON_INFO_DIR, MESON_INTRO_BUILDOPTIONS, MESON_INTRO_BUILDSYSTEM_FILES,
    MESON_INTRO_PROJECTINFO, MESON_INTRO_TARGETS,
};
use crate::core::build_options::BuildOption;
use crate::core::paths::clean_path;
use crate::models::{ParseResult, ProjectInfo, SourceGroup, SubprojectInfo, Target, TargetType, Version};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntrospectionError {
    #[error("Introspection output is not valid JSON: {0}")]
    MalformedDocument(#[from] serde_json::Error),
    #[error("Introspection output is not a JSON object.")]
    NotAnObject,
}

// --- Wire shapes ---

#[derive(Deserialize, Debug)]
struct RawSourceGroup {
    language: Option<String>,
    #[serde(default)]
    compiler: Vec<String>,
    #[serde(default)]
    parameters: Vec<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    generated_sources: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct RawTarget {
    name: String,
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    target_type: String,
    #[serde(default)]
    defined_in: String,
    #[serde(default)]
    filename: Vec<String>,
    #[serde(default)]
    extra_files: Vec<String>,
    #[serde(default)]
    subproject: Option<String>,
    #[serde(default)]
    target_sources: Vec<Value>,
}

impl From<RawTarget> for Target {
    fn from(raw: RawTarget) -> Self {
        // Newer Meson versions mix linker entries (no language) into target_sources.
        let sources = raw
            .target_sources
            .into_iter()
            .filter_map(|group| serde_json::from_value::<RawSourceGroup>(group).ok())
            .filter_map(|group| {
                let language = group.language?;
                Some(SourceGroup::new(
                    language,
                    group.compiler,
                    group.parameters,
                    group.sources,
                    group.generated_sources,
                ))
            })
            .collect();
        Target::new(
            TargetType::from(raw.target_type.as_str()),
            raw.name,
            raw.id,
            &raw.defined_in,
            raw.filename,
            raw.extra_files,
            raw.subproject.filter(|s| !s.is_empty()),
            sources,
        )
    }
}

#[derive(Deserialize, Debug, Default)]
struct RawSubproject {
    #[serde(flatten)]
    info: SubprojectInfo,
    #[serde(default)]
    buildsystem_files: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
struct RawProjectInfo {
    #[serde(default)]
    descriptive_name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    buildsystem_files: Vec<String>,
    #[serde(default)]
    subprojects: Vec<RawSubproject>,
}

#[derive(Deserialize, Debug)]
struct RawVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

#[derive(Deserialize, Debug)]
struct RawMesonInfo {
    meson_version: RawVersion,
}

// --- Entry points ---

/// Parses the introspection files of a configured build directory.
pub fn parse_build_dir(build_dir: &Path) -> ParseResult {
    let info_dir = build_dir.join(MESON_INFO_DIR);
    log::debug!("Parsing introspection files in '{}'.", info_dir.display());

    let targets = read_json(&info_dir.join(MESON_INTRO_TARGETS));
    let options = read_json(&info_dir.join(MESON_INTRO_BUILDOPTIONS));
    let files = read_json(&info_dir.join(MESON_INTRO_BUILDSYSTEM_FILES));
    let project = read_json(&info_dir.join(MESON_INTRO_PROJECTINFO));

    let project = parse_project_info(project.as_ref());
    let mut build_system_files = parse_items::<String>(files.as_ref(), MESON_INTRO_BUILDSYSTEM_FILES);
    build_system_files.extend(subproject_files(&project));

    ParseResult {
        targets: parse_targets(targets.as_ref()),
        build_options: parse_build_options(options.as_ref()),
        build_system_files: dedup_paths(build_system_files),
        meson_version: read_meson_info(build_dir),
        project_info: project.map(into_project_info),
    }
}

/// Parses the document printed by `meson introspect --all`.
///
/// The document does not carry the generator version, so `meson_version` stays invalid.
pub fn parse_document(data: &[u8]) -> Result<ParseResult, IntrospectionError> {
    let root: Value = serde_json::from_slice(data)?;
    if !root.is_object() {
        return Err(IntrospectionError::NotAnObject);
    }

    let project = parse_project_info(root.get("projectinfo"));
    let mut build_system_files = match root.get("buildsystem_files") {
        Some(files) => parse_items::<String>(Some(files), "buildsystem_files"),
        None => project
            .as_ref()
            .map(|p| p.buildsystem_files.clone())
            .unwrap_or_default(),
    };
    build_system_files.extend(subproject_files(&project));

    Ok(ParseResult {
        targets: parse_targets(root.get("targets")),
        build_options: parse_build_options(root.get("buildoptions")),
        build_system_files: dedup_paths(build_system_files),
        meson_version: Version::default(),
        project_info: project.map(into_project_info),
    })
}

/// Path of the file Meson writes last on every successful run.
pub fn meson_info_path(build_dir: &Path) -> PathBuf {
    build_dir.join(MESON_INFO_DIR).join(MESON_INFO)
}

/// The generator version recorded in `meson-info.json`; invalid if it cannot be read.
pub fn read_meson_info(build_dir: &Path) -> Version {
    let Some(value) = read_json(&meson_info_path(build_dir)) else {
        return Version::default();
    };
    match serde_json::from_value::<RawMesonInfo>(value) {
        Ok(info) => Version::new(
            info.meson_version.major,
            info.meson_version.minor,
            info.meson_version.patch,
        ),
        Err(e) => {
            log::warn!("'{}' has no usable meson_version: {}", MESON_INFO, e);
            Version::default()
        }
    }
}

// --- Facets ---

fn parse_targets(value: Option<&Value>) -> Vec<Target> {
    parse_items::<RawTarget>(value, "targets")
        .into_iter()
        .map(Target::from)
        .collect()
}

fn parse_build_options(value: Option<&Value>) -> Vec<BuildOption> {
    let Some(items) = value.and_then(Value::as_array) else {
        if value.is_some() {
            log::warn!("Ignoring build options: expected a JSON array.");
        }
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let option = BuildOption::from_json(item);
            if option.is_none() {
                log::warn!("Skipping malformed build option: {}", item);
            }
            option
        })
        .collect()
}

fn parse_project_info(value: Option<&Value>) -> Option<RawProjectInfo> {
    let value = value?;
    match serde_json::from_value::<RawProjectInfo>(value.clone()) {
        Ok(info) => Some(info),
        Err(e) => {
            log::warn!("Ignoring malformed project info: {}", e);
            None
        }
    }
}

fn subproject_files(project: &Option<RawProjectInfo>) -> Vec<String> {
    project
        .iter()
        .flat_map(|p| p.subprojects.iter())
        .flat_map(|s| s.buildsystem_files.iter().cloned())
        .collect()
}

fn into_project_info(raw: RawProjectInfo) -> ProjectInfo {
    ProjectInfo {
        descriptive_name: raw.descriptive_name,
        version: raw.version,
        subprojects: raw.subprojects.into_iter().map(|s| s.info).collect(),
    }
}

/// Deserializes every element of a JSON array independently, skipping the broken ones.
fn parse_items<T: DeserializeOwned>(value: Option<&Value>, facet: &str) -> Vec<T> {
    let Some(value) = value else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        log::warn!("Ignoring '{}': expected a JSON array.", facet);
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::warn!("Skipping malformed entry in '{}': {}", facet, e);
                None
            }
        })
        .collect()
}

fn dedup_paths(files: Vec<String>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .map(clean_path)
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

fn read_json(path: &Path) -> Option<Value> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Could not read '{}': {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_slice(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("'{}' is not valid JSON: {}", path.display(), e);
            None
        }
    }
}
