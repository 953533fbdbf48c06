// src/core/settings.rs

//! # Settings
//!
//! Global user settings (`settings.toml`) and the per-invocation [`BuildConfiguration`]
//! describing which source/build directory pair the coordinator works on.

use crate::constants::DEFAULT_PROCESS_TIMEOUT;
use crate::core::paths::{self, PathError};
use crate::system::executor::Environment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading or writing configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A filesystem I/O error occurred.
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    /// The config directory could not be located or created.
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    /// The file exists but is not valid TOML for its schema.
    #[error("Failed to parse '{path}': {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// Serializing to TOML failed.
    #[error("Failed to serialize to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Unknown build type '{0}' (expected plain, debug, debugoptimized, release, minsize or custom).")]
    UnknownBuildType(String),
    #[error("Could not split meson parameters: {0}")]
    InvalidParameters(String),
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_PROCESS_TIMEOUT.as_secs()
}

/// Global behaviour switches, read from `settings.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Run `meson configure`/`setup` automatically when parsing a directory that is not set up.
    #[serde(default = "default_true")]
    pub autorun_meson: bool,
    /// Pass `-v` to Ninja.
    #[serde(default)]
    pub verbose_ninja: bool,
    #[serde(default = "default_timeout_secs")]
    pub process_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            autorun_meson: true,
            verbose_ninja: false,
            process_timeout_secs: default_timeout_secs(),
        }
    }
}

impl Settings {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    /// Loads the global settings. On first use the defaults are written out for the user to edit.
    pub fn load() -> Result<Self, ConfigError> {
        let path = paths::get_settings_path()?;
        if !path.exists() {
            let settings = Self::default();
            settings.save_to(&path)?;
            log::info!("Wrote default settings to '{}'.", path.display());
            return Ok(settings);
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No settings file at '{}', using defaults.", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Plain,
    #[default]
    Debug,
    DebugOptimized,
    Release,
    MinSize,
    Custom,
}

impl BuildType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Debug => "debug",
            Self::DebugOptimized => "debugoptimized",
            Self::Release => "release",
            Self::MinSize => "minsize",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "debug" => Ok(Self::Debug),
            "debugoptimized" => Ok(Self::DebugOptimized),
            "release" => Ok(Self::Release),
            "minsize" => Ok(Self::MinSize),
            "custom" => Ok(Self::Custom),
            _ => Err(ConfigError::UnknownBuildType(s.to_string())),
        }
    }
}

/// One source/build directory pair plus how it should be configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfiguration {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub build_type: BuildType,
    /// Free-form extra arguments for `meson setup`/`configure`, shell-quoted.
    pub parameters: String,
    pub environment: Environment,
    /// Only the active configuration reacts to external changes of the build directory.
    pub active: bool,
}

impl BuildConfiguration {
    pub fn new(source_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            build_dir: build_dir.into(),
            build_type: BuildType::default(),
            parameters: String::new(),
            environment: std::env::vars().collect(),
            active: true,
        }
    }

    /// The user parameters followed by `-Dbuildtype=<type>`.
    pub fn meson_config_args(&self) -> Result<Vec<String>, ConfigError> {
        let mut args = shlex::split(&self.parameters)
            .ok_or_else(|| ConfigError::InvalidParameters(self.parameters.clone()))?;
        args.push(format!("-Dbuildtype={}", self.build_type));
        Ok(args)
    }
}
