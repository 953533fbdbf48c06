// src/core/paths.rs

use crate::constants::{CONFIG_DIR_NAME, SETTINGS_FILENAME, TOOLS_FILENAME};
use lazy_static::lazy_static;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not create config directory at '{path}': {source}")]
    ConfigDirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to expand path '{path}': {message}")]
    Expansion { path: String, message: String },
}

/// Returns the mesonctl configuration directory (`~/.config/mesonctl`), creating it if needed.
///
/// Memoized: only the first call touches the filesystem.
pub fn get_config_dir() -> Result<PathBuf, PathError> {
    let mut cached = CONFIG_DIR.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(path) = &*cached {
        return Ok(path.clone());
    }

    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join(CONFIG_DIR_NAME);

    if !config_path.exists() {
        fs::create_dir_all(&config_path).map_err(|e| PathError::ConfigDirCreation {
            path: config_path.display().to_string(),
            source: e,
        })?;
    }

    *cached = Some(config_path.clone());
    Ok(config_path)
}

pub fn get_settings_path() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(SETTINGS_FILENAME))
}

pub fn get_tools_path() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(TOOLS_FILENAME))
}

/// Expands `~` and environment variables in a user-supplied executable path.
pub fn expand_user_path(raw: &str) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(raw).map_err(|e| PathError::Expansion {
        path: raw.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Lexically normalizes a path: drops `.` components and folds `..` into its parent.
///
/// Never touches the filesystem, so it works on paths that do not exist (yet).
pub fn clean_path(path: impl AsRef<Path>) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Renders a relative path with `/` separators regardless of platform.
pub fn to_slash_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves `path` against `base` when it is relative, then cleans it.
pub fn absolute_from(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        clean_path(path)
    } else {
        clean_path(base.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path_folds_dots() {
        assert_eq!(clean_path("/a/./b/../c"), PathBuf::from("/a/c"));
        assert_eq!(clean_path("./x/y/"), PathBuf::from("x/y"));
        assert_eq!(clean_path("../x"), PathBuf::from("../x"));
        assert_eq!(clean_path("/.."), PathBuf::from("/"));
    }

    #[test]
    fn test_to_slash_string_on_relative_paths() {
        assert_eq!(to_slash_string(Path::new("a/b/c")), "a/b/c");
        assert_eq!(to_slash_string(Path::new("./a")), "a");
    }

    #[test]
    fn test_absolute_from() {
        let base = Path::new("/src");
        assert_eq!(absolute_from(base, Path::new("sub/meson.build")), PathBuf::from("/src/sub/meson.build"));
        assert_eq!(absolute_from(base, Path::new("/other/x")), PathBuf::from("/other/x"));
    }
}
