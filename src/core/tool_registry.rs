// src/core/tool_registry.rs

//! # Tool Registry
//!
//! Owns every known Meson/Ninja executable. Persisted as `tools.toml`:
//!
//! ```toml
//! [[tools]]
//! id = "6f1c..."
//! kind = "meson"
//! name = "System Meson"
//! exe = "~/.local/bin/meson"
//! auto_detected = false
//! ```

use crate::core::paths::expand_user_path;
use crate::system::tool_wrapper::{ToolKind, ToolWrapper};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse tools file '{path}': {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Path error: {0}")]
    Path(#[from] crate::core::paths::PathError),
    #[error("No tool with id '{0}' is registered.")]
    NotFound(Uuid),
    #[error("A tool with id '{0}' is already registered.")]
    DuplicateId(Uuid),
}

/// Change notifications delivered to registry listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(Uuid),
    Updated(Uuid),
    Removed(Uuid),
}

pub type RegistryListener = Box<dyn Fn(RegistryEvent) + Send + Sync>;

/// The registry as handed to coordinators.
pub type SharedToolRegistry = Arc<RwLock<ToolRegistry>>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct ToolEntry {
    id: Uuid,
    kind: ToolKind,
    name: String,
    exe: String,
    #[serde(default)]
    auto_detected: bool,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ToolsFile {
    #[serde(default)]
    tools: Vec<ToolEntry>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolWrapper>,
    listeners: Vec<RegistryListener>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedToolRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn tools(&self) -> &[ToolWrapper] {
        &self.tools
    }

    pub fn on_change(&mut self, listener: RegistryListener) {
        self.listeners.push(listener);
    }

    fn notify(&self, event: RegistryEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    pub fn add(&mut self, tool: ToolWrapper) -> Result<Uuid, RegistryError> {
        let id = tool.id();
        if self.find(id).is_some() {
            return Err(RegistryError::DuplicateId(id));
        }
        log::debug!("Registering {} tool '{}' ({}).", tool.kind(), tool.name(), tool.exe().display());
        self.tools.push(tool);
        self.notify(RegistryEvent::Added(id));
        Ok(id)
    }

    /// Renames a tool and/or points it at a new executable (re-probing its version).
    pub fn update(&mut self, id: Uuid, name: Option<&str>, exe: Option<&Path>) -> Result<(), RegistryError> {
        let tool = self
            .tools
            .iter_mut()
            .find(|t| t.id() == id)
            .ok_or(RegistryError::NotFound(id))?;
        if let Some(name) = name {
            tool.set_name(name);
        }
        if let Some(exe) = exe {
            tool.set_exe(exe);
        }
        self.notify(RegistryEvent::Updated(id));
        Ok(())
    }

    pub fn remove(&mut self, id: Uuid) -> Result<ToolWrapper, RegistryError> {
        let position = self
            .tools
            .iter()
            .position(|t| t.id() == id)
            .ok_or(RegistryError::NotFound(id))?;
        let removed = self.tools.remove(position);
        self.notify(RegistryEvent::Removed(id));
        Ok(removed)
    }

    pub fn find(&self, id: Uuid) -> Option<&ToolWrapper> {
        self.tools.iter().find(|t| t.id() == id)
    }

    pub fn meson(&self, id: Option<Uuid>) -> Option<&ToolWrapper> {
        self.tool_of_kind(ToolKind::Meson, id)
    }

    pub fn ninja(&self, id: Option<Uuid>) -> Option<&ToolWrapper> {
        self.tool_of_kind(ToolKind::Ninja, id)
    }

    /// A specific tool if `id` is given, else the first auto-detected one, else the first one.
    fn tool_of_kind(&self, kind: ToolKind, id: Option<Uuid>) -> Option<&ToolWrapper> {
        if let Some(id) = id {
            return self.find(id).filter(|t| t.kind() == kind);
        }
        self.tools
            .iter()
            .find(|t| t.kind() == kind && t.auto_detected())
            .or_else(|| self.tools.iter().find(|t| t.kind() == kind))
    }

    /// Registers every Meson and Ninja found on `PATH` that is not registered yet.
    pub fn auto_detect(&mut self) -> Vec<Uuid> {
        let mut added = Vec::new();
        for kind in [ToolKind::Meson, ToolKind::Ninja] {
            let Some(exe) = ToolWrapper::find_tool(kind) else {
                log::debug!("No {} executable found on PATH.", kind);
                continue;
            };
            if self.tools.iter().any(|t| t.kind() == kind && t.exe() == exe) {
                continue;
            }
            let tool = ToolWrapper::new(kind, format!("System {} at {}", kind, exe.display()), exe, true);
            if let Ok(id) = self.add(tool) {
                added.push(id);
            }
        }
        added
    }

    /// Loads `tools.toml`; a missing file yields an empty registry.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        if !path.exists() {
            return Ok(registry);
        }
        let content = fs::read_to_string(path)?;
        let file: ToolsFile = toml::from_str(&content).map_err(|e| RegistryError::TomlParse {
            path: path.display().to_string(),
            source: e,
        })?;
        for entry in file.tools {
            let exe = expand_user_path(&entry.exe)?;
            let tool = ToolWrapper::with_id(entry.kind, entry.name, exe, Some(entry.id), entry.auto_detected);
            if let Err(e) = registry.add(tool) {
                log::warn!("Ignoring entry in '{}': {}", path.display(), e);
            }
        }
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let file = ToolsFile {
            tools: self
                .tools
                .iter()
                .map(|t| ToolEntry {
                    id: t.id(),
                    kind: t.kind(),
                    name: t.name().to_string(),
                    exe: t.exe().to_string_lossy().into_owned(),
                    auto_detected: t.auto_detected(),
                })
                .collect(),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Loads the user's registry from the config directory.
    pub fn load_default() -> Result<Self, RegistryError> {
        Self::load(&default_tools_path()?)
    }

    pub fn save_default(&self) -> Result<(), RegistryError> {
        self.save(&default_tools_path()?)
    }
}

fn default_tools_path() -> Result<PathBuf, RegistryError> {
    Ok(crate::core::paths::get_tools_path()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Version;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn tool(kind: ToolKind, name: &str, auto_detected: bool) -> ToolWrapper {
        ToolWrapper::from_parts(
            Uuid::new_v4(),
            kind,
            name,
            format!("/opt/{}", name),
            auto_detected,
            Version::new(1, 0, 0),
        )
    }

    #[test]
    fn test_add_update_remove_notify_listeners() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        let seen = events.clone();
        registry.on_change(Box::new(move |e| seen.lock().unwrap().push(e)));

        let id = registry.add(tool(ToolKind::Meson, "meson", false)).unwrap();
        registry.update(id, Some("renamed"), None).unwrap();
        assert_eq!(registry.find(id).unwrap().name(), "renamed");
        registry.remove(id).unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            [RegistryEvent::Added(id), RegistryEvent::Updated(id), RegistryEvent::Removed(id)]
        );
        assert!(matches!(registry.remove(id), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let mut registry = ToolRegistry::new();
        let meson = tool(ToolKind::Meson, "meson", false);
        registry.add(meson.clone()).unwrap();
        assert!(matches!(registry.add(meson), Err(RegistryError::DuplicateId(_))));
    }

    #[test]
    fn test_default_tool_prefers_auto_detected() {
        let mut registry = ToolRegistry::new();
        let manual = registry.add(tool(ToolKind::Meson, "manual", false)).unwrap();
        assert_eq!(registry.meson(None).unwrap().id(), manual);

        let detected = registry.add(tool(ToolKind::Meson, "detected", true)).unwrap();
        let ninja = registry.add(tool(ToolKind::Ninja, "ninja", false)).unwrap();
        assert_eq!(registry.meson(None).unwrap().id(), detected);
        assert_eq!(registry.meson(Some(manual)).unwrap().id(), manual);
        assert!(registry.meson(Some(ninja)).is_none());
        assert_eq!(registry.ninja(None).unwrap().id(), ninja);
    }

    #[test]
    fn test_save_and_load_keep_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tools.toml");
        let mut registry = ToolRegistry::new();
        let id = registry.add(tool(ToolKind::Ninja, "ninja", true)).unwrap();
        registry.save(&path).unwrap();

        let loaded = ToolRegistry::load(&path).unwrap();
        let reloaded = loaded.find(id).unwrap();
        assert_eq!(reloaded.kind(), ToolKind::Ninja);
        assert_eq!(reloaded.exe(), Path::new("/opt/ninja"));
        assert!(reloaded.auto_detected());
        // The executable does not exist, so the probed version is invalid.
        assert!(!reloaded.is_valid());
    }

    #[test]
    fn test_missing_tools_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(ToolRegistry::load(&dir.path().join("tools.toml")).unwrap().tools().is_empty());
    }
}
