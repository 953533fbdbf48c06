//! # System Interaction Layer
//!
//! Everything that touches external processes or polls the filesystem. The core logic
//! builds [`command::Command`] values and reacts to events; this layer turns them into
//! running processes and change notifications.
//!
//! ## Modules
//!
//! - **`command`**: The immutable description of one external invocation.
//! - **`tool_wrapper`**: Wraps a Meson or Ninja executable, probes its version and builds the
//!   argument lists for setup, configure, regenerate, introspect and compile.
//! - **`executor`**: The asynchronous process runner. Spawns one command at a time, streams or
//!   captures its output, enforces a timeout and reports completion through a callback.
//! - **`file_watcher`**: Polls the modification time of `meson-info.json`.

pub mod command;
pub mod executor;
pub mod file_watcher;
pub mod tool_wrapper;
