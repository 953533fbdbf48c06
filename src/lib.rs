//! # mesonctl
//!
//! Drives the Meson build generator and the Ninja backend as subprocesses and keeps a
//! typed, in-memory model of the configured project (targets, build options, build-system
//! files) synchronized with the generator's JSON introspection output.
//!
//! The entry point for library users is [`core::coordinator::Coordinator`].

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared flag used to stop long-running background helpers (e.g. the info-file watcher).
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
