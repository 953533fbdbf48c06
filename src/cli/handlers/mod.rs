// src/cli/handlers/mod.rs

pub mod build;
pub mod commons;
pub mod configure;
pub mod files;
pub mod options;
pub mod parse;
pub mod setup;
pub mod targets;
pub mod tools;
pub mod tree;
pub mod watch;
pub mod wipe;
