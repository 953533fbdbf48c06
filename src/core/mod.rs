// src/core/mod.rs

pub mod build_options;
pub mod coordinator;
pub mod events;
pub mod introspection;
pub mod kit;
pub mod orchestrator;
pub mod output_parser;
pub mod paths;
pub mod project_tree;
pub mod settings;
pub mod tasks;
pub mod tool_registry;
