// src/cli/handlers/commons.rs

use crate::cli::args::ProjectArgs;
use crate::core::coordinator::{Coordinator, ProjectSnapshot};
use crate::core::events::Outcome;
use crate::core::kit::EnvironmentKit;
use crate::core::settings::{BuildConfiguration, BuildType, Settings};
use crate::core::tasks::TerminalTaskSink;
use crate::core::tool_registry::ToolRegistry;
use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Loads the registry, auto-detecting Meson/Ninja on first use.
pub fn load_registry() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::load_default().context("Failed to load the tool registry")?;
    if registry.meson(None).is_none() || registry.ninja(None).is_none() {
        let added = registry.auto_detect();
        if !added.is_empty() {
            log::info!("Auto-detected {} tool(s).", added.len());
            registry.save_default().context("Failed to save the tool registry")?;
        }
    }
    Ok(registry)
}

fn build_configuration(args: &ProjectArgs) -> Result<BuildConfiguration> {
    let source_dir = dunce::canonicalize(&args.source_dir)
        .with_context(|| format!("Source directory '{}' not found", args.source_dir.display()))?;
    let build_dir = args
        .build_dir
        .clone()
        .map(|dir| {
            if dir.is_absolute() {
                dir
            } else {
                std::env::current_dir().map(|cwd| cwd.join(&dir)).unwrap_or(dir)
            }
        })
        .unwrap_or_else(|| source_dir.join("build"));

    let mut config = BuildConfiguration::new(source_dir, build_dir);
    config.build_type = args.buildtype.parse::<BuildType>()?;
    config.parameters = args.params.clone();
    Ok(config)
}

/// Creates a coordinator for the directories named on the command line, echoing process output.
pub fn open_coordinator(args: &ProjectArgs) -> Result<Coordinator> {
    let settings = Settings::load().context("Failed to load settings")?;
    let registry = load_registry()?;
    let config = build_configuration(args)?;
    log::debug!(
        "Using source '{}' and build '{}'.",
        config.source_dir.display(),
        config.build_dir.display()
    );

    let mut coordinator = Coordinator::new(
        config,
        settings,
        registry.into_shared(),
        Arc::new(EnvironmentKit::new(args.native_file.clone())),
        Arc::new(TerminalTaskSink),
    );
    coordinator.set_output_handler(Box::new(|line| println!("{}", line)));
    Ok(coordinator)
}

/// Upper bound for one full cycle (configure, regenerate and parse).
pub fn cycle_timeout(coordinator: &Coordinator) -> Duration {
    coordinator.settings().process_timeout() * 3 + Duration::from_secs(30)
}

/// Waits for the running cycle and turns a failed outcome into an error.
pub fn wait_for_success(coordinator: &mut Coordinator) -> Result<Outcome> {
    let outcome = coordinator.wait_for_outcome(cycle_timeout(coordinator))?;
    match outcome {
        Outcome::ParsingCompleted(true) | Outcome::BuildCompleted(true) => Ok(outcome),
        Outcome::ParsingCompleted(false) => Err(anyhow!("Meson did not produce a usable project model.")),
        Outcome::BuildCompleted(false) => Err(anyhow!("The build failed.")),
    }
}

/// Parses the project (configuring first if needed) and returns the fresh snapshot.
pub fn load_snapshot(coordinator: &mut Coordinator) -> Result<Arc<ProjectSnapshot>> {
    coordinator.parse_project()?;
    wait_for_success(coordinator)?;
    coordinator
        .snapshot()
        .ok_or_else(|| anyhow!("No project model available."))
}

pub fn print_summary(coordinator: &Coordinator) {
    let Some(snapshot) = coordinator.snapshot() else {
        return;
    };
    let result = &snapshot.result;
    let name = result
        .project_info
        .as_ref()
        .map(|info| info.descriptive_name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| coordinator.config().source_dir.display().to_string());

    println!("\n--- {} ---", name.yellow().bold());
    if result.meson_version.is_valid {
        println!("  {:<18} {}", "Meson version".blue(), result.meson_version);
    }
    println!("  {:<18} {}", "Build directory".blue(), coordinator.config().build_dir.display());
    println!("  {:<18} {}", "Targets".blue(), result.targets.len());
    println!("  {:<18} {}", "Build options".blue(), result.build_options.len());
    println!("  {:<18} {}", "Build files".blue(), result.build_system_files.len());
}

/// `~`-aware path argument.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    Ok(crate::core::paths::expand_user_path(raw)?)
}
