// src/cli/handlers/tools.rs

use crate::{
    CancellationToken,
    cli::handlers::commons,
    core::tool_registry::ToolRegistry,
    system::tool_wrapper::{ToolKind, ToolWrapper},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use colored::Colorize;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Manages the registered Meson and Ninja executables.")]
struct ToolsArgs {
    #[command(subcommand)]
    action: Option<ToolsAction>,
}

#[derive(Subcommand, Debug)]
enum ToolsAction {
    /// Lists registered tools (default).
    List,
    /// Searches PATH for Meson and Ninja and registers what is missing.
    Detect,
    /// Registers an executable by hand.
    Add {
        /// `meson` or `ninja`.
        #[arg(value_parser = parse_kind)]
        kind: ToolKind,
        /// Path to the executable. `~` is expanded.
        exe: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Unregisters a tool by id.
    Remove { id: Uuid },
}

fn parse_kind(raw: &str) -> Result<ToolKind, String> {
    match raw.to_lowercase().as_str() {
        "meson" => Ok(ToolKind::Meson),
        "ninja" => Ok(ToolKind::Ninja),
        other => Err(format!("unknown tool kind '{}' (expected meson or ninja)", other)),
    }
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let tools_args = ToolsArgs::try_parse_from(&args)?;
    let mut registry = ToolRegistry::load_default().context("Failed to load the tool registry")?;

    match tools_args.action.unwrap_or(ToolsAction::List) {
        ToolsAction::List => print_tools(&registry),
        ToolsAction::Detect => {
            let added = registry.auto_detect();
            registry.save_default()?;
            println!("Detected {} new tool(s).", added.len());
            print_tools(&registry);
        }
        ToolsAction::Add { kind, exe, name } => {
            let exe = commons::expand_path(&exe)?;
            let name = name.unwrap_or_else(|| format!("{} at {}", kind, exe.display()));
            let tool = ToolWrapper::new(kind, name, exe, false);
            if !tool.is_valid() {
                return Err(anyhow!(
                    "'{}' does not look like a working {} executable.",
                    tool.exe().display(),
                    kind
                ));
            }
            let id = registry.add(tool)?;
            registry.save_default()?;
            println!("{} {}", "Registered".green(), id);
        }
        ToolsAction::Remove { id } => {
            let removed = registry.remove(id)?;
            registry.save_default()?;
            println!("{} '{}'", "Removed".green(), removed.name());
        }
    }
    Ok(())
}

fn print_tools(registry: &ToolRegistry) {
    if registry.tools().is_empty() {
        println!("{}", "No tools registered. Try `mesonctl tools detect`.".dimmed());
        return;
    }
    for tool in registry.tools() {
        let origin = if tool.auto_detected() { "auto" } else { "manual" };
        println!(
            "{} {:<6} {:<8} {:<7} {} ({})",
            tool.id().to_string().dimmed(),
            tool.kind().to_string().cyan(),
            tool.version(),
            origin,
            tool.name(),
            tool.exe().display()
        );
    }
}
