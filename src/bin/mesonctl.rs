// src/bin/mesonctl.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};
use colored::*;
use mesonctl::{
    CancellationToken,
    cli::{Cli, handlers},
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

// --- Command Definition and Registry ---

/// A command, its aliases, and its synchronous handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>, &CancellationToken) -> Result<()>,
}

/// To add a command, add an entry here.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "build",
        aliases: &["compile"],
        handler: handlers::build::handle,
    },
    CommandDefinition {
        name: "configure",
        aliases: &["config"],
        handler: handlers::configure::handle,
    },
    CommandDefinition {
        name: "files",
        aliases: &[],
        handler: handlers::files::handle,
    },
    CommandDefinition {
        name: "options",
        aliases: &["opts"],
        handler: handlers::options::handle,
    },
    CommandDefinition {
        name: "parse",
        aliases: &["info"],
        handler: handlers::parse::handle,
    },
    CommandDefinition {
        name: "setup",
        aliases: &[],
        handler: handlers::setup::handle,
    },
    CommandDefinition {
        name: "targets",
        aliases: &[],
        handler: handlers::targets::handle,
    },
    CommandDefinition {
        name: "tools",
        aliases: &[],
        handler: handlers::tools::handle,
    },
    CommandDefinition {
        name: "tree",
        aliases: &["ls"],
        handler: handlers::tree::handle,
    },
    CommandDefinition {
        name: "watch",
        aliases: &[],
        handler: handlers::watch::handle,
    },
    CommandDefinition {
        name: "wipe",
        aliases: &[],
        handler: handlers::wipe::handle,
    },
];

fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

fn main() {
    let cancellation_token = Arc::new(AtomicBool::new(false));
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse(), cancellation_token) {
        // Help and version requests from a handler's parser are not failures.
        if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
            clap_err.exit();
        }
        eprintln!("\n{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli, cancellation_token: CancellationToken) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let Some(name) = cli.command else {
        Cli::command().print_long_help()?;
        return Ok(());
    };

    match find_command(&name) {
        Some(command) => (command.handler)(cli.args, &cancellation_token),
        None => Err(anyhow::anyhow!(
            "Unknown command '{}'. Run `mesonctl` without arguments for the list of commands.",
            name
        )),
    }
}
