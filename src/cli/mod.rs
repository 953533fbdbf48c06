// src/cli/mod.rs

use clap::Parser;

pub mod args;
pub mod handlers;

/// mesonctl: drive Meson and Ninja from the command line.
///
/// Usage: `mesonctl <command> [args...]`
///
/// Commands:
///   setup       Set up the build directory (wipes it if already set up).
///   configure   Apply `-D` overrides; runs setup instead when needed.
///   wipe        Set up the build directory from scratch.
///   parse       Load the project model and print a summary.
///   build       Build a target with Ninja (default: all).
///   targets     List the buildable targets.
///   options     List build options, or change them with `--set name=value`.
///   tree        Print the project tree.
///   files       List the project's files.
///   tools       Manage the registered Meson and Ninja executables.
///   watch       Re-parse whenever Meson rewrites the build directory.
///
/// Every project command accepts `--source-dir`, `--build-dir`, `--buildtype` and `--params`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// The command to run.
    pub command: Option<String>,

    /// Arguments for the command.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}
