// src/cli/handlers/build.rs

use crate::{
    CancellationToken,
    cli::{args::ProjectArgs, handlers::commons},
    constants::DEFAULT_BUILD_TARGET,
    system::tool_wrapper::is_setup,
};
use anyhow::Result;
use clap::Parser;
use colored::Colorize;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Builds a target with Ninja.")]
struct BuildArgs {
    /// The target's build key, as listed by `mesonctl targets`.
    #[arg(default_value = DEFAULT_BUILD_TARGET)]
    target: String,

    #[command(flatten)]
    project: ProjectArgs,
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let build_args = BuildArgs::try_parse_from(&args)?;
    let mut coordinator = commons::open_coordinator(&build_args.project)?;

    if !is_setup(&coordinator.config().build_dir) {
        println!("{}", "Build directory is not set up yet, configuring first.".dimmed());
        coordinator.configure()?;
        commons::wait_for_success(&mut coordinator)?;
    }

    coordinator.build(&build_args.target)?;
    commons::wait_for_success(&mut coordinator)?;
    println!("{} {}", "Built".green().bold(), build_args.target);
    Ok(())
}
