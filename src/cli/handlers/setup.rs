// src/cli/handlers/setup.rs

use crate::{
    CancellationToken,
    cli::{args::ProjectArgs, handlers::commons},
};
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Sets up the build directory, wiping it first if it is already set up."
)]
struct SetupArgs {
    #[command(flatten)]
    project: ProjectArgs,
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let setup_args = SetupArgs::try_parse_from(&args)?;
    let mut coordinator = commons::open_coordinator(&setup_args.project)?;

    coordinator.setup()?;
    commons::wait_for_success(&mut coordinator)?;
    commons::print_summary(&coordinator);
    Ok(())
}
