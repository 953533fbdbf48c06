// src/cli/handlers/wipe.rs

use crate::{
    CancellationToken,
    cli::{args::ProjectArgs, handlers::commons},
};
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Sets up the build directory from scratch (`meson setup --wipe`)."
)]
struct WipeArgs {
    #[command(flatten)]
    project: ProjectArgs,
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let wipe_args = WipeArgs::try_parse_from(&args)?;
    let mut coordinator = commons::open_coordinator(&wipe_args.project)?;

    coordinator.wipe()?;
    commons::wait_for_success(&mut coordinator)?;
    commons::print_summary(&coordinator);
    Ok(())
}
