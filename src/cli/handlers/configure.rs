// src/cli/handlers/configure.rs

use crate::{
    CancellationToken,
    cli::{args::ProjectArgs, handlers::commons},
};
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Reconfigures the build directory. Falls back to a full setup when required."
)]
struct ConfigureArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Build option overrides, e.g. `-D b_lto=true` or `-Dbuildtype=release`.
    #[arg(short = 'D', value_name = "NAME=VALUE")]
    defines: Vec<String>,
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let configure_args = ConfigureArgs::try_parse_from(&args)?;
    let mut coordinator = commons::open_coordinator(&configure_args.project)?;

    let overrides = configure_args
        .defines
        .iter()
        .map(|define| format!("-D{}", define))
        .collect();
    coordinator.set_pending_config_args(overrides);

    coordinator.configure()?;
    commons::wait_for_success(&mut coordinator)?;
    commons::print_summary(&coordinator);
    Ok(())
}
