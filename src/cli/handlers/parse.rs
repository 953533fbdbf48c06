// src/cli/handlers/parse.rs

use crate::{
    CancellationToken,
    cli::{args::ProjectArgs, handlers::commons},
};
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Loads the project model and prints a summary."
)]
struct ParseArgs {
    #[command(flatten)]
    project: ProjectArgs,
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let parse_args = ParseArgs::try_parse_from(&args)?;
    let mut coordinator = commons::open_coordinator(&parse_args.project)?;

    commons::load_snapshot(&mut coordinator)?;
    commons::print_summary(&coordinator);
    Ok(())
}
