// src/cli/handlers/targets.rs

use crate::{
    CancellationToken,
    cli::{args::ProjectArgs, handlers::commons},
};
use anyhow::Result;
use clap::Parser;
use colored::Colorize;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Lists the buildable targets.")]
struct TargetsArgs {
    /// Only list executables, with the path of the built program.
    #[arg(long, short)]
    apps: bool,

    #[command(flatten)]
    project: ProjectArgs,
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let targets_args = TargetsArgs::try_parse_from(&args)?;
    let mut coordinator = commons::open_coordinator(&targets_args.project)?;
    let snapshot = commons::load_snapshot(&mut coordinator)?;

    if targets_args.apps {
        for app in coordinator.application_targets() {
            println!("{:<30} {}", app.build_key.cyan(), app.executable.display());
        }
        return Ok(());
    }

    for name in &snapshot.target_names {
        let target = snapshot
            .result
            .targets
            .iter()
            .find(|t| &t.full_name(&coordinator.config().build_dir) == name);
        match target {
            Some(target) => println!("{:<40} {}", name.cyan(), target.target_type.as_str().dimmed()),
            None => println!("{}", name),
        }
    }
    Ok(())
}
