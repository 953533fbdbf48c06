// src/cli/handlers/files.rs

use crate::{
    CancellationToken,
    cli::{args::ProjectArgs, handlers::commons},
};
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Lists the project's files.")]
struct FilesArgs {
    /// Only list build-system files (meson.build, options files).
    #[arg(long)]
    build_system: bool,

    #[command(flatten)]
    project: ProjectArgs,
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let files_args = FilesArgs::try_parse_from(&args)?;
    let mut coordinator = commons::open_coordinator(&files_args.project)?;
    let snapshot = commons::load_snapshot(&mut coordinator)?;

    if files_args.build_system {
        for file in &snapshot.result.build_system_files {
            println!("{}", file.display());
        }
    } else {
        for file in snapshot.tree.files() {
            println!("{}", file.display());
        }
    }
    Ok(())
}
