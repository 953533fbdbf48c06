// src/cli/handlers/tree.rs

use crate::{
    CancellationToken,
    cli::{args::ProjectArgs, handlers::commons},
    core::project_tree,
};
use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Displays the project as a tree of folders, files and targets.")]
struct TreeArgs {
    #[command(flatten)]
    project: ProjectArgs,
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let tree_args = TreeArgs::try_parse_from(&args)?;
    let mut coordinator = commons::open_coordinator(&tree_args.project)?;
    let snapshot = commons::load_snapshot(&mut coordinator)?;

    print!("{}", project_tree::render_tree(&snapshot.tree));
    Ok(())
}
