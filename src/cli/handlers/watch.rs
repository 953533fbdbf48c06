// src/cli/handlers/watch.rs

use crate::{
    CancellationToken,
    cli::{args::ProjectArgs, handlers::commons},
    constants::WATCH_POLL_INTERVAL,
    core::events::Outcome,
};
use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::sync::atomic::Ordering;
use std::thread;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Keeps the project model in sync, re-parsing whenever Meson regenerates."
)]
struct WatchArgs {
    #[command(flatten)]
    project: ProjectArgs,
}

pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<()> {
    let watch_args = WatchArgs::try_parse_from(&args)?;
    let mut coordinator = commons::open_coordinator(&watch_args.project)?;
    coordinator.on_snapshot(Box::new(|snapshot| {
        println!(
            "{} {} target(s), {} option(s)",
            "Model updated:".green(),
            snapshot.target_names.len(),
            snapshot.result.build_options.len()
        );
    }));

    commons::load_snapshot(&mut coordinator)?;
    commons::print_summary(&coordinator);
    coordinator.watch();
    println!("{}", "Watching for changes. Press Ctrl+C to stop.".dimmed());

    while !cancellation_token.load(Ordering::Relaxed) {
        for outcome in coordinator.process_events() {
            if outcome == Outcome::ParsingCompleted(false) {
                println!("{}", "Parsing failed, keeping the previous model.".yellow());
            }
        }
        thread::sleep(WATCH_POLL_INTERVAL);
    }
    coordinator.stop_watching();
    Ok(())
}
