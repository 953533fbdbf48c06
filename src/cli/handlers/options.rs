// src/cli/handlers/options.rs

use crate::{
    CancellationToken,
    cli::{args::ProjectArgs, handlers::commons},
    core::build_options::{BuildOption, changed_options_as_args},
};
use anyhow::{Result, anyhow};
use clap::Parser;
use colored::Colorize;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Lists build options, or changes them and reconfigures."
)]
struct OptionsArgs {
    /// Only list options of this section (core, backend, base, compiler, directory, user, test).
    #[arg(long)]
    section: Option<String>,

    /// Assigns a new value, e.g. `--set warning_level=3`. May be repeated.
    #[arg(long = "set", value_name = "NAME=VALUE")]
    assignments: Vec<String>,

    #[command(flatten)]
    project: ProjectArgs,
}

pub fn handle(args: Vec<String>, _cancellation_token: &CancellationToken) -> Result<()> {
    let options_args = OptionsArgs::try_parse_from(&args)?;
    let mut coordinator = commons::open_coordinator(&options_args.project)?;
    let snapshot = commons::load_snapshot(&mut coordinator)?;
    let original = &snapshot.result.build_options;

    if options_args.assignments.is_empty() {
        print_options(original, options_args.section.as_deref());
        return Ok(());
    }

    let mut edited = original.clone();
    for assignment in &options_args.assignments {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{}'.", assignment))?;
        let option = edited
            .iter_mut()
            .find(|o| o.full_name() == name)
            .ok_or_else(|| anyhow!("Unknown build option '{}'.", name))?;
        option.set_value_str(value)?;
    }

    let overrides = changed_options_as_args(original, &edited);
    if overrides.is_empty() {
        println!("{}", "No option changed.".dimmed());
        return Ok(());
    }
    log::info!("Reconfiguring with {:?}.", overrides);
    coordinator.set_pending_config_args(overrides);
    coordinator.configure()?;
    commons::wait_for_success(&mut coordinator)?;
    println!("{}", "Options updated.".green());
    Ok(())
}

fn print_options(options: &[BuildOption], section: Option<&str>) {
    let mut current_section: Option<&str> = None;
    for option in options
        .iter()
        .filter(|o| section.is_none_or(|s| o.section == s))
    {
        if current_section != Some(option.section.as_str()) {
            println!("\n{}", option.section.yellow().bold());
            current_section = Some(option.section.as_str());
        }
        let choices = option
            .choices()
            .map(|c| format!(" [{}]", c.join(", ")))
            .unwrap_or_default();
        println!(
            "  {:<36} {:<10} {}{}",
            option.full_name().cyan(),
            option.type_name().dimmed(),
            option.value_str(),
            choices.dimmed()
        );
    }
}
