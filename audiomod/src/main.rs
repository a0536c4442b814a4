mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use audiomod_core::{AudioModifier, JobEvent, JobStatus, Operation, Plan, Toolchain};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;

use crate::cli::{build_cli, extract_options, is_dry_run, parse_action, Action};

/// Listener percentages carry two decimals.
const PROGRESS_SCALE: u64 = 10_000;

fn describe_input(input: Option<&Path>) -> String {
    input.map_or_else(
        || "the configured input".to_owned(),
        |path| format!("'{}'", path.display()),
    )
}

fn dry_run(
    modifier: &AudioModifier,
    operation: &Operation,
    input: Option<&Path>,
) -> anyhow::Result<()> {
    let plan = modifier
        .plan(operation, input)
        .with_context(|| format!("failed to plan {operation} for {}", describe_input(input)))?;

    println!("Dry run: would run:");
    for line in modifier.describe(&plan) {
        println!("  {line}");
    }
    if matches!(plan, Plan::Normalize(_)) {
        println!("  followed by a gain pass sized from the measured peak");
    }
    Ok(())
}

fn run(
    modifier: &AudioModifier,
    operation: &Operation,
    input: Option<&Path>,
) -> anyhow::Result<()> {
    let progress = ProgressBar::new(PROGRESS_SCALE);
    progress.set_draw_target(ProgressDrawTarget::stderr());
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);

    let handle = progress.clone();
    let mut listener = move |event: JobEvent<'_>| match event {
        JobEvent::Start(command_line) => {
            debug!("spawned {command_line}");
            handle.set_position(0);
            handle.enable_steady_tick(Duration::from_millis(100));
        }
        JobEvent::Progress(percent) => {
            handle.set_position(((percent * 100.0).round() as u64).min(PROGRESS_SCALE));
            handle.set_message(format!("{percent:.2}%"));
        }
        JobEvent::End => handle.set_message("Completed"),
        JobEvent::Error(_) => handle.abandon(),
    };

    let result = modifier
        .run(operation, input, &mut listener)
        .with_context(|| format!("failed to run {operation} on {}", describe_input(input)));
    progress.finish_and_clear();

    let outcome = result?;
    match outcome.status {
        JobStatus::Completed => println!("Output written to {}", outcome.output_path.display()),
        JobStatus::AlreadyNormalized => println!(
            "{} is already normalized",
            outcome.output_path.display()
        ),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let (argv, options) = extract_options(std::env::args_os());
    let matches = build_cli().get_matches_from(argv);
    let action = parse_action(&matches)?;

    let config = options
        .resolve()
        .context("failed to resolve job options")?;
    let modifier = AudioModifier::new(config, Toolchain::system());

    match action {
        Action::Play { input } => modifier
            .play_audio_file(input.as_deref())
            .with_context(|| format!("failed to play {}", describe_input(input.as_deref()))),
        Action::Run { operation, input } if is_dry_run(&matches) => {
            dry_run(&modifier, &operation, input.as_deref())
        }
        Action::Run { operation, input } => run(&modifier, &operation, input.as_deref()),
    }
}
