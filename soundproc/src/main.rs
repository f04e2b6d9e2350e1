mod cli;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use soundproc_core::{plan, run_with_progress, Config, ProgressEvent};

use crate::cli::build_cli;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();

    let script = matches
        .get_one::<PathBuf>("config")
        .context("missing required --config argument")?;
    let files: Vec<PathBuf> = matches
        .get_many::<PathBuf>("files")
        .context("missing output and input files")?
        .cloned()
        .collect();
    let overwrite = matches.get_flag("overwrite");
    let dry_run = matches.get_flag("dry-run");

    let mut builder = Config::builder(script, &files).overwrite(overwrite);
    if let Some(samples) = matches.get_one::<NonZeroUsize>("buffer-samples") {
        builder = builder.buffer_size_samples(*samples);
    }
    let config = builder.build().context("expected an output file followed by an input file")?;
    debug!("running '{}' over {} file(s)", script.display(), files.len());

    if dry_run {
        let stages = plan(config)
            .with_context(|| format!("failed to validate '{}'", script.display()))?;

        if stages.is_empty() {
            println!("Dry run: no commands, the input would be copied unchanged.");
        } else {
            println!("Dry run: would apply {} command(s):", stages.len());
            for stage in stages {
                println!(
                    "  line {}: {} ({:.3}s -> {:.3}s)",
                    stage.line,
                    stage.converter.verb(),
                    stage.input.duration(),
                    stage.output.duration()
                );
            }
        }

        return Ok(());
    }

    let progress = ProgressBar::new(0);
    progress.set_draw_target(ProgressDrawTarget::stderr());
    let bar_style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    let progress_handle = progress.clone();
    let result = run_with_progress(config, move |event| match event {
        ProgressEvent::Start { stages } => {
            progress_handle.set_style(bar_style.clone());
            progress_handle.set_length(stages as u64);
            progress_handle.enable_steady_tick(Duration::from_millis(100));
        }
        ProgressEvent::StageStarted { verb, line, .. } => {
            progress_handle.set_message(format!("line {line}: {verb}"));
        }
        ProgressEvent::StageFinished { .. } => progress_handle.inc(1),
        ProgressEvent::Finish => {
            progress_handle.set_message(String::from("Completed"));
        }
    })
    .with_context(|| format!("failed to apply '{}'", script.display()));

    progress.finish_and_clear();

    result?;

    Ok(())
}
