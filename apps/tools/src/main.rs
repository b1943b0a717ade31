use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use label_model::graph::check_integrity;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::TaskDataType;

#[derive(Parser, Debug)]
#[command(name = "labeltool", about = "Build, replay and audit labeling state documents")]
struct Cli {
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a fresh state with empty items.
    NewTask {
        #[arg(long)]
        items: usize,
        #[arg(long, value_enum, default_value = "image")]
        data_type: TaskDataType,
        #[arg(long, default_value = "labeltool")]
        project: String,
        /// Item urls become `<prefix><index>`.
        #[arg(long)]
        url_prefix: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Apply a file of wire actions to a state document.
    Replay {
        #[arg(long)]
        task: PathBuf,
        #[arg(long)]
        actions: PathBuf,
        #[arg(long)]
        submit: bool,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Report referential-integrity violations.
    Check {
        #[arg(long)]
        task: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::load_settings(&cli.config)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::NewTask {
            items,
            data_type,
            project,
            url_prefix,
            out,
        } => {
            let state =
                commands::new_task(&settings, &project, items, data_type, url_prefix.as_deref())?;
            info!(items, project = %project, "created task");
            let rendered = commands::render_state(&state, settings.pretty)?;
            commands::write_output(out.as_deref(), &rendered)?;
        }
        Command::Replay {
            task,
            actions,
            submit,
            out,
        } => {
            let state = commands::read_state(&task)?;
            let actions = commands::read_actions(&actions)?;
            let (state, report) = commands::replay(&settings, state, &actions, submit)?;
            let rendered = commands::render_state(&state, settings.pretty)?;
            commands::write_output(out.as_deref(), &rendered)?;
            if report.rejected > 0 {
                eprintln!("{} of {} actions rejected", report.rejected, actions.len());
            }
        }
        Command::Check { task } => {
            let state = commands::read_state(&task)?;
            let violations = check_integrity(&state);
            for violation in &violations {
                println!("{violation}");
            }
            if !violations.is_empty() {
                bail!("{} integrity violations in '{}'", violations.len(), task.display());
            }
            info!(labels = state.task.label_count(), "task is consistent");
        }
    }

    Ok(())
}
