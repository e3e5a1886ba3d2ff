//! Ember CLI - run and inspect Ember games.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;

use clap::{Parser, Subcommand};
use log::{Level, LevelFilter, Metadata, Record};
use std::process::ExitCode;

/// Ember - a deterministic engine for resource-collection competitions
#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a game between bot processes
    Run {
        /// Shell commands that start each bot (1-4 bots)
        #[arg(required = true, num_args = 1..=4)]
        bots: Vec<String>,

        /// Random seed (default: random)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Map width
        #[arg(long, default_value = "32")]
        width: u16,

        /// Map height
        #[arg(long, default_value = "32")]
        height: u16,

        /// Override the turn limit
        #[arg(short, long)]
        turns: Option<u32>,

        /// Constants file (JSON)
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Treat normally-ignorable command errors as game-ending
        #[arg(long)]
        strict: bool,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,

        /// Save the replay to a file
        #[arg(long)]
        save: Option<std::path::PathBuf>,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Summarize a recorded replay
    Replay {
        /// Replay file (JSON)
        #[arg(required = true)]
        recording: std::path::PathBuf,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,
    },
}

/// Minimal stderr logger behind the `log` facade.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }

    let result = match args.command {
        Commands::Run {
            bots,
            seed,
            width,
            height,
            turns,
            config,
            strict,
            format,
            save,
            quiet,
        } => cli::run::execute(
            bots, seed, width, height, turns, config, strict, format, save, quiet,
        ),

        Commands::Replay { recording, format } => cli::replay::execute(recording, format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
