//! `stag`: inspect, dump and repack region archives.

mod commands;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stag_config::{CliArgs, Config, default_config_dir};
use stag_log::init_logging;
use stag_region::encode_options;

use crate::commands::CommandError;

#[derive(Parser, Debug)]
#[command(name = "stag", version, about = "Inspect and rewrite STAR region archives")]
struct Cli {
    #[command(flatten)]
    global: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List entry names and payload sizes.
    List {
        /// Archive to read.
        archive: PathBuf,
    },
    /// Print one entry as text.
    Dump {
        archive: PathBuf,
        /// Entry name.
        entry: String,
    },
    /// Re-encode every entry with the configured storage options.
    Repack {
        input: PathBuf,
        output: PathBuf,
    },
    /// Show the section states of a grid entry.
    Grid {
        archive: PathBuf,
        entry: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_dir = cli
        .global
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from(".stag"));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&cli.global);

    init_logging(
        Some(&config_dir.join("logs")),
        cfg!(debug_assertions),
        Some(&config),
    );

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &Config) -> Result<(), CommandError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::List { archive } => commands::list(&archive, &mut out)?,
        Command::Dump { archive, entry } => commands::dump(&archive, &entry, &mut out)?,
        Command::Repack { input, output } => {
            config.validate().map_err(stag_region::RegionError::from)?;
            let summary = commands::repack(&input, &output, encode_options(&config.storage))?;
            writeln!(
                out,
                "{} re-encoded, {} copied verbatim",
                summary.reencoded, summary.copied
            )?;
        }
        Command::Grid { archive, entry } => commands::grid(&archive, &entry, config, &mut out)?,
    }
    out.flush()?;
    Ok(())
}
