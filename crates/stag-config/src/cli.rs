//! Command-line overrides shared by the stag tools.

use std::path::PathBuf;

use clap::Args;

use crate::Config;

/// Global options; CLI values override settings loaded from `config.ron`.
///
/// Flattened into each binary's own parser.
#[derive(Args, Debug, Clone, Default)]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// zlib level 0-9 for written documents.
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(0..=9))]
    pub compression: Option<u32>,

    /// Write documents without compression.
    #[arg(long, global = true, conflicts_with = "compression")]
    pub no_compression: bool,

    /// Write literal keys instead of a key dictionary.
    #[arg(long, global = true)]
    pub no_dictionary: bool,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(level) = args.compression {
            self.storage.compression_level = Some(level);
        }
        if args.no_compression {
            self.storage.compression_level = None;
        }
        if args.no_dictionary {
            self.storage.use_dictionary = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
