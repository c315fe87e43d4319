//! Configuration for the stag tools.
//!
//! Settings persist to disk as RON (`config.ron`) and can be overridden from
//! the command line via clap. Unknown fields are ignored and missing ones
//! fall back to defaults, so old and new config files load either way.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE, Config, DebugConfig, GridConfig, StorageConfig, default_config_dir};
pub use error::ConfigError;
