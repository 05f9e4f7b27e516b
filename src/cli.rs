//! Command-line interface for mcpbridge.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{config::CONFIG_ENV_VAR, environment::PathConvention};

/// Command-line interface for mcpbridge.
#[derive(Parser)]
#[command(name = "mcpbridge", version, author)]
#[command(
    about = "Launch the MCP servers configured for the desktop client from this environment",
    long_about = None
)]
pub struct Cli {
    /// Override the logging verbosity (off, error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LevelFilter>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for mcpbridge.
#[derive(Subcommand)]
pub enum Commands {
    /// Start every configured server and keep them alive until interrupted.
    Start {
        /// Path to the configuration file (searched in the default locations when omitted).
        #[arg(short, long, env = CONFIG_ENV_VAR)]
        config: Option<PathBuf>,
    },

    /// List the configured servers and the command lines they will run with.
    List {
        /// Path to the configuration file (searched in the default locations when omitted).
        #[arg(short, long, env = CONFIG_ENV_VAR)]
        config: Option<PathBuf>,
    },

    /// Check commands, translated paths and credentials without starting anything.
    Check {
        /// Path to the configuration file (searched in the default locations when omitted).
        #[arg(short, long, env = CONFIG_ENV_VAR)]
        config: Option<PathBuf>,
    },

    /// Print how arguments would be rewritten for this environment.
    Translate {
        /// Convention to translate for (native, wsl, windows). Detected when omitted.
        #[arg(long, value_name = "CONVENTION")]
        convention: Option<PathConvention>,

        /// Mount root under which the Windows drives appear.
        #[arg(long, default_value = crate::translate::DEFAULT_MOUNT_ROOT)]
        mount_root: String,

        /// WSL distribution that owns guest paths (defaults to WSL_DISTRO_NAME).
        #[arg(long, value_name = "NAME")]
        distro: Option<String>,

        /// Arguments to translate.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
