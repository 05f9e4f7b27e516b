//! Error handling for mcpbridge.
use std::{path::PathBuf, process::ExitStatus};

use thiserror::Error;

/// Errors raised while locating or parsing the bridge configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// None of the candidate locations held a configuration file.
    #[error("No configuration file found (searched {} locations)", searched.len())]
    NotFound {
        /// Every path that was checked, in search order.
        searched: Vec<PathBuf>,
    },

    /// The configuration file exists but could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        /// Path of the unreadable file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected layout.
    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        /// Path of the malformed file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: serde_json::Error,
    },

    /// The configuration file is not valid YAML for the expected layout.
    #[error("Invalid YAML in {}: {source}", path.display())]
    Yaml {
        /// Path of the malformed file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors raised while launching a single server.
///
/// These never abort sibling launches; the supervisor logs them and moves on.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The OS refused to start the process (missing executable, permissions, ...).
    #[error("Failed to start server '{server}': {source}")]
    Spawn {
        /// The server that failed to start.
        server: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The process started but exited before it was considered ready.
    #[error("Server '{server}' exited before becoming ready ({})", exit_summary(.status))]
    ExitedBeforeReady {
        /// The server that exited.
        server: String,
        /// Exit status reported by the OS, when it could be collected.
        status: Option<ExitStatus>,
    },
}

fn exit_summary(status: &Option<ExitStatus>) -> String {
    crate::launcher::describe_exit(*status)
}

/// Error raised when a terminate request cannot be delivered.
#[derive(Debug, Error)]
#[error("Failed to terminate server '{server}' (PID {pid}): {source}")]
pub struct TerminationError {
    /// The server that could not be signalled.
    pub server: String,
    /// PID the signal was addressed to.
    pub pid: u32,
    /// The underlying error that occurred.
    #[source]
    pub source: nix::errno::Errno,
}

/// Errors that end a supervisor run.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Every configured server failed to start (or none were configured).
    #[error("No servers could be started ({attempted} configured)")]
    NoServersStarted {
        /// Number of server specs that were attempted.
        attempted: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
