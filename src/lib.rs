//! mcpbridge launches the MCP servers listed in the desktop client's configuration
//! from another execution environment (typically WSL), rewriting path arguments
//! across the Windows/Linux boundary, waiting for each server to come up and
//! keeping the set alive until the bridge is interrupted.

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Path convention detection.
pub mod environment;

/// Error handling.
pub mod error;

/// Diagnostics for the `list` and `check` commands.
pub mod inspect;

/// Spawning a single server and tracking its readiness.
pub mod launcher;

/// Masking of credentials in log output.
pub mod redact;

/// Shutdown signal handling.
pub mod signal;

/// Supervisor that owns the running servers.
pub mod supervisor;

/// Path translation between Windows and WSL.
pub mod translate;
