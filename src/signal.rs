//! Waiting for the signal that ends a bridge run.
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::info;

/// SIGINT/SIGTERM listeners.
///
/// The handlers are registered by [`ShutdownSignal::install`], so a signal that
/// arrives while servers are still starting is remembered rather than killing
/// the bridge and orphaning its children.
pub struct ShutdownSignal {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignal {
    /// Registers the handlers.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolves on the first SIGINT or SIGTERM.
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("Received SIGINT, shutting down mcpbridge..."),
            _ = self.terminate.recv() => info!("Received SIGTERM, shutting down mcpbridge..."),
        }
    }
}
