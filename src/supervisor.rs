//! Orchestrates a bridge run: start every server, idle, terminate on shutdown.
use std::{collections::BTreeMap, future::Future};

use futures::future::join_all;
use tokio::time;
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::Config,
    error::{LaunchError, SupervisorError},
    launcher::{self, RunningServer},
    translate::PathTranslator,
};

/// Outcome of one startup round.
#[derive(Debug, Default)]
pub struct StartReport {
    /// Servers that passed their readiness check.
    pub started: Vec<String>,
    /// Servers that could not be started, with the reason.
    pub failed: Vec<(String, LaunchError)>,
}

impl StartReport {
    pub fn attempted(&self) -> usize {
        self.started.len() + self.failed.len()
    }
}

/// Owns the configuration and the set of running servers.
pub struct Supervisor {
    config: Config,
    translator: PathTranslator,
    running: BTreeMap<String, RunningServer>,
}

impl Supervisor {
    /// Creates a supervisor whose translator follows the configured or detected convention.
    pub fn new(config: Config) -> Self {
        let translator = config.bridge.translator();
        Self::with_translator(config, translator)
    }

    /// Creates a supervisor with an explicit translator.
    pub fn with_translator(config: Config, translator: PathTranslator) -> Self {
        debug!(
            "Initializing supervisor for {} server(s) (path convention: {})",
            config.servers.len(),
            translator.convention()
        );

        Self {
            config,
            translator,
            running: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    /// Servers currently tracked, keyed by name.
    pub fn running(&self) -> &BTreeMap<String, RunningServer> {
        &self.running
    }

    pub fn server_mut(&mut self, name: &str) -> Option<&mut RunningServer> {
        self.running.get_mut(name)
    }

    /// Launches every configured server concurrently and waits for all of them
    /// to either become ready or fail.
    pub async fn start_all(&mut self) -> StartReport {
        info!("Starting all servers...");

        let settings = &self.config.bridge;
        let translator = &self.translator;
        let attempts = self.config.servers.values().map(|spec| async move {
            (
                spec.name.clone(),
                launcher::launch(spec, settings, translator).await,
            )
        });
        let outcomes = join_all(attempts).await;

        let mut report = StartReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(server) => {
                    self.running.insert(name.clone(), server);
                    report.started.push(name);
                }
                Err(err) => {
                    error!("{err}");
                    report.failed.push((name, err));
                }
            }
        }

        info!(
            "Successfully started {}/{} servers",
            report.started.len(),
            report.attempted()
        );
        report
    }

    /// Idles until `shutdown` resolves, then terminates every tracked server.
    ///
    /// Returns how many servers were sent a terminate request.
    pub async fn run_until<F>(&mut self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut heartbeat = time::interval(self.config.bridge.heartbeat());
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = heartbeat.tick() => {
                    trace!("Heartbeat: tracking {} server(s)", self.running.len());
                }
            }
        }

        self.shutdown()
    }

    /// Sends a terminate request to every still-running server and forgets them.
    ///
    /// Does not wait for the children to exit.
    pub fn shutdown(&mut self) -> usize {
        info!("Shutting down {} server(s)...", self.running.len());

        let mut signalled = 0;
        for (name, server) in std::mem::take(&mut self.running) {
            match server.terminate() {
                Ok(true) => {
                    debug!("Sent terminate request to '{name}' (PID {})", server.pid());
                    signalled += 1;
                }
                Ok(false) => debug!("Server '{name}' had already exited"),
                Err(err) => warn!("{err}"),
            }
        }
        signalled
    }

    /// Full bridge lifecycle: start everything, then keep running until `shutdown`.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<usize, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        let report = self.start_all().await;
        if report.started.is_empty() {
            return Err(SupervisorError::NoServersStarted {
                attempted: report.attempted(),
            });
        }

        info!("mcpbridge is ready with {} server(s)", report.started.len());
        Ok(self.run_until(shutdown).await)
    }
}
