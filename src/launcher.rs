//! Starts a single server and decides when it is ready.
//!
//! Each child gets one task per output stream and one task that waits for the
//! process to exit. Those tasks publish into a [`watch`] channel holding the
//! [`ServerState`], which is how the launcher learns about readiness and how the
//! supervisor later learns whether a child is still alive.
use std::{
    collections::HashMap,
    env,
    ffi::{OsStr, OsString},
    fmt, fs,
    os::unix::{fs::PermissionsExt, process::ExitStatusExt},
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    sync::{Arc, OnceLock},
    time::Duration,
};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, ChildStdin, Command},
    sync::{mpsc, watch},
    task::JoinHandle,
    time,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::{BridgeSettings, ServerSpec},
    error::{LaunchError, TerminationError},
    redact::{mask_env, scrub},
    translate::PathTranslator,
};

/// Number of output chunks buffered per server before new ones are dropped.
pub const OUTPUT_BUFFER: usize = 256;

/// How long the exit watcher waits for the stream tasks to drain.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 8 * 1024;

/// Which of the child's output streams a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// The child's standard output, where readiness markers are looked for.
    Stdout,
    /// The child's standard error.
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Raw bytes read from a child in one go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// Stream the bytes were read from.
    pub stream: StreamKind,
    /// Bytes exactly as the child wrote them; not split on lines.
    pub bytes: Vec<u8>,
}

/// Lifecycle of a launched child as observed by its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Spawned, no readiness evidence yet.
    Starting,
    /// A marker was seen or the readiness window elapsed.
    Ready,
    /// The process is gone. `status` is `None` when it could not be collected;
    /// `was_ready` records whether it became ready before exiting.
    Exited {
        status: Option<ExitStatus>,
        was_ready: bool,
    },
}

/// How a server came to be considered ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Its stdout contained one of the readiness markers.
    Marker,
    /// Nothing recognisable arrived in time; assumed ready.
    TimedOut,
}

/// Fully resolved description of what will be executed for a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl LaunchPlan {
    /// Resolves `spec` against the bridge's own environment and `PATH`.
    pub fn prepare(
        spec: &ServerSpec,
        settings: &BridgeSettings,
        translator: &PathTranslator,
    ) -> Self {
        let base_env = env::vars_os().filter_map(|(key, value)| {
            match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    debug!("Skipping non UTF-8 environment entry {key:?}");
                    None
                }
            }
        });

        Self::prepare_with(spec, settings, translator, base_env, |command| {
            find_for_server(spec, command).is_some()
        })
    }

    /// Same as [`LaunchPlan::prepare`] with the environment and command lookup supplied.
    pub fn prepare_with<I, F>(
        spec: &ServerSpec,
        settings: &BridgeSettings,
        translator: &PathTranslator,
        base_env: I,
        available: F,
    ) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
        F: Fn(&str) -> bool,
    {
        let program = resolve_command(&spec.command, &settings.command_fallbacks, available);
        let args = if translator.convention().translates() {
            translator.translate_args(&spec.args)
        } else {
            spec.args.clone()
        };

        Self {
            name: spec.name.clone(),
            program,
            args,
            env: merge_env(base_env, spec.env.as_ref()),
        }
    }
}

/// Picks the command to execute, falling back to a configured equivalent when the
/// configured runner is not installed.
///
/// Commands containing a path separator are never substituted.
pub fn resolve_command<F>(
    command: &str,
    fallbacks: &HashMap<String, String>,
    available: F,
) -> String
where
    F: Fn(&str) -> bool,
{
    if command.contains('/') || available(command) {
        return command.to_string();
    }

    match fallbacks.get(command) {
        Some(fallback) if available(fallback) => {
            warn!("'{command}' is not available, using '{fallback}' instead");
            fallback.clone()
        }
        _ => command.to_string(),
    }
}

/// Process environment with the server's overrides applied on top.
pub fn merge_env<I>(
    base: I,
    overrides: Option<&HashMap<String, String>>,
) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut merged: HashMap<String, String> = base.into_iter().collect();
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Whether a chunk of output contains any readiness marker.
pub fn contains_marker(chunk: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .any(|marker| !marker.is_empty() && chunk.contains(marker.as_str()))
}

/// Searches the `PATH` of the current process for `command`.
pub fn find_on_path(command: &str) -> Option<PathBuf> {
    find_in_path(command, env::var_os("PATH").as_deref())
}

/// `PATH` the child of `spec` will see: its own override, else the bridge's.
pub fn search_path(spec: &ServerSpec) -> Option<OsString> {
    spec.env
        .as_ref()
        .and_then(|env| env.get("PATH"))
        .map(OsString::from)
        .or_else(|| env::var_os("PATH"))
}

/// Searches the `PATH` the child of `spec` will see for `command`.
pub fn find_for_server(spec: &ServerSpec, command: &str) -> Option<PathBuf> {
    find_in_path(command, search_path(spec).as_deref())
}

/// Searches `path_var` (a `PATH`-style list) for an executable named `command`.
pub fn find_in_path(command: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if command.contains('/') {
        let candidate = PathBuf::from(command);
        return is_executable(&candidate).then_some(candidate);
    }

    env::split_paths(path_var?)
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Human readable exit status.
pub fn describe_exit(status: Option<ExitStatus>) -> String {
    match status {
        Some(status) => match (status.code(), status.signal()) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(signal)) => format!("signal {signal}"),
            (None, None) => format!("{status}"),
        },
        None => "unknown status".to_string(),
    }
}

/// A child that passed its readiness check.
#[derive(Debug)]
pub struct RunningServer {
    name: String,
    pid: u32,
    readiness: Readiness,
    stdin: Option<ChildStdin>,
    output: mpsc::Receiver<OutputChunk>,
    state: watch::Receiver<ServerState>,
}

impl RunningServer {
    /// Name of the server spec this child was started from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// PID of the child, which is also its process group id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// How the child passed its readiness check.
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Latest observed state.
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Whether the exit of the child has not been published yet.
    pub fn is_running(&self) -> bool {
        !matches!(self.state(), ServerState::Exited { .. })
    }

    /// Write half of the child's stdin. Dropping it closes the child's input.
    pub fn stdin(&mut self) -> Option<&mut ChildStdin> {
        self.stdin.as_mut()
    }

    /// Takes ownership of the child's stdin.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Chunks of stdout and stderr in arrival order per stream.
    pub fn output(&mut self) -> &mut mpsc::Receiver<OutputChunk> {
        &mut self.output
    }

    /// Sends SIGTERM to the child's process group and to the child itself.
    ///
    /// Does not wait for the process to go away. Returns `Ok(false)` when the
    /// child was already gone.
    pub fn terminate(&self) -> Result<bool, TerminationError> {
        if !self.is_running() {
            return Ok(false);
        }

        let pid = Pid::from_raw(self.pid as i32);
        let mut delivered = false;

        match signal::killpg(pid, Signal::SIGTERM) {
            Ok(()) => delivered = true,
            Err(Errno::ESRCH) => {}
            Err(Errno::EPERM) => {
                warn!(
                    "Insufficient permissions to signal process group {pid} for '{}'. Falling back to direct signal",
                    self.name
                );
            }
            Err(source) => {
                return Err(TerminationError {
                    server: self.name.clone(),
                    pid: self.pid,
                    source,
                });
            }
        }

        match signal::kill(pid, Signal::SIGTERM) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(delivered),
            Err(source) => Err(TerminationError {
                server: self.name.clone(),
                pid: self.pid,
                source,
            }),
        }
    }

    /// Resolves once the child has exited.
    pub async fn wait_for_exit(&mut self) -> Option<ExitStatus> {
        match self
            .state
            .wait_for(|state| matches!(state, ServerState::Exited { .. }))
            .await
        {
            Ok(state) => match *state {
                ServerState::Exited { status, .. } => status,
                _ => None,
            },
            Err(_) => None,
        }
    }
}

/// Resolves and starts the server described by `spec`.
pub async fn launch(
    spec: &ServerSpec,
    settings: &BridgeSettings,
    translator: &PathTranslator,
) -> Result<RunningServer, LaunchError> {
    info!("Starting server: {}", spec.name);
    debug!("Configured command for '{}': {}", spec.name, spec.command_line());

    if let Some(overrides) = &spec.env {
        debug!(
            "Environment overrides for '{}': {:?}",
            spec.name,
            mask_env(overrides)
        );
    }

    let plan = LaunchPlan::prepare(spec, settings, translator);
    if plan.args != spec.args {
        debug!(
            "Translated arguments for '{}': {:?} -> {:?}",
            spec.name, spec.args, plan.args
        );
    }

    start(plan, &settings.ready_markers, settings.ready_timeout()).await
}

/// Spawns `plan` and waits until the child is ready, has exited, or the
/// readiness window elapses.
pub async fn start(
    plan: LaunchPlan,
    markers: &[String],
    ready_timeout: Duration,
) -> Result<RunningServer, LaunchError> {
    let LaunchPlan {
        name,
        program,
        args,
        env,
    } = plan;

    let mut command = Command::new(&program);
    command
        .args(&args)
        .env_clear()
        .envs(&env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
        server: name.clone(),
        source,
    })?;

    let pid = child.id().ok_or_else(|| LaunchError::Spawn {
        server: name.clone(),
        source: std::io::Error::other("process exited before its PID could be read"),
    })?;
    debug!("Spawned '{name}' ({program}) with PID {pid}");

    let (state_tx, state_rx) = watch::channel(ServerState::Starting);
    let state_tx = Arc::new(state_tx);
    let reaped: Arc<OnceLock<Option<ExitStatus>>> = Arc::new(OnceLock::new());
    let (output_tx, output_rx) = mpsc::channel(OUTPUT_BUFFER);
    let markers: Arc<[String]> = markers.into();

    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        let probe = ReadinessProbe {
            state: Arc::clone(&state_tx),
            markers: Arc::clone(&markers),
        };
        pumps.push(tokio::spawn(pump_stream(
            name.clone(),
            StreamKind::Stdout,
            stdout,
            output_tx.clone(),
            Some(probe),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(tokio::spawn(pump_stream(
            name.clone(),
            StreamKind::Stderr,
            stderr,
            output_tx,
            None,
        )));
    }
    let stdin = child.stdin.take();

    tokio::spawn(watch_exit(
        name.clone(),
        child,
        pumps,
        Arc::clone(&state_tx),
        Arc::clone(&reaped),
    ));

    let readiness = match await_readiness(
        &name,
        state_rx.clone(),
        &state_tx,
        &reaped,
        ready_timeout,
    )
    .await
    {
        Ok(readiness) => readiness,
        Err(err) => {
            // Leftover grandchildren would otherwise keep the pipes open.
            let _ = signal::killpg(Pid::from_raw(pid as i32), Signal::SIGTERM);
            return Err(err);
        }
    };

    Ok(RunningServer {
        name,
        pid,
        readiness,
        stdin,
        output: output_rx,
        state: state_rx,
    })
}

async fn await_readiness(
    name: &str,
    mut state: watch::Receiver<ServerState>,
    state_tx: &watch::Sender<ServerState>,
    reaped: &OnceLock<Option<ExitStatus>>,
    ready_timeout: Duration,
) -> Result<Readiness, LaunchError> {
    let settled = time::timeout(
        ready_timeout,
        state.wait_for(|state| !matches!(state, ServerState::Starting)),
    )
    .await;

    let observed = match settled {
        Ok(Ok(current)) => *current,
        Ok(Err(_)) => ServerState::Exited {
            status: None,
            was_ready: false,
        },
        Err(_elapsed) => {
            if promote_unless_reaped(state_tx, reaped) {
                info!(
                    "Server '{name}' started (assuming ready after {}s timeout)",
                    ready_timeout.as_secs()
                );
                return Ok(Readiness::TimedOut);
            }
            let current = *state_tx.borrow();
            match (current, reaped.get()) {
                (ServerState::Starting, Some(status)) => ServerState::Exited {
                    status: *status,
                    was_ready: false,
                },
                (current, _) => current,
            }
        }
    };

    match observed {
        ServerState::Exited {
            status,
            was_ready: false,
        } => Err(LaunchError::ExitedBeforeReady {
            server: name.to_string(),
            status,
        }),
        _ => {
            info!("Server '{name}' is ready");
            Ok(Readiness::Marker)
        }
    }
}

/// Moves `Starting` to `Ready`; any other state is left alone.
fn promote_to_ready(state: &watch::Sender<ServerState>) -> bool {
    state.send_if_modified(|current| {
        if *current == ServerState::Starting {
            *current = ServerState::Ready;
            true
        } else {
            false
        }
    })
}

/// Timeout promotion: like [`promote_to_ready`], but refused once the child
/// has been reaped, even if its exit is not published yet.
fn promote_unless_reaped(
    state: &watch::Sender<ServerState>,
    reaped: &OnceLock<Option<ExitStatus>>,
) -> bool {
    state.send_if_modified(|current| {
        if *current == ServerState::Starting && reaped.get().is_none() {
            *current = ServerState::Ready;
            true
        } else {
            false
        }
    })
}

struct ReadinessProbe {
    state: Arc<watch::Sender<ServerState>>,
    markers: Arc<[String]>,
}

impl ReadinessProbe {
    fn observe(&self, server: &str, text: &str) {
        if contains_marker(text, &self.markers) && promote_to_ready(&self.state) {
            debug!("Readiness marker seen in output of '{server}'");
        }
    }
}

async fn pump_stream<R>(
    server: String,
    kind: StreamKind,
    mut reader: R,
    output: mpsc::Sender<OutputChunk>,
    probe: Option<ReadinessProbe>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let read = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) => {
                warn!("Failed to read {kind} of '{server}': {err}");
                break;
            }
        };

        let bytes = buf[..read].to_vec();
        let text = String::from_utf8_lossy(&bytes);
        for line in text.lines().map(str::trim_end).filter(|line| !line.is_empty()) {
            match kind {
                StreamKind::Stdout => info!("[{server}] {line}"),
                StreamKind::Stderr => warn!("[{server}] {}", scrub(line)),
            }
        }

        if let Some(probe) = &probe {
            probe.observe(&server, &text);
        }

        if let Err(mpsc::error::TrySendError::Full(_)) =
            output.try_send(OutputChunk { stream: kind, bytes })
        {
            trace!("Output buffer of '{server}' is full; dropping {kind} chunk");
        }
    }
    debug!("{kind} of '{server}' closed");
}

async fn watch_exit(
    server: String,
    mut child: Child,
    pumps: Vec<JoinHandle<()>>,
    state: Arc<watch::Sender<ServerState>>,
    reaped: Arc<OnceLock<Option<ExitStatus>>>,
) {
    let status = match child.wait().await {
        Ok(status) => Some(status),
        Err(err) => {
            error!("Failed to wait on '{server}': {err}");
            None
        }
    };

    // Recorded under the state lock so a timeout promotion cannot slip in
    // between the reap and the check. Markers already written still count
    // while the pumps drain below.
    state.send_if_modified(|_| {
        let _ = reaped.set(status);
        false
    });

    for pump in pumps {
        if time::timeout(DRAIN_GRACE, pump).await.is_err() {
            debug!("Output of '{server}' still open after exit");
        }
    }

    info!("Server '{server}' exited with {}", describe_exit(status));
    state.send_modify(|current| {
        let was_ready = !matches!(current, ServerState::Starting);
        *current = ServerState::Exited { status, was_ready };
    });
}
