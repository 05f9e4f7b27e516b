//! Configuration management for mcpbridge.
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashMap},
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    environment::{self, PathConvention},
    error::ConfigError,
    translate::{DEFAULT_MOUNT_ROOT, PathTranslator},
};

/// File name the desktop client stores its server list under.
pub const CONFIG_FILE_NAME: &str = "claude_desktop_config.json";

/// Environment variable that points at an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "MCPBRIDGE_CONFIG";

/// Environment variable naming the Windows account whose profile holds the config.
pub const WINDOWS_USER_ENV_VAR: &str = "MCPBRIDGE_WINDOWS_USER";

/// Represents the structure of the configuration file.
///
/// Servers may be listed under `servers`, under the desktop client's
/// `mcpServers`, or both; the maps are merged and `servers` wins on a clash.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawConfig")]
pub struct Config {
    /// Map of server names to their launch specs.
    pub servers: BTreeMap<String, ServerSpec>,
    /// Bridge behaviour knobs; every field has a default.
    pub bridge: BridgeSettings,
    /// File the configuration was read from.
    pub source: Option<PathBuf>,
}

/// On-disk layout before the two server maps are merged.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    servers: BTreeMap<String, ServerSpec>,
    #[serde(default, rename = "mcpServers")]
    mcp_servers: BTreeMap<String, ServerSpec>,
    #[serde(default)]
    bridge: BridgeSettings,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        let mut servers = raw.mcp_servers;
        for (name, spec) in raw.servers {
            if servers.insert(name.clone(), spec).is_some() {
                warn!("Server '{name}' is listed under both servers and mcpServers; using servers");
            }
        }

        Self {
            servers,
            bridge: raw.bridge,
            source: None,
        }
    }
}

/// How to launch one server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSpec {
    /// Unique name, taken from the key in the `servers` map.
    #[serde(skip)]
    pub name: String,
    /// Executable to start.
    pub command: String,
    /// Arguments passed to the executable, in order.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides applied on top of the bridge's own environment.
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

impl ServerSpec {
    /// Command line as it appears in the configuration.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Optional `bridge` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Seconds to wait for a readiness marker before assuming the server is up.
    pub ready_timeout_secs: u64,
    /// Substrings in stdout that mark a server as ready.
    pub ready_markers: Vec<String>,
    /// Replacement commands used when the configured one is not on `PATH`.
    pub command_fallbacks: HashMap<String, String>,
    /// Forces a path convention instead of detecting it.
    pub path_convention: Option<PathConvention>,
    /// Where the guest mounts the host drives.
    pub mount_root: String,
    /// WSL distribution guest paths belong to; defaults to `WSL_DISTRO_NAME`.
    pub wsl_distro: Option<String>,
    /// Interval of the idle heartbeat while servers run.
    pub heartbeat_secs: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            ready_timeout_secs: 10,
            ready_markers: vec!["MCP".into(), "server".into(), "{\"".into()],
            command_fallbacks: HashMap::from([("uvx".to_string(), "npx".to_string())]),
            path_convention: None,
            mount_root: DEFAULT_MOUNT_ROOT.to_string(),
            wsl_distro: None,
            heartbeat_secs: 30,
        }
    }
}

impl BridgeSettings {
    /// Readiness fallback window.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Heartbeat interval, never shorter than a second.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    /// Configured convention, or the detected one when unset.
    pub fn convention(&self) -> PathConvention {
        self.path_convention.unwrap_or_else(environment::detect)
    }

    /// Configured distribution, or the one the bridge itself runs in.
    pub fn wsl_distro(&self) -> Option<String> {
        self.wsl_distro
            .clone()
            .or_else(|| env::var("WSL_DISTRO_NAME").ok())
    }

    /// Translator for these settings, expanding `~` against the user's home.
    pub fn translator(&self) -> PathTranslator {
        PathTranslator::new(self.convention(), &self.mount_root, dirs::home_dir())
            .with_distro(self.wsl_distro())
    }
}

/// Account name used to find the Windows profile from inside WSL.
pub fn windows_user() -> String {
    [WINDOWS_USER_ENV_VAR, "USER", "USERNAME"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "user".to_string())
}

/// Ordered list of places the configuration may live.
pub fn candidate_paths(home: &Path, windows_user: &str) -> Vec<PathBuf> {
    let roaming = Path::new("AppData/Roaming/Claude").join(CONFIG_FILE_NAME);
    vec![
        PathBuf::from(format!("/mnt/c/Users/{windows_user}")).join(&roaming),
        home.join(&roaming),
        home.join("Library/Application Support/Claude")
            .join(CONFIG_FILE_NAME),
        home.join(".config/claude").join(CONFIG_FILE_NAME),
        home.join(".claude").join(CONFIG_FILE_NAME),
    ]
}

/// Candidate list for the current user.
pub fn default_candidates() -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
    candidate_paths(&home, &windows_user())
}

/// Returns the first candidate that exists on disk.
pub fn locate_config(candidates: &[PathBuf]) -> Result<PathBuf, ConfigError> {
    for candidate in candidates {
        debug!("Looking for configuration at {}", candidate.display());
        if candidate.is_file() {
            info!("Found configuration: {}", candidate.display());
            return Ok(candidate.clone());
        }
    }

    Err(ConfigError::NotFound {
        searched: candidates.to_vec(),
    })
}

/// Resolves the configuration path, honouring an explicit override first.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => locate_config(&[path.to_path_buf()]),
        None => locate_config(&default_candidates()),
    }
}

/// Loads and parses the configuration file.
///
/// Files ending in `.yaml`/`.yml` are read as YAML, everything else as JSON.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let mut config: Config = if is_yaml {
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?
    };

    for (name, spec) in config.servers.iter_mut() {
        spec.name = name.clone();
    }
    config.source = Some(path.to_path_buf());

    info!("Loaded {} server(s) from {}", config.servers.len(), path.display());
    Ok(config)
}
