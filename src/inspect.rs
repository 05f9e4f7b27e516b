//! Read-only diagnostics over a loaded configuration (`list` and `check`).
use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    config::{BridgeSettings, Config, ServerSpec},
    launcher::{LaunchPlan, find_for_server},
    redact::is_sensitive_key,
    translate::PathTranslator,
};

/// One observation about a configured server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// The command resolves to an executable.
    CommandFound { command: String, path: PathBuf },
    /// The command is not on `PATH`; `fallback` is the substitute that will be used, if any.
    CommandMissing {
        command: String,
        fallback: Option<String>,
    },
    /// A path-like argument exists once translated.
    PathExists { translated: String },
    /// A path-like argument does not exist once translated.
    PathMissing { original: String, translated: String },
    /// A credential-looking variable carries a value.
    CredentialSet { key: String },
    /// A credential-looking variable is present but empty.
    CredentialEmpty { key: String },
}

impl Finding {
    /// Whether this finding points at something that will likely break the server.
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            Finding::CommandMissing { fallback: None, .. }
                | Finding::PathMissing { .. }
                | Finding::CredentialEmpty { .. }
        )
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.is_problem() { "warn" } else { " ok " };
        match self {
            Finding::CommandFound { command, path } => {
                write!(f, "[{tag}] command '{command}' -> {}", path.display())
            }
            Finding::CommandMissing {
                command,
                fallback: Some(fallback),
            } => write!(f, "[{tag}] command '{command}' not found, will use '{fallback}'"),
            Finding::CommandMissing {
                command,
                fallback: None,
            } => write!(f, "[{tag}] command '{command}' not found on PATH"),
            Finding::PathExists { translated } => {
                write!(f, "[{tag}] path {translated}")
            }
            Finding::PathMissing {
                original,
                translated,
            } if original != translated => {
                write!(f, "[{tag}] path {translated} (from {original}) does not exist")
            }
            Finding::PathMissing { translated, .. } => {
                write!(f, "[{tag}] path {translated} does not exist")
            }
            Finding::CredentialSet { key } => write!(f, "[{tag}] {key} is set"),
            Finding::CredentialEmpty { key } => write!(f, "[{tag}] {key} is empty"),
        }
    }
}

/// All findings for a single server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCheck {
    pub name: String,
    pub findings: Vec<Finding>,
}

impl ServerCheck {
    pub fn problems(&self) -> usize {
        self.findings.iter().filter(|finding| finding.is_problem()).count()
    }
}

/// Whether an argument is shaped like an absolute or home-relative path.
pub fn looks_like_path(arg: &str) -> bool {
    let bytes = arg.as_bytes();
    let drive = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/');

    drive || arg.starts_with('/') || arg.starts_with("\\\\") || arg == "~" || arg.starts_with("~/")
}

/// Inspects one server with the supplied lookups.
pub fn check_server<L, E>(
    spec: &ServerSpec,
    settings: &BridgeSettings,
    translator: &PathTranslator,
    lookup: L,
    exists: E,
) -> ServerCheck
where
    L: Fn(&str) -> Option<PathBuf>,
    E: Fn(&Path) -> bool,
{
    let mut findings = Vec::new();

    match lookup(&spec.command) {
        Some(path) => findings.push(Finding::CommandFound {
            command: spec.command.clone(),
            path,
        }),
        None => {
            let fallback = settings
                .command_fallbacks
                .get(&spec.command)
                .filter(|fallback| lookup(fallback).is_some())
                .cloned();
            findings.push(Finding::CommandMissing {
                command: spec.command.clone(),
                fallback,
            });
        }
    }

    for arg in spec.args.iter().filter(|arg| looks_like_path(arg)) {
        let translated = translator.translate(arg);
        if exists(Path::new(&translated)) {
            findings.push(Finding::PathExists { translated });
        } else {
            findings.push(Finding::PathMissing {
                original: arg.clone(),
                translated,
            });
        }
    }

    if let Some(env) = &spec.env {
        let mut keys: Vec<_> = env.keys().filter(|key| is_sensitive_key(key)).collect();
        keys.sort();
        for key in keys {
            let key = key.clone();
            if env[&key].trim().is_empty() {
                findings.push(Finding::CredentialEmpty { key });
            } else {
                findings.push(Finding::CredentialSet { key });
            }
        }
    }

    ServerCheck {
        name: spec.name.clone(),
        findings,
    }
}

/// Inspects every configured server against the real filesystem and the
/// `PATH` each server will be launched with.
pub fn check_config(config: &Config, translator: &PathTranslator) -> Vec<ServerCheck> {
    config
        .servers
        .values()
        .map(|spec| {
            check_server(
                spec,
                &config.bridge,
                translator,
                |command| find_for_server(spec, command),
                Path::exists,
            )
        })
        .collect()
}

/// Name and the command line that will actually run, fallbacks and path
/// translation applied.
pub fn describe_server<F>(
    spec: &ServerSpec,
    settings: &BridgeSettings,
    translator: &PathTranslator,
    available: F,
) -> String
where
    F: Fn(&str) -> bool,
{
    let plan = LaunchPlan::prepare_with(spec, settings, translator, std::iter::empty(), available);

    let mut line = format!("{}: {}", plan.name, plan.program);
    for arg in &plan.args {
        line.push(' ');
        line.push_str(arg);
    }
    if let Some(env) = &spec.env
        && !env.is_empty()
    {
        line.push_str(&format!(" ({} env override(s))", env.len()));
    }
    line
}

/// One line per configured server, see [`describe_server`].
pub fn describe_servers(config: &Config, translator: &PathTranslator) -> Vec<String> {
    config
        .servers
        .values()
        .map(|spec| {
            describe_server(spec, &config.bridge, translator, |command| {
                find_for_server(spec, command).is_some()
            })
        })
        .collect()
}
