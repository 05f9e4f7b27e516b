#![allow(dead_code)]

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use mcpbridge::{
    config::{BridgeSettings, Config, ServerSpec},
    environment::PathConvention,
    launcher::RunningServer,
    translate::PathTranslator,
};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Shell snippet that records the server's PID, announces readiness and idles.
pub fn ready_script(pid_file: &Path) -> String {
    format!(
        "echo $$ > '{}'; echo 'MCP server ready'; exec sleep 30",
        pid_file.display()
    )
}

pub fn sh(name: &str, script: &str) -> ServerSpec {
    ServerSpec {
        name: name.to_string(),
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env: None,
    }
}

pub fn command(name: &str, command: &str, args: &[&str]) -> ServerSpec {
    ServerSpec {
        name: name.to_string(),
        command: command.to_string(),
        args: args.iter().map(|arg| arg.to_string()).collect(),
        env: None,
    }
}

pub fn with_env(mut spec: ServerSpec, pairs: &[(&str, &str)]) -> ServerSpec {
    let env: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    spec.env = Some(env);
    spec
}

pub fn settings(ready_timeout_secs: u64) -> BridgeSettings {
    BridgeSettings {
        ready_timeout_secs,
        path_convention: Some(PathConvention::Native),
        ..BridgeSettings::default()
    }
}

pub fn config(servers: Vec<ServerSpec>, bridge: BridgeSettings) -> Config {
    Config {
        servers: servers
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect(),
        bridge,
        source: None,
    }
}

pub fn native() -> PathTranslator {
    PathTranslator::new(PathConvention::Native, "/mnt", None)
}

pub fn wsl() -> PathTranslator {
    PathTranslator::new(PathConvention::Wsl, "/mnt", None)
}

pub fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("claude_desktop_config.json");
    fs::write(&path, body).expect("failed to write config");
    path
}

/// Reads output chunks until `needle` shows up, returning everything seen.
pub async fn read_until(server: &mut RunningServer, needle: &str) -> String {
    let mut seen = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    while !seen.contains(needle) {
        let chunk = tokio::time::timeout_at(deadline, server.output().recv())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {needle:?}; saw {seen:?}"))
            .unwrap_or_else(|| panic!("Output closed before {needle:?}; saw {seen:?}"));
        seen.push_str(&String::from_utf8_lossy(&chunk.bytes));
    }
    seen
}

pub fn wait_for_pid_file(path: &Path) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(content) = fs::read_to_string(path)
            && let Ok(pid) = content.trim().parse::<u32>()
        {
            return pid;
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for PID in {:?}", path);
        }

        thread::sleep(Duration::from_millis(50));
    }
}

pub fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system.process(Pid::from_u32(pid)).is_some()
}

/// Waits until `pid` is gone or left as a zombie awaiting its reaper.
pub fn wait_for_process_exit(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(10);
    let stat_path = PathBuf::from(format!("/proc/{pid}/stat"));

    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return;
        }

        if let Ok(stat) = fs::read_to_string(&stat_path)
            && let Some(state_start) = stat.rfind(')')
            && let Some(state) = stat[state_start + 1..].trim().chars().next()
            && (state == 'Z' || state == 'X')
        {
            return;
        }

        thread::sleep(Duration::from_millis(100));
    }

    panic!("Timed out waiting for PID {pid} to exit");
}
