//! Detection of the path convention the bridge is running under.
use std::{env, fs};

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

/// How absolute paths are spelled in the environment hosting the bridge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PathConvention {
    /// Plain Unix host. Arguments are passed through untouched.
    Native,
    /// Linux guest that sees the Windows drives under a mount root (`/mnt/c`).
    Wsl,
    /// Windows host that sees the Linux guest through `/mnt/<drive>` style paths.
    Windows,
}

impl PathConvention {
    /// Whether arguments need rewriting under this convention.
    pub fn translates(self) -> bool {
        !matches!(self, PathConvention::Native)
    }

    /// The convention on the other side of the boundary.
    pub fn counterpart(self) -> PathConvention {
        match self {
            PathConvention::Wsl => PathConvention::Windows,
            PathConvention::Windows => PathConvention::Wsl,
            PathConvention::Native => PathConvention::Native,
        }
    }
}

/// Figures out the convention of the running host.
pub fn detect() -> PathConvention {
    if cfg!(windows) {
        return PathConvention::Windows;
    }

    let wsl_env = ["WSL_DISTRO_NAME", "WSL_INTEROP"]
        .iter()
        .any(|key| env::var_os(key).is_some_and(|value| !value.is_empty()));
    if wsl_env {
        return PathConvention::Wsl;
    }

    match fs::read_to_string("/proc/sys/kernel/osrelease") {
        Ok(release) if kernel_is_wsl(&release) => PathConvention::Wsl,
        _ => PathConvention::Native,
    }
}

fn kernel_is_wsl(release: &str) -> bool {
    let release = release.to_ascii_lowercase();
    release.contains("microsoft") || release.contains("wsl")
}
