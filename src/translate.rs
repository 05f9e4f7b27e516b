//! Rewrites path-like arguments between the Windows and WSL views of the filesystem.
//!
//! Translation is a pure string transformation: nothing here touches the disk, and
//! arguments that do not look like a path from the other side are returned as-is.
//!
//! Drive paths and `\\wsl$` shares round-trip between the two directions. The
//! `/Users/` profile shorthand and `~` are one-way normalisations.
use std::{path::PathBuf, sync::LazyLock};

use regex::Regex;

use crate::environment::PathConvention;

/// `C:\Users\al` or `C:/Users/al`.
static DRIVE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]):[\\/](.*)$").expect("drive path pattern is valid")
});

/// `\\wsl$\Ubuntu\home\al` or `\\wsl.localhost\Ubuntu\home\al`.
static WSL_UNC_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\\\\wsl(?:\$|\.localhost)\\[^\\]+(\\.*)?$")
        .expect("wsl unc pattern is valid")
});

/// Profile paths written the macOS way (`/Users/al/...`).
const PROFILE_PREFIX: &str = "/Users/";

/// Default mount root under which WSL exposes Windows drives.
pub const DEFAULT_MOUNT_ROOT: &str = "/mnt";

/// Rewrites arguments for the convention of the current host.
#[derive(Debug, Clone)]
pub struct PathTranslator {
    convention: PathConvention,
    mount_root: String,
    mounted_drive: Regex,
    home: Option<PathBuf>,
    distro: Option<String>,
}

impl PathTranslator {
    /// Builds a translator targeting `convention`.
    ///
    /// `mount_root` is where the guest sees the host drives (normally `/mnt`); `home`
    /// is used to expand `~` and is optional so that translation never depends on
    /// the caller's environment unless asked to.
    pub fn new(
        convention: PathConvention,
        mount_root: &str,
        home: Option<PathBuf>,
    ) -> Self {
        let trimmed = mount_root.trim_end_matches('/');
        let mount_root = if trimmed.is_empty() {
            DEFAULT_MOUNT_ROOT.to_string()
        } else {
            trimmed.to_string()
        };

        let pattern = format!(r"^{}/([A-Za-z])(?:/(.*))?$", regex::escape(&mount_root));
        let mounted_drive =
            Regex::new(&pattern).expect("escaped mount root always forms a valid pattern");

        Self {
            convention,
            mount_root,
            mounted_drive,
            home,
            distro: None,
        }
    }

    /// Names the WSL distribution whose filesystem guest paths live in.
    ///
    /// Only the `windows` direction uses it: absolute guest paths outside the
    /// mount root become `\\wsl$\<distro>\...` shares.
    pub fn with_distro(mut self, distro: Option<String>) -> Self {
        self.distro = distro.filter(|name| !name.trim().is_empty());
        self
    }

    /// The convention this translator writes paths for.
    pub fn convention(&self) -> PathConvention {
        self.convention
    }

    /// A translator for the opposite direction sharing the same mount root and home.
    pub fn reverse(&self) -> Self {
        Self::new(
            self.convention.counterpart(),
            &self.mount_root,
            self.home.clone(),
        )
        .with_distro(self.distro.clone())
    }

    /// Translates every argument, preserving order and length.
    pub fn translate_args(&self, args: &[String]) -> Vec<String> {
        args.iter().map(|arg| self.translate(arg)).collect()
    }

    /// Translates a single argument.
    pub fn translate(&self, arg: &str) -> String {
        let translated = match self.convention {
            PathConvention::Native => None,
            PathConvention::Wsl => self.to_wsl(arg),
            PathConvention::Windows => self.to_windows(arg),
        };
        translated.unwrap_or_else(|| arg.to_string())
    }

    fn to_wsl(&self, arg: &str) -> Option<String> {
        if let Some(caps) = DRIVE_PATH.captures(arg) {
            let drive = caps[1].to_ascii_lowercase();
            let rest = caps[2].replace('\\', "/");
            return Some(format!("{}/{drive}/{rest}", self.mount_root));
        }

        if let Some(rest) = arg.strip_prefix(PROFILE_PREFIX) {
            return Some(format!("{}/c{PROFILE_PREFIX}{rest}", self.mount_root));
        }

        if let Some(caps) = WSL_UNC_PATH.captures(arg) {
            let rest = caps
                .get(1)
                .map(|m| m.as_str().replace('\\', "/"))
                .unwrap_or_else(|| "/".to_string());
            return Some(rest);
        }

        self.expand_home(arg, '/')
    }

    fn to_windows(&self, arg: &str) -> Option<String> {
        if let Some(caps) = self.mounted_drive.captures(arg) {
            let drive = caps[1].to_ascii_uppercase();
            let rest = caps
                .get(2)
                .map(|m| m.as_str().replace('/', "\\"))
                .unwrap_or_default();
            return Some(format!("{drive}:\\{rest}"));
        }

        if let Some(distro) = &self.distro
            && arg.starts_with('/')
            && !arg.starts_with("//")
        {
            let rest = arg.trim_start_matches('/').replace('/', "\\");
            return Some(format!("\\\\wsl$\\{distro}\\{rest}"));
        }

        self.expand_home(arg, '\\')
    }

    fn expand_home(&self, arg: &str, separator: char) -> Option<String> {
        let home = self.home.as_ref()?;
        let home = home.to_string_lossy();
        let home = home.trim_end_matches(['/', '\\']);

        if arg == "~" {
            return Some(home.to_string());
        }

        let rest = arg.strip_prefix("~/").or_else(|| arg.strip_prefix("~\\"))?;
        let rest = rest.replace(['/', '\\'], &separator.to_string());
        Some(format!("{home}{separator}{rest}"))
    }
}
