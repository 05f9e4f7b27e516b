//! Keeps credentials out of the bridge's log output.
use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;

/// Replacement shown for env values whose key looks sensitive.
pub const MASK: &str = "***MASKED***";

const SENSITIVE_KEY_PARTS: [&str; 4] = ["TOKEN", "KEY", "SECRET", "PASSWORD"];

static GITHUB_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"gh[pousr]_[A-Za-z0-9]+").expect("github token pattern is valid")
});

static JWT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+")
        .expect("jwt pattern is valid")
});

/// Whether an environment key probably holds a credential.
pub fn is_sensitive_key(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| upper.contains(part))
}

/// Copy of `env` safe to print: sensitive values are replaced with [`MASK`].
pub fn mask_env<'a, I>(env: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    env.into_iter()
        .map(|(key, value)| {
            let shown = if is_sensitive_key(key) {
                MASK.to_string()
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

/// Scrubs tokens and JWTs out of free-form output.
pub fn scrub(text: &str) -> String {
    let text = GITHUB_TOKEN.replace_all(text, "***TOKEN***");
    JWT.replace_all(&text, "***JWT***").into_owned()
}
