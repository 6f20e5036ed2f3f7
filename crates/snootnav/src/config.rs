//! Interceptor configuration and environment overrides.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTAINER: &str = "main";
pub const DEFAULT_DELEGATE_ROOT: &str = "body";
pub const DEFAULT_NAVIGABLE: &str = "a";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// How the interceptor finds its container, which clicks it listens to, and
/// which links it leaves alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Region replaced on navigation, both on this page and in fetched pages.
    pub container_selector: String,
    /// Element the delegated click listener is bound to.
    pub delegate_root: String,
    /// Elements whose clicks are candidates for interception.
    pub navigable_selector: String,
    /// Hrefs starting with any of these are never intercepted.
    pub passthrough_prefixes: Vec<String>,
    /// Drop `<script>` elements from fetched fragments.
    pub strip_scripts: bool,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            container_selector: DEFAULT_CONTAINER.to_string(),
            delegate_root: DEFAULT_DELEGATE_ROOT.to_string(),
            navigable_selector: DEFAULT_NAVIGABLE.to_string(),
            passthrough_prefixes: vec!["mailto:".to_string()],
            strip_scripts: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: format!("snootnav/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl InterceptorConfig {
    /// Defaults overlaid with `SNOOTNAV_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(container) = read_env_string("SNOOTNAV_CONTAINER") {
            config.container_selector = container;
        }
        if let Some(root) = read_env_string("SNOOTNAV_DELEGATE_ROOT") {
            config.delegate_root = root;
        }
        if let Some(prefixes) = read_env_string("SNOOTNAV_PASSTHROUGH") {
            config.passthrough_prefixes = split_prefixes(&prefixes);
        }
        config.strip_scripts = read_env_bool("SNOOTNAV_STRIP_SCRIPTS", config.strip_scripts);
        config.timeout_ms = read_env_u64("SNOOTNAV_TIMEOUT_MS", config.timeout_ms);
        config
    }

    /// Whether a click on a link with this href should be left to the browser.
    pub fn is_passthrough(&self, href: &str) -> bool {
        self.passthrough_prefixes
            .iter()
            .any(|prefix| href.starts_with(prefix.as_str()))
    }
}

fn split_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_bool(name: &str, default_value: bool) -> bool {
    match read_env_string(name).as_deref() {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default_value,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
