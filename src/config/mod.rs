use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tracing::info;

use crate::error::ConnectivityError;

/// Global configuration instance
static CONFIG: OnceCell<RwLock<EngineConfig>> = OnceCell::new();

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "MAIL_CONNECTIVITY_CONFIG";

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub gmail: GmailConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

/// Live probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Upper bound for a single probe attempt, in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,

    /// Number of candidates probed at once (1 = strictly sequential)
    #[serde(default = "default_probe_concurrency")]
    pub concurrency: usize,
}

/// Candidate generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Maximum number of MX-derived candidates handed to the prober
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

/// Retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Window size used when the request does not specify one
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Hard cap on the window size
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Render plain-text-only bodies as linkified HTML
    #[serde(default)]
    pub text_as_html: bool,
}

/// Gmail REST settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    /// Base URL of the Gmail user resource
    #[serde(default = "default_gmail_api_base")]
    pub api_base: String,
}

/// Shared HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_probe_concurrency() -> usize {
    1
}

fn default_max_candidates() -> usize {
    3
}

fn default_limit() -> usize {
    20
}

fn default_max_limit() -> usize {
    200
}

fn default_gmail_api_base() -> String {
    "https://gmail.googleapis.com/gmail/v1/users/me".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("mail-connectivity/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout_ms(),
            concurrency: default_probe_concurrency(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            text_as_html: false,
        }
    }
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: default_gmail_api_base(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl ProbeConfig {
    /// Probe timeout, clamped to 1..=30 seconds
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.clamp(1_000, 30_000))
    }
}

impl FetchConfig {
    /// Clamp a requested window size to `1..=max_limit`
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

/// Get default config paths
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        paths.push(PathBuf::from(path));
    }

    // XDG config path
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("mail-connectivity").join("config.toml"));
    }

    // Home directory fallback
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(
            home_dir
                .join(".config")
                .join("mail-connectivity")
                .join("config.toml"),
        );
    }

    paths
}

/// Initialize configuration from default paths
pub fn init_config() -> Result<(), ConnectivityError> {
    for path in default_config_paths() {
        if path.exists() {
            info!("Found config at: {:?}", path);
            return init_config_from_path(&path);
        }
    }

    info!("No config file found, using defaults");
    set_config(EngineConfig::default())
}

/// Initialize configuration from a specific path
pub fn init_config_from_path(path: &Path) -> Result<(), ConnectivityError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ConnectivityError::Config(format!("Failed to read config: {}", e)))?;

    set_config(parse_config(&content)?)
}

/// Parse a TOML configuration document
pub fn parse_config(content: &str) -> Result<EngineConfig, ConnectivityError> {
    toml::from_str(content)
        .map_err(|e| ConnectivityError::Config(format!("Failed to parse config: {}", e)))
}

/// Set the global configuration
pub fn set_config(config: EngineConfig) -> Result<(), ConnectivityError> {
    match CONFIG.get() {
        Some(lock) => {
            let mut guard = lock
                .write()
                .map_err(|e| ConnectivityError::Config(format!("Failed to lock config: {}", e)))?;
            *guard = config;
        }
        None => {
            CONFIG.set(RwLock::new(config)).ok();
        }
    }
    Ok(())
}

/// Snapshot of the current configuration, defaults if never initialized
pub fn get_config() -> EngineConfig {
    CONFIG
        .get()
        .and_then(|lock| lock.read().ok().map(|guard| guard.clone()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.probe.timeout_ms, 5000);
        assert_eq!(config.probe.concurrency, 1);
        assert_eq!(config.discovery.max_candidates, 3);
        assert_eq!(config.fetch.default_limit, 20);
        assert!(!config.fetch.text_as_html);
    }

    #[test]
    fn test_partial_document() {
        let config = parse_config(
            r#"
            [probe]
            timeout_ms = 3000
            concurrency = 3

            [fetch]
            text_as_html = true
            "#,
        )
        .unwrap();
        assert_eq!(config.probe.timeout(), Duration::from_secs(3));
        assert_eq!(config.probe.concurrency, 3);
        assert!(config.fetch.text_as_html);
        assert_eq!(config.fetch.max_limit, 200);
    }

    #[test]
    fn test_probe_timeout_is_clamped() {
        let probe = ProbeConfig {
            timeout_ms: 10,
            concurrency: 1,
        };
        assert_eq!(probe.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_effective_limit() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.effective_limit(None), 20);
        assert_eq!(fetch.effective_limit(Some(0)), 1);
        assert_eq!(fetch.effective_limit(Some(5000)), 200);
    }

    #[test]
    fn test_invalid_document() {
        assert!(parse_config("probe = 12").is_err());
    }
}
