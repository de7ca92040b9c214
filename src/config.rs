//! Static process configuration: the set of known networks and their
//! per-capability endpoint URLs, plus fetch/poll tuning knobs.
//!
//! Loaded once at process start and read-only afterwards.
//! Priority: environment variables > config file > defaults.

use crate::error::CoreError;
use crate::types::Capability;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;

/// Immutable record describing one known network.
#[derive(Clone, Debug, Deserialize)]
pub struct NetworkConfig {
    /// Filled in from the map key during load.
    #[serde(default)]
    pub name: String,
    /// capability -> endpoint URL
    pub endpoints: BTreeMap<Capability, String>,
}

impl NetworkConfig {
    /// A capability with no endpoint entry is a configuration-level miss;
    /// `CapabilityUnavailable` is reserved for routing against the active
    /// set.
    pub fn endpoint(&self, capability: Capability) -> Result<&str, CoreError> {
        self.endpoints
            .get(&capability)
            .map(String::as_str)
            .ok_or_else(|| {
                CoreError::Configuration(format!(
                    "network '{}' has no '{capability}' endpoint",
                    self.name
                ))
            })
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.endpoints.keys().copied().collect()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Default page size for list fetches (1-1000).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Request timeout for HTTP calls in milliseconds (1000-60000).
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Chain-rpc head polling interval in milliseconds (100-10000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum blocks the chain-rpc live feed catches up per poll (1-100).
    #[serde(default = "default_poll_max_catchup")]
    pub poll_max_catchup: u64,

    /// Optional bearer token for backends that rate-limit anonymous calls.
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_page_size() -> usize {
    100
}
fn default_rpc_timeout_ms() -> u64 {
    8000
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_poll_max_catchup() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            networks: BTreeMap::new(),
            page_size: default_page_size(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_catchup: default_poll_max_catchup(),
            auth_token: None,
        }
    }
}

impl Config {
    pub fn network(&self, name: &str) -> Result<&NetworkConfig, CoreError> {
        self.networks.get(name).ok_or_else(|| {
            CoreError::Configuration(format!("no configuration for network '{name}'"))
        })
    }
}

/// Parse and validate configuration from TOML text, then apply environment
/// overrides (`CHAINLENS_PAGE_SIZE`, `CHAINLENS_RPC_TIMEOUT_MS`,
/// `CHAINLENS_POLL_INTERVAL_MS`, `CHAINLENS_POLL_MAX_CATCHUP`,
/// `CHAINLENS_AUTH_TOKEN`).
pub fn load_from_str(raw: &str) -> Result<Config, CoreError> {
    let mut cfg: Config =
        toml::from_str(raw).map_err(|e| CoreError::Configuration(format!("bad config: {e}")))?;

    // Network names live on the map key; copy them onto the records.
    for (name, net) in cfg.networks.iter_mut() {
        net.name = name.clone();
        for (cap, url) in &net.endpoints {
            validate_url(url, &format!("{name}.{cap}"))?;
        }
    }

    if let Some(v) = env_parse::<usize>("CHAINLENS_PAGE_SIZE") {
        cfg.page_size = v;
    }
    if let Some(v) = env_parse::<u64>("CHAINLENS_RPC_TIMEOUT_MS") {
        cfg.rpc_timeout_ms = v;
    }
    if let Some(v) = env_parse::<u64>("CHAINLENS_POLL_INTERVAL_MS") {
        cfg.poll_interval_ms = v;
    }
    if let Some(v) = env_parse::<u64>("CHAINLENS_POLL_MAX_CATCHUP") {
        cfg.poll_max_catchup = v;
    }
    if let Ok(tok) = env::var("CHAINLENS_AUTH_TOKEN") {
        if !tok.is_empty() {
            cfg.auth_token = Some(tok);
        }
    }

    cfg.page_size = validate_in_range(cfg.page_size, 1, 1000, "page_size")?;
    cfg.rpc_timeout_ms = validate_in_range(cfg.rpc_timeout_ms, 1000, 60000, "rpc_timeout_ms")?;
    cfg.poll_interval_ms = validate_in_range(cfg.poll_interval_ms, 100, 10000, "poll_interval_ms")?;
    cfg.poll_max_catchup = validate_in_range(cfg.poll_max_catchup, 1, 100, "poll_max_catchup")?;

    Ok(cfg)
}

pub fn load_from_path(path: &std::path::Path) -> Result<Config, CoreError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CoreError::Configuration(format!("cannot read {}: {e}", path.display())))?;
    load_from_str(&raw)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Validate that a value is within a given range (inclusive).
fn validate_in_range<T>(val: T, min: T, max: T, name: &str) -> Result<T, CoreError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if val < min || val > max {
        Err(CoreError::Configuration(format!(
            "{name} must be in range [{min}, {max}], got {val}"
        )))
    } else {
        Ok(val)
    }
}

/// Validate URL format (basic scheme check).
fn validate_url(url: &str, name: &str) -> Result<(), CoreError> {
    if url.is_empty() {
        return Err(CoreError::Configuration(format!("{name} URL is empty")));
    }
    if url.starts_with("ws://")
        || url.starts_with("wss://")
        || url.starts_with("http://")
        || url.starts_with("https://")
    {
        Ok(())
    } else {
        Err(CoreError::Configuration(format!(
            "{name} URL must start with ws://, wss://, http://, or https://"
        )))
    }
}
