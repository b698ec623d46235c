use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::profile::DEFAULT_COOLDOWN_DAYS;
use crate::search::{SearchConfig, DEFAULT_DEBOUNCE, DEFAULT_SKELETON_DWELL};

pub const DEFAULT_BIND: &str = "0.0.0.0:3146";
pub const DEFAULT_PROFILE_API_URL: &str = "http://127.0.0.1:3146/api";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    /// Where `app::build_client` sends profile requests; the server ignores it.
    pub profile_api_url: String,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub simulated_delay: bool,
    /// Debounce and skeleton timings for the client-side search controller.
    pub search: SearchConfig,
    pub name_change_cooldown_days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3146)),
            profile_api_url: DEFAULT_PROFILE_API_URL.to_string(),
            cache_ttl: DEFAULT_TTL,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            simulated_delay: false,
            search: SearchConfig::default(),
            name_change_cooldown_days: DEFAULT_COOLDOWN_DAYS,
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        info!(
            "Config: bind={}, cache_ttl={}s, cache_max_entries={}, simulated_delay={}",
            config.bind,
            config.cache_ttl.as_secs(),
            config.cache_max_entries,
            config.simulated_delay
        );
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind: SocketAddr = parse_var(
            &lookup,
            "YOOSTREAM_BIND",
            DEFAULT_BIND.parse().context("Invalid default bind address")?,
        )?;
        let profile_api_url = lookup("PROFILE_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE_API_URL.to_string());
        let ttl_secs: u64 = parse_var(&lookup, "CACHE_TTL_SECS", DEFAULT_TTL.as_secs())?;
        let cache_max_entries: usize =
            parse_var(&lookup, "CACHE_MAX_ENTRIES", DEFAULT_MAX_ENTRIES)?;
        if cache_max_entries == 0 {
            anyhow::bail!("CACHE_MAX_ENTRIES must be at least 1");
        }
        let simulated_delay: bool = parse_var(&lookup, "SIMULATED_DELAY", false)?;
        let debounce_ms: u64 = parse_var(
            &lookup,
            "SEARCH_DEBOUNCE_MS",
            DEFAULT_DEBOUNCE.as_millis() as u64,
        )?;
        let skeleton_ms: u64 = parse_var(
            &lookup,
            "SEARCH_SKELETON_MS",
            DEFAULT_SKELETON_DWELL.as_millis() as u64,
        )?;
        let name_change_cooldown_days: i64 =
            parse_var(&lookup, "NAME_CHANGE_COOLDOWN_DAYS", DEFAULT_COOLDOWN_DAYS)?;

        Ok(Self {
            bind,
            profile_api_url,
            cache_ttl: Duration::from_secs(ttl_secs),
            cache_max_entries,
            simulated_delay,
            search: SearchConfig {
                debounce: Duration::from_millis(debounce_ms),
                skeleton_dwell: Duration::from_millis(skeleton_ms),
            },
            name_change_cooldown_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.bind.port(), 3146);
    }

    #[test]
    fn reads_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("YOOSTREAM_BIND", "127.0.0.1:8080"),
            ("CACHE_TTL_SECS", "30"),
            ("SIMULATED_DELAY", "true"),
            ("SEARCH_DEBOUNCE_MS", "250"),
            ("NAME_CHANGE_COOLDOWN_DAYS", "7"),
        ]))
        .expect("config");
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert!(config.simulated_delay);
        assert_eq!(config.search.debounce, Duration::from_millis(250));
        assert_eq!(config.name_change_cooldown_days, 7);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = AppConfig::from_lookup(lookup(&[("CACHE_TTL_SECS", "five")])).unwrap_err();
        assert!(err.to_string().contains("CACHE_TTL_SECS"));
        assert!(AppConfig::from_lookup(lookup(&[("CACHE_MAX_ENTRIES", "0")])).is_err());
    }
}
