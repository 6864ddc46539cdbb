use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Set via IDEAHUB_STORE (`postgres` | `memory`). Default: postgres.
    pub store: StoreBackend,
    /// Enables cross-instance realtime fan-out when set.
    pub redis_url: Option<String>,
    /// Shared key required on `/api/v1` when set.
    pub service_key: Option<String>,
    /// Full FCM HTTP v1 send URL. Push is disabled when unset.
    pub fcm_endpoint: Option<String>,
    pub fcm_access_token: Option<String>,
    /// Set via IDEAHUB_PUSH_TIMEOUT_SECS. Default: 10.
    pub push_timeout_secs: u64,
    /// Read notifications older than this are purged hourly.
    /// Unset means indefinite retention.
    pub read_retention_days: Option<u32>,
    pub cors_origin: String,
}

impl Config {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    /// FCM endpoint and credential, only when both are present.
    pub fn fcm(&self) -> Option<(&str, &str)> {
        match (&self.fcm_endpoint, &self.fcm_access_token) {
            (Some(url), Some(token)) => Some((url.as_str(), token.as_str())),
            _ => None,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a config from any key lookup. `load()` passes the process
/// environment; tests pass a map.
pub fn from_lookup<F>(get: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let store = match get("IDEAHUB_STORE").as_deref().map(str::trim) {
        None | Some("") | Some("postgres") => StoreBackend::Postgres,
        Some("memory") => StoreBackend::Memory,
        Some(other) => anyhow::bail!(
            "IDEAHUB_STORE must be 'postgres' or 'memory', got '{}'",
            other
        ),
    };

    let non_empty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let fcm_endpoint = non_empty("IDEAHUB_FCM_ENDPOINT");
    let fcm_access_token = non_empty("IDEAHUB_FCM_ACCESS_TOKEN");
    if fcm_endpoint.is_some() != fcm_access_token.is_some() {
        tracing::warn!(
            "only one of IDEAHUB_FCM_ENDPOINT / IDEAHUB_FCM_ACCESS_TOKEN is set, push delivery disabled"
        );
    }

    Ok(Config {
        port: get("IDEAHUB_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000),
        database_url: get("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/ideahub".into()),
        store,
        redis_url: non_empty("REDIS_URL"),
        service_key: non_empty("IDEAHUB_SERVICE_KEY"),
        fcm_endpoint,
        fcm_access_token,
        push_timeout_secs: get("IDEAHUB_PUSH_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10),
        read_retention_days: get("IDEAHUB_READ_RETENTION_DAYS")
            .and_then(|v| v.parse().ok())
            .filter(|d| *d > 0),
        cors_origin: get("IDEAHUB_CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.store, StoreBackend::Postgres);
        assert!(cfg.redis_url.is_none());
        assert!(cfg.fcm().is_none());
        assert!(cfg.read_retention_days.is_none());
        assert_eq!(cfg.push_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_memory_store_and_push() {
        let cfg = from_lookup(lookup(&[
            ("IDEAHUB_STORE", "memory"),
            ("IDEAHUB_FCM_ENDPOINT", "https://fcm.example/v1/projects/p/messages:send"),
            ("IDEAHUB_FCM_ACCESS_TOKEN", "tok"),
            ("IDEAHUB_READ_RETENTION_DAYS", "30"),
        ]))
        .unwrap();
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert!(cfg.fcm().is_some());
        assert_eq!(cfg.read_retention_days, Some(30));
    }

    #[test]
    fn test_zero_retention_means_disabled() {
        let cfg = from_lookup(lookup(&[("IDEAHUB_READ_RETENTION_DAYS", "0")])).unwrap();
        assert!(cfg.read_retention_days.is_none());
    }

    #[test]
    fn test_unknown_store_is_rejected() {
        assert!(from_lookup(lookup(&[("IDEAHUB_STORE", "mongo")])).is_err());
    }

    #[test]
    fn test_half_configured_push_is_disabled() {
        let cfg = from_lookup(lookup(&[("IDEAHUB_FCM_ENDPOINT", "https://x")])).unwrap();
        assert!(cfg.fcm().is_none());
    }
}
