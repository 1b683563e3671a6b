use crate::error::{DashboardError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3710";
pub const DEFAULT_DEBOUNCE_MS: u64 = 4_000;
pub const CONFIG_PATH_ENV: &str = "IRRIGATION_CONFIG_PATH";

/// Runtime settings. Resolved as defaults, then the JSON file named by
/// `IRRIGATION_CONFIG_PATH`, then the `API_URL`, `SOCKET_URL`,
/// `DEBOUNCE_MS` and `EXPORT_DIR` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub api_url: String,
    /// Derived from `api_url` when unset.
    pub socket_url: Option<String>,
    pub debounce_ms: u64,
    pub export_dir: PathBuf,
    /// Defaults to `<data dir>/irrigation-dashboard/storage.json`.
    pub session_path: Option<PathBuf>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            export_dir: PathBuf::from("."),
            session_path: None,
        }
    }
}

impl DashboardConfig {
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&PathBuf::from(path))?,
            Err(_) => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DashboardError::Config(format!("failed to read config file {path:?}: {e}"))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| DashboardError::Config(format!("invalid config JSON: {e}")))
    }

    pub fn apply_env<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("API_URL") {
            self.api_url = v;
        }
        if let Some(v) = get("SOCKET_URL") {
            self.socket_url = Some(v);
        }
        if let Some(v) = get("DEBOUNCE_MS") {
            self.debounce_ms = v
                .trim()
                .parse()
                .map_err(|e| DashboardError::Config(format!("DEBOUNCE_MS {v:?}: {e}")))?;
        }
        if let Some(v) = get("EXPORT_DIR") {
            self.export_dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Scheme + host[:port], no trailing slash.
    pub fn base_http(&self) -> String {
        let base = normalize_base_url(self.api_url.clone());
        if base.is_empty() {
            return DEFAULT_API_URL.to_string();
        }
        base
    }

    /// ws/wss scheme + host[:port] (no path).
    pub fn base_ws(&self) -> String {
        let base = match &self.socket_url {
            Some(url) if !url.trim().is_empty() => normalize_base_url(url.clone()),
            _ => self.base_http(),
        };

        if base.starts_with("https://") {
            base.replacen("https://", "wss://", 1)
        } else if base.starts_with("http://") {
            base.replacen("http://", "ws://", 1)
        } else if base.starts_with("wss://") || base.starts_with("ws://") {
            base
        } else {
            format!("ws://{base}")
        }
    }

    pub fn push_url(&self) -> String {
        format!("{}/ws", self.base_ws())
    }

    pub fn session_path(&self) -> PathBuf {
        if let Some(path) = &self.session_path {
            return path.clone();
        }
        let mut base = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| ".".into()));
        base.push("irrigation-dashboard");
        base.push("storage.json");
        base
    }
}

/// Drops any fragment and path, and the trailing slash.
pub fn normalize_base_url(mut url: String) -> String {
    url = url.trim().to_string();
    if let Some(idx) = url.find('#') {
        url.truncate(idx);
    }
    if let Some(scheme_end) = url.find("://") {
        let rest = &url[scheme_end + 3..];
        if let Some(slash) = rest.find('/') {
            url.truncate(scheme_end + 3 + slash);
        }
    }
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn normalizes_urls() {
        assert_eq!(
            normalize_base_url("http://10.0.0.2:3710/app/#x".into()),
            "http://10.0.0.2:3710"
        );
        assert_eq!(normalize_base_url("https://farm.io/".into()), "https://farm.io");
        assert_eq!(normalize_base_url(" localhost:3000 ".into()), "localhost:3000");
    }

    #[test]
    fn socket_url_follows_api_url() {
        let mut cfg = DashboardConfig {
            api_url: "https://farm.io/api".into(),
            ..Default::default()
        };
        assert_eq!(cfg.base_ws(), "wss://farm.io");
        assert_eq!(cfg.push_url(), "wss://farm.io/ws");

        cfg.socket_url = Some("ws://push.farm.io:9000/".into());
        assert_eq!(cfg.base_ws(), "ws://push.farm.io:9000");

        cfg.socket_url = Some("push.farm.io".into());
        assert_eq!(cfg.base_ws(), "ws://push.farm.io");
    }

    #[test]
    fn env_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            ("API_URL", "http://127.0.0.1:9999"),
            ("DEBOUNCE_MS", "250"),
            ("EXPORT_DIR", "/tmp/exports"),
        ]
        .into_iter()
        .collect();

        let mut cfg = DashboardConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.base_http(), "http://127.0.0.1:9999");
        assert_eq!(cfg.debounce(), Duration::from_millis(250));
        assert_eq!(cfg.export_dir, PathBuf::from("/tmp/exports"));
        assert_eq!(cfg.socket_url, None);
    }

    #[test]
    fn bad_debounce_is_a_config_error() {
        let mut cfg = DashboardConfig::default();
        let err = cfg
            .apply_env(|k| (k == "DEBOUNCE_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, DashboardError::Config(_)));
    }

    #[test]
    fn config_file_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.json");
        std::fs::write(&path, r#"{ "api_url": "http://farm.local:3710", "debounce_ms": 1000 }"#)
            .unwrap();

        let cfg = DashboardConfig::from_file(&path).unwrap();
        assert_eq!(cfg.api_url, "http://farm.local:3710");
        assert_eq!(cfg.debounce_ms, 1000);
        assert_eq!(cfg.export_dir, PathBuf::from("."));
    }
}
