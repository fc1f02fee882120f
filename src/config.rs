//! Client configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then the
//! `PARLANCHINA_URL` / `PARLANCHINA_MODEL` environment variables, then
//! whatever the caller sets through the builder methods (CLI flags).
//!
//! ```toml
//! base_url = "http://127.0.0.1:5000"
//! model = "gpt-4o-mini"
//! connect_timeout_secs = 3
//! request_timeout_secs = 30
//! title_poll_interval_secs = 2
//! title_poll_max_secs = 30
//! theme_file = "/home/me/.config/parlanchina/theme.toml"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ClientError, Result};

pub const ENV_CONFIG: &str = "PARLANCHINA_CONFIG";
pub const ENV_URL: &str = "PARLANCHINA_URL";
pub const ENV_MODEL: &str = "PARLANCHINA_MODEL";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Runtime settings for [`crate::client::ChatClient`] and the widgets.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend root, without trailing slash.
    pub base_url: String,
    /// Model identifier sent with messages; empty lets the backend choose.
    pub model: String,
    pub connect_timeout: Duration,
    /// Timeout for non-streaming requests. Streams have none.
    pub request_timeout: Duration,
    pub title_poll_interval: Duration,
    pub title_poll_max: Duration,
    /// Where the theme preference is persisted.
    pub theme_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: String::new(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            title_poll_interval: Duration::from_secs(2),
            title_poll_max: Duration::from_secs(30),
            theme_file: None,
        }
    }
}

/// On-disk shape; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    model: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    title_poll_interval_secs: Option<u64>,
    title_poll_max_secs: Option<u64>,
    theme_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().base_url(base_url)
    }

    /// Defaults → file (explicit path, else `$PARLANCHINA_CONFIG`) → env.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        let env_path = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
        if let Some(path) = path.map(Path::to_path_buf).or(env_path) {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                ClientError::Config(format!("cannot read {}: {e}", path.display()))
            })?;
            config = config.merge_toml(&text)?;
            debug!(path = %path.display(), "loaded config file");
        }
        Ok(config.apply_env(|key| std::env::var(key).ok()))
    }

    /// Overlay the fields present in a TOML document.
    pub fn merge_toml(mut self, text: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))?;
        if let Some(url) = file.base_url {
            self = self.base_url(url);
        }
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.title_poll_interval_secs {
            if secs == 0 {
                return Err(ClientError::Config("title_poll_interval_secs must be > 0".into()));
            }
            self.title_poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.title_poll_max_secs {
            self.title_poll_max = Duration::from_secs(secs);
        }
        if file.theme_file.is_some() {
            self.theme_file = file.theme_file;
        }
        Ok(self)
    }

    /// Apply `PARLANCHINA_URL` / `PARLANCHINA_MODEL` via `lookup`.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_URL).filter(|v| !v.trim().is_empty()) {
            self = self.base_url(url);
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.model = model;
        }
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn title_poll(mut self, interval: Duration, max: Duration) -> Self {
        self.title_poll_interval = interval;
        self.title_poll_max = max;
        self
    }

    pub fn theme_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.theme_file = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_backend_contract() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.title_poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.title_poll_max, Duration::from_secs(30));
        assert!(cfg.model.is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let cfg = ClientConfig::new("http://example.com:8080/");
        assert_eq!(cfg.base_url, "http://example.com:8080");
    }

    #[test]
    fn test_toml_overlays_only_present_fields() {
        let cfg = ClientConfig::default()
            .merge_toml("model = \"gpt-4o\"\nrequest_timeout_secs = 5\n")
            .unwrap();
        assert_eq!(cfg.model, "gpt-4o");
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_toml_unknown_key_is_rejected() {
        let err = ClientConfig::default().merge_toml("colour = \"red\"").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        assert!(ClientConfig::default().merge_toml("title_poll_interval_secs = 0").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> =
            [(ENV_URL, "http://10.0.0.2:5000/"), (ENV_MODEL, "local-llm")].into_iter().collect();
        let cfg = ClientConfig::default()
            .merge_toml("base_url = \"http://file:1\"")
            .unwrap()
            .apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.base_url, "http://10.0.0.2:5000");
        assert_eq!(cfg.model, "local-llm");
    }

    #[test]
    fn test_blank_env_url_is_ignored() {
        let cfg = ClientConfig::default().apply_env(|k| (k == ENV_URL).then(|| "  ".to_string()));
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_load_reads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = \"http://saved:9000\"").unwrap();
        writeln!(file, "title_poll_max_secs = 10").unwrap();
        let cfg = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.title_poll_max, Duration::from_secs(10));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = ClientConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
