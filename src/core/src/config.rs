use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{NodeError, Result};

/// Device manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directory holding the working compose files
    pub working_dir: PathBuf,

    /// Directory holding the canonical compose templates
    pub canonical_dir: PathBuf,

    /// Directory holding the launch script
    pub launch_dir: PathBuf,

    /// Launch script file name (same in both directories)
    pub launch_script: String,

    /// Persisted settings file
    pub settings_file: PathBuf,

    /// Device user credential file
    pub credential_file: PathBuf,

    /// Hostname file written by the anonymity-network service
    pub hidden_service_file: PathBuf,

    /// Public key exported to the node API for token verification
    pub jwt_public_key_file: Option<PathBuf>,

    /// Private key used to sign node API tokens
    pub jwt_private_key_file: Option<PathBuf>,

    /// Image tag selector (e.g. `arm`, `x86`)
    pub image_tag: String,

    /// Registry organisation prefix of managed images
    pub image_org: String,

    /// Base URL of the node API
    pub node_api_url: String,

    /// Interface probed for the LAN address
    pub lan_interface: String,

    /// Fallback host address when the probe returns a bridge address
    pub device_host: Option<String>,

    /// Device serial number
    pub serial: String,

    /// Skip template reconciliation
    pub disable_template_update: bool,

    /// Registry login secret for the worker account
    pub worker_password: Option<String>,

    /// Registry login secret for the builder account
    pub builder_password: Option<String>,

    /// Log level
    pub log_level: LogLevel,

    /// Intervals and backoffs
    pub timings: Timings,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("/usr/local/casa/applications"),
            canonical_dir: PathBuf::from("./resources"),
            launch_dir: PathBuf::from("/usr/local/casa"),
            launch_script: "launch.sh".to_string(),
            settings_file: PathBuf::from("/settings/settings.json"),
            credential_file: PathBuf::from("/accounts/user.json"),
            hidden_service_file: PathBuf::from("/var/lib/tor/casa-node/hostname"),
            jwt_public_key_file: None,
            jwt_private_key_file: None,
            image_tag: "arm".to_string(),
            image_org: "casanode".to_string(),
            node_api_url: "http://127.0.0.1:3002".to_string(),
            lan_interface: "eth0".to_string(),
            device_host: None,
            serial: "UNKNOWN".to_string(),
            disable_template_update: false,
            worker_password: None,
            builder_password: None,
            log_level: LogLevel::Info,
            timings: Timings::default(),
        }
    }
}

impl ManagerConfig {
    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            NodeError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            NodeError::ConfigError(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// Overlay the environment variables set by the device image.
    pub fn with_env(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup.
    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = non_empty("SETTINGS_FILE") {
            self.settings_file = PathBuf::from(v);
        }
        if let Some(v) = non_empty("USER_PASSWORD_FILE") {
            self.credential_file = PathBuf::from(v);
        }
        if let Some(v) = non_empty("CANONICAL_YML_DIRECTORY") {
            self.canonical_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty("JWT_PUBLIC_KEY_FILE") {
            self.jwt_public_key_file = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty("JWT_PRIVATE_KEY_FILE") {
            self.jwt_private_key_file = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty("TAG") {
            self.image_tag = v;
        }
        if let Some(v) = non_empty("SERIAL") {
            self.serial = v;
        }
        if let Some(v) = non_empty("DISABLE_YML_UPDATE") {
            self.disable_template_update = v == "true";
        }
        if let Some(v) = non_empty("DEVICE_HOST") {
            self.device_host = Some(v);
        }
        if let Some(v) = non_empty("CASAWORKER_PASSWORD") {
            self.worker_password = Some(v);
        }
        if let Some(v) = non_empty("CASABUILDER_PASSWORD") {
            self.builder_password = Some(v);
        }
        if let Some(v) = non_empty("NODE_API_URL") {
            self.node_api_url = v;
        }
        if let Some(v) = non_empty("LAN_INTERFACE") {
            self.lan_interface = v;
        }
        self
    }

    /// Environment-only configuration.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }
}

/// Intervals and backoffs of the orchestration workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Sleep between failed boot attempts (seconds)
    pub boot_backoff_secs: u64,
    /// Address-drift task period (seconds)
    pub address_check_secs: u64,
    /// Keep-alive task period (seconds)
    pub keep_alive_secs: u64,
    /// Image pre-fetch task period (seconds)
    pub image_pull_secs: u64,
    /// Version filtering window after a successful pull (seconds)
    pub pull_debounce_secs: u64,
    /// Sleep between wallet unlock attempts (seconds)
    pub unlock_backoff_secs: u64,
    /// Sleep between password-change attempts while the node boots (milliseconds)
    pub password_retry_ms: u64,
    /// Sleep between hidden-service hostname polls (seconds)
    pub hidden_service_poll_secs: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            boot_backoff_secs: 10,
            address_check_secs: 5 * 60,
            keep_alive_secs: 60 * 60,
            image_pull_secs: 60 * 60,
            pull_debounce_secs: 90 * 60,
            unlock_backoff_secs: 10,
            password_retry_ms: 1000,
            hidden_service_poll_secs: 10,
        }
    }
}

impl Timings {
    pub fn boot_backoff(&self) -> Duration {
        Duration::from_secs(self.boot_backoff_secs)
    }

    pub fn address_check(&self) -> Duration {
        Duration::from_secs(self.address_check_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn image_pull(&self) -> Duration {
        Duration::from_secs(self.image_pull_secs)
    }

    pub fn pull_debounce(&self) -> Duration {
        Duration::from_secs(self.pull_debounce_secs)
    }

    pub fn unlock_backoff(&self) -> Duration {
        Duration::from_secs(self.unlock_backoff_secs)
    }

    pub fn password_retry(&self) -> Duration {
        Duration::from_millis(self.password_retry_ms)
    }

    pub fn hidden_service_poll(&self) -> Duration {
        Duration::from_secs(self.hidden_service_poll_secs)
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string for an env filter.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_timings() {
        let timings = Timings::default();
        assert_eq!(timings.boot_backoff(), Duration::from_secs(10));
        assert_eq!(timings.address_check(), Duration::from_secs(300));
        assert_eq!(timings.keep_alive(), Duration::from_secs(3600));
        assert_eq!(timings.image_pull(), Duration::from_secs(3600));
        assert_eq!(timings.pull_debounce(), Duration::from_secs(5400));
        assert_eq!(timings.password_retry(), Duration::from_secs(1));
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            ("SETTINGS_FILE", "/tmp/settings.json"),
            ("TAG", "x86"),
            ("DISABLE_YML_UPDATE", "true"),
            ("SERIAL", "CASA-0042"),
            ("CASAWORKER_PASSWORD", "secret"),
            ("NODE_API_URL", ""),
        ]
        .into_iter()
        .collect();

        let config = ManagerConfig::default()
            .with_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.settings_file, PathBuf::from("/tmp/settings.json"));
        assert_eq!(config.image_tag, "x86");
        assert!(config.disable_template_update);
        assert_eq!(config.serial, "CASA-0042");
        assert_eq!(config.worker_password.as_deref(), Some("secret"));
        assert!(config.builder_password.is_none());
        // Empty values keep the default.
        assert_eq!(config.node_api_url, "http://127.0.0.1:3002");
    }

    #[test]
    fn test_disable_flag_requires_literal_true() {
        let config = ManagerConfig::default().with_lookup(|key| {
            (key == "DISABLE_YML_UPDATE").then(|| "1".to_string())
        });
        assert!(!config.disable_template_update);
    }

    #[test]
    fn test_from_file_partial() {
        let dir = std::env::temp_dir().join(format!("nodebox-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(
            &path,
            r#"{"image_tag": "x86", "timings": {"keep_alive_secs": 60}, "log_level": "debug"}"#,
        )
        .unwrap();

        let config = ManagerConfig::from_file(&path).unwrap();
        assert_eq!(config.image_tag, "x86");
        assert_eq!(config.timings.keep_alive_secs, 60);
        assert_eq!(config.timings.boot_backoff_secs, 10);
        assert_eq!(config.log_level, LogLevel::Debug);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_from_file_missing() {
        let err = ManagerConfig::from_file(std::path::Path::new("/nonexistent/nodebox.json"))
            .unwrap_err();
        assert!(matches!(err, NodeError::ConfigError(_)));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(tracing::Level::from(LogLevel::Debug), tracing::Level::DEBUG);
        assert_eq!(tracing::Level::from(LogLevel::Info), tracing::Level::INFO);
    }
}
