use std::time::Duration;

use serde::Deserialize;

/// Top-level service configuration.
///
/// Loaded from the YAML file named by the `WHARF_CONFIG` environment
/// variable; every field has a default so the stack comes up with no
/// config file at all.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub ftp: FtpConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen_addr: String,
    /// Root directory for static file serving; empty disables it.
    pub static_root: String,
    /// Idle timeout for plain HTTP connections, in seconds.
    pub idle_timeout_secs: u64,
    /// Idle timeout applied after a WebSocket upgrade, in seconds.
    pub ws_timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    pub listen_addr: String,
    pub user: String,
    pub password: String,
    pub home_dir: String,
    /// Idle timeout for the control connection, in seconds.
    pub idle_timeout_secs: u64,
    /// Inclusive passive-mode data port range.
    pub passive_port_min: u16,
    pub passive_port_max: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:80".to_string(),
            static_root: "/www".to_string(),
            idle_timeout_secs: 3,
            ws_timeout_secs: 3600,
        }
    }
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:21".to_string(),
            user: "admin".to_string(),
            password: "admin".to_string(),
            home_dir: "/".to_string(),
            idle_timeout_secs: 300,
            passive_port_min: 2048,
            passive_port_max: 2080,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            ftp: FtpConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `WHARF_CONFIG`, falling back to defaults
    /// when the variable is unset or the file cannot be parsed.
    pub fn load() -> Self {
        let Ok(path) = std::env::var("WHARF_CONFIG") else {
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => match serde_yaml::from_str(&text) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Bad config file, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Config file unreadable, using defaults");
                Self::default()
            }
        }
    }
}

impl HttpConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn ws_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_timeout_secs)
    }
}

impl FtpConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
