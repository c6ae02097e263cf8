//! # Configuration
//!
//! Application settings, layered from built-in defaults, an optional
//! config file and `JOLT_`-prefixed environment variables (nested keys use
//! a double underscore, e.g. `JOLT_SERVER__PORT=9000`).

use crate::error::{Error, Result};
use crate::router::TrailingSlash;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Treat `/users/` and `/users` as different paths
    #[serde(default)]
    pub strict_slashes: bool,
    /// Transport settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Transport settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Largest accepted request body, in bytes
    pub max_body_size: usize,
    /// Seconds to wait for in-flight requests on shutdown
    pub shutdown_timeout_secs: u64,
    /// HTTP keep-alive
    pub keep_alive: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_body_size: 1024 * 1024,
            shutdown_timeout_secs: 30,
            keep_alive: true,
        }
    }
}

impl ServerSettings {
    /// Parsed bind address
    ///
    /// # Errors
    ///
    /// `Error::Config` when host and port do not form a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().map_err(|e| {
            Error::Config(config::ConfigError::Message(format!(
                "invalid address {}:{}: {e}",
                self.host, self.port
            )))
        })
    }

    /// Shutdown drain timeout
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "jolt_core=info".to_string(),
            json: true,
        }
    }
}

impl AppConfig {
    /// Load settings from `path` (extension optional, file may be absent)
    /// and the environment.
    ///
    /// # Errors
    ///
    /// `Error::Config` when a source cannot be read or a value has the wrong type.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("JOLT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Router policy derived from `strict_slashes`
    #[must_use]
    pub const fn trailing_slash(&self) -> TrailingSlash {
        TrailingSlash::from_strict(self.strict_slashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(!config.strict_slashes);
        assert_eq!(config.trailing_slash(), TrailingSlash::Lenient);
        assert_eq!(config.server.port, 8000);
        assert_eq!(
            config.server.socket_addr().unwrap(),
            "127.0.0.1:8000".parse().unwrap()
        );
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load("/nonexistent/jolt-config").unwrap();
        assert_eq!(config.server.max_body_size, 1024 * 1024);
        assert_eq!(config.server.shutdown_timeout(), Duration::from_secs(30));
        assert!(config.log.json);
    }

    #[test]
    fn test_load_toml_file() {
        let path = std::env::temp_dir().join(format!("jolt-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "strict_slashes = true\n[server]\nport = 9100\n[log]\njson = false"
        )
        .unwrap();

        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.trailing_slash(), TrailingSlash::Strict);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(!config.log.json);
    }

    #[test]
    fn test_invalid_address() {
        let settings = ServerSettings {
            host: "not a host".to_string(),
            ..ServerSettings::default()
        };
        assert!(matches!(settings.socket_addr(), Err(Error::Config(_))));
    }
}
