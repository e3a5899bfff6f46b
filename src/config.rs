//! JSON configuration.
//!
//! Missing fields fall back to [`Config::default`], so a file only needs to
//! mention what it changes.

use std::fmt;
use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid port in config: {0}")]
    InvalidPort(u16),

    #[error("invalid bind ip in config: {0}")]
    InvalidBindIp(String),

    #[error("invalid chain logic in config: {0}")]
    InvalidChainLogic(String),

    #[error("idle timeout must be at least one second")]
    InvalidIdleTimeout,

    #[error("config io error: {0}")]
    Io(#[from] io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One address to accept SOCKS clients on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenEndpoint {
    pub bind_ip: String,
    pub port: u16,
    #[serde(rename = "enable_socks_4")]
    pub enable_socks4: bool,
    #[serde(rename = "enable_socks_5")]
    pub enable_socks5: bool,
}

impl ListenEndpoint {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_ip, self.port)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        if IpAddr::from_str(&self.bind_ip).is_err() {
            return Err(ConfigError::InvalidBindIp(self.bind_ip.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for ListenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bind_ip, self.port)
    }
}

/// How a chain picks its next entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ChainPolicy {
    Random,
    Sequence,
}

impl TryFrom<String> for ChainPolicy {
    type Error = ConfigError;

    fn try_from(logic: String) -> Result<Self, Self::Error> {
        ChainPolicy::from_str(&logic).map_err(|_| ConfigError::InvalidChainLogic(logic))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub host: String,
    pub port: u16,
}

/// Ordered upstream proxies plus a selection policy.
///
/// Loaded and validated, but no session resolves a chain yet: every
/// connection goes to [`Config::tunnel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub logic: ChainPolicy,
    pub entries: Vec<ChainEntry>,
}

/// The fixed next hop every session dials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub host: String,
    pub port: u16,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9050,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listeners: Vec<ListenEndpoint>,
    pub chains: Vec<Chain>,
    pub tunnel: TunnelConfig,
    pub idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listeners: vec![ListenEndpoint {
                bind_ip: "127.0.0.1".into(),
                port: 4242,
                enable_socks4: true,
                enable_socks5: true,
            }],
            chains: vec![Chain {
                logic: ChainPolicy::Random,
                entries: vec![ChainEntry {
                    host: "127.0.0.1".into(),
                    port: 9050,
                }],
            }],
            tunnel: TunnelConfig::default(),
            idle_timeout_secs: 120,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read `path`; when it does not exist and `create` is set, write the
    /// default config there and use it.
    pub fn load_or_create(path: impl AsRef<Path>, create: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match Self::read(path) {
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound && create => {
                tracing::info!("config file '{}' doesn't exist yet, creating", path.display());
                let config = Config::default();
                config.write(path)?;
                Ok(config)
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for listener in &self.listeners {
            listener.validate()?;
        }
        if self.tunnel.port == 0 {
            return Err(ConfigError::InvalidPort(self.tunnel.port));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidIdleTimeout);
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_survives_json() {
        let config = Config::default();
        let json = config.to_json().unwrap();
        assert!(json.contains("\"enable_socks_4\": true"));
        assert!(json.contains("\"logic\": \"random\""));
        assert_eq!(Config::from_json(&json).unwrap(), config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = Config::from_json(
            r#"{"listeners": [{"bind_ip": "0.0.0.0", "port": 1080,
                 "enable_socks_4": false, "enable_socks_5": true}]}"#,
        )
        .unwrap();
        assert_eq!(config.listeners[0].addr(), "0.0.0.0:1080");
        assert!(!config.listeners[0].enable_socks4);
        assert_eq!(config.chains, Config::default().chains);
        assert_eq!(config.tunnel.port, 9050);
        assert_eq!(config.idle_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = Config::default();
        config.listeners[0].port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort(0))));
    }

    #[test]
    fn bind_ip_must_be_an_address() {
        let mut config = Config::default();
        config.listeners[0].bind_ip = "localhost".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBindIp(_))
        ));
    }

    #[test]
    fn chain_logic_is_checked() {
        assert_eq!("sequence".parse::<ChainPolicy>().unwrap(), ChainPolicy::Sequence);
        assert_eq!(ChainPolicy::Random.to_string(), "random");

        let err = Config::from_json(r#"{"chains": [{"logic": "roundrobin", "entries": []}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("roundrobin"));
    }

    #[test]
    fn load_or_create_writes_default() {
        let dir = std::env::temp_dir().join(format!("sockschain-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let _ = fs::remove_file(&path);

        assert!(matches!(
            Config::load_or_create(&path, false),
            Err(ConfigError::Io(_))
        ));

        let created = Config::load_or_create(&path, true).unwrap();
        assert_eq!(created, Config::default());
        assert_eq!(Config::read(&path).unwrap(), created);

        fs::remove_dir_all(&dir).unwrap();
    }
}
