//! Configuration management for ftp-mirror
//!
//! Both binaries load their settings the same way: built-in defaults, then an
//! optional TOML file (`ftp-mirror.toml` for the server, `ftp-mirror-client.toml`
//! for the client), then environment overrides. The server reads
//! `FTP_MIRROR__*` variables and the client reads `FTP_MIRROR_CLIENT__*`,
//! e.g. `FTP_MIRROR__CONTROL_PORT=2221`.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::TextEncoding;
use crate::server::accounts::Permissions;

pub const DEFAULT_CONFIG_FILE: &str = "ftp-mirror";
pub const DEFAULT_CLIENT_CONFIG_FILE: &str = "ftp-mirror-client";

const SERVER_ENV_PREFIX: &str = "FTP_MIRROR";
const CLIENT_ENV_PREFIX: &str = "FTP_MIRROR_CLIENT";

/// Room for the longest command verb plus a short argument.
const MIN_COMMAND_LENGTH: usize = 64;

/// Server settings, passed once to `Server::bind`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    // ═══ NETWORK ═══
    /// IP address to bind the control connection
    pub bind_address: String,

    /// Port for the control connection; 0 picks a free port
    pub control_port: u16,

    /// Port range for PASV listeners; `0..=0` uses ephemeral ports
    pub passive_port_min: u16,
    pub passive_port_max: u16,

    /// How long a PASV listener waits for the client to connect
    pub data_timeout_secs: u64,

    // ═══ SESSION ═══
    pub banner: String,
    pub encoding: TextEncoding,
    pub max_command_length: usize,
    pub max_connections: usize,
    pub max_connections_per_ip: usize,

    // ═══ ACCOUNTS ═══
    pub users: Vec<UserConfig>,
    pub anonymous: Option<AnonymousConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    pub home: String,
    pub perm: String,
}

/// Anonymous login ("anonymous" or "ftp", any password).
#[derive(Debug, Deserialize, Clone)]
pub struct AnonymousConfig {
    pub home: String,
    pub perm: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            control_port: 2121,
            passive_port_min: 0,
            passive_port_max: 0,
            data_timeout_secs: 30,
            banner: "FTP Server is ready.".to_string(),
            encoding: TextEncoding::Utf8,
            max_command_length: 512,
            max_connections: 256,
            max_connections_per_ip: 5,
            users: vec![UserConfig {
                username: "user".to_string(),
                password: "12345".to_string(),
                home: "ftp_data/user".to_string(),
                perm: "elradfmwMT".to_string(),
            }],
            anonymous: Some(AnonymousConfig {
                home: "ftp_data/anonymous".to_string(),
                perm: "elr".to_string(),
            }),
        }
    }
}

impl ServerConfig {
    /// Load from `ftp-mirror.toml` (if present) with environment overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(SERVER_ENV_PREFIX).separator("__"))
            .build()?;
        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(config::ConfigError::Message(format!(
                "bind_address is not an IP address: {}",
                self.bind_address
            )));
        }

        if self.passive_port_min > self.passive_port_max {
            return Err(config::ConfigError::Message(
                "passive_port_min must not exceed passive_port_max".into(),
            ));
        }

        if self.passive_port_min == 0 && self.passive_port_max != 0 {
            return Err(config::ConfigError::Message(
                "passive port range must be 0..0 or start above 0".into(),
            ));
        }

        if self.max_connections == 0 || self.max_connections_per_ip == 0 {
            return Err(config::ConfigError::Message(
                "connection limits must be greater than 0".into(),
            ));
        }

        if self.max_command_length < MIN_COMMAND_LENGTH {
            return Err(config::ConfigError::Message(format!(
                "max_command_length must be at least {}",
                MIN_COMMAND_LENGTH
            )));
        }

        if self.users.is_empty() && self.anonymous.is_none() {
            return Err(config::ConfigError::Message(
                "at least one user or the anonymous account is required".into(),
            ));
        }

        for user in &self.users {
            if user.username.trim().is_empty() || user.home.is_empty() {
                return Err(config::ConfigError::Message(
                    "users need a username and a home directory".into(),
                ));
            }
            Permissions::parse(&user.perm).map_err(|e| {
                config::ConfigError::Message(format!("user {}: {}", user.username, e))
            })?;
        }

        if let Some(anonymous) = &self.anonymous {
            Permissions::parse(&anonymous.perm)
                .map_err(|e| config::ConfigError::Message(format!("anonymous: {}", e)))?;
        }

        Ok(())
    }

    /// Get bind address and control port as a socket address string
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    /// Port range for PASV listeners, `None` for ephemeral ports
    pub fn passive_ports(&self) -> Option<std::ops::RangeInclusive<u16>> {
        if self.passive_port_min == 0 {
            None
        } else {
            Some(self.passive_port_min..=self.passive_port_max)
        }
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_secs)
    }

    /// Every home directory named by the configuration.
    pub fn home_directories(&self) -> Vec<PathBuf> {
        let mut homes: Vec<PathBuf> = self.users.iter().map(|u| PathBuf::from(&u.home)).collect();
        if let Some(anonymous) = &self.anonymous {
            homes.push(PathBuf::from(&anonymous.home));
        }
        homes
    }
}

/// Client settings used by the `ftp-mirror` binary.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout_secs: u64,
    pub encoding: TextEncoding,
    pub max_depth: usize,
    pub prefer_structured_listing: bool,
    pub atomic_downloads: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2121,
            username: "user".to_string(),
            password: "12345".to_string(),
            connect_timeout_secs: 10,
            encoding: TextEncoding::Utf8,
            max_depth: crate::transfer::DEFAULT_MAX_DEPTH,
            prefer_structured_listing: true,
            atomic_downloads: false,
        }
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(DEFAULT_CLIENT_CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(CLIENT_ENV_PREFIX).separator("__"))
            .build()?;
        let config: ClientConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.host.trim().is_empty() {
            return Err(config::ConfigError::Message("host cannot be empty".into()));
        }
        if self.port == 0 {
            return Err(config::ConfigError::Message("port cannot be 0".into()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.max_depth == 0 {
            return Err(config::ConfigError::Message(
                "max_depth must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn walk_options(&self) -> crate::transfer::WalkOptions {
        crate::transfer::WalkOptions {
            max_depth: self.max_depth,
            prefer_structured: self.prefer_structured_listing,
            atomic_downloads: self.atomic_downloads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.control_socket(), "0.0.0.0:2121");
        assert!(config.passive_ports().is_none());
        assert_eq!(config.home_directories().len(), 2);
    }

    #[test]
    fn test_server_rejects_bad_permissions() {
        let mut config = ServerConfig::default();
        config.users[0].perm = "elrX".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_rejects_tiny_command_limit() {
        let mut config = ServerConfig::default();
        config.max_command_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_rejects_inverted_port_range() {
        let mut config = ServerConfig::default();
        config.passive_port_min = 60010;
        config.passive_port_max = 60000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.walk_options().max_depth, 64);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ServerConfig::load_from("/nonexistent/ftp-mirror-test").unwrap();
        assert_eq!(config.control_port, 2121);
        assert_eq!(config.users[0].username, "user");
    }
}
