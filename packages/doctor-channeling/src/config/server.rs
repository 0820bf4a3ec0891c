use super::{DEFAULT_PORT, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::error::{ConfigError, Error};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,

    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,

    #[serde(default = "ServerConfig::default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Browser origins allowed by CORS
    #[serde(default = "ServerConfig::default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: ServerConfig::default_host(),
            port: ServerConfig::default_port(),
            shutdown_timeout: ServerConfig::default_shutdown_timeout(),
            allowed_origins: ServerConfig::default_allowed_origins(),
        }
    }
}

impl ServerConfig {
    pub fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    pub const fn default_port() -> u16 {
        DEFAULT_PORT
    }

    pub const fn default_shutdown_timeout() -> u64 {
        DEFAULT_SHUTDOWN_TIMEOUT
    }

    pub fn default_allowed_origins() -> Vec<String> {
        vec![
            "http://localhost:5173".to_string(),
            "http://localhost:3000".to_string(),
        ]
    }

    pub fn to_socket_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn socket_address(&self) -> Result<SocketAddr, Error> {
        let address = self.to_socket_address();
        let socket_address = address
            .parse()
            .map_err(|_| ConfigError::InvalidServerAddress { address })?;
        Ok(socket_address)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout)
    }
}
