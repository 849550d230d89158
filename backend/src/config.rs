use std::env;
use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Origin that reveal links point at.
    pub public_base_url: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_ADDR {value:?} is not a socket address: {source}")]
    BindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
}

impl Config {
    /// Reads `BIND_ADDR` and `PUBLIC_BASE_URL`, falling back to the defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind
            .parse::<SocketAddr>()
            .map_err(|source| ConfigError::BindAddr {
                value: bind.clone(),
                source,
            })?;
        let public_base_url = lookup("PUBLIC_BASE_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());

        Ok(Self {
            bind_addr,
            public_base_url,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
        }
    }
}
