//! Server configuration
//!
//! Bind address from the first CLI argument or `CHAT_RELAY_ADDR`, queue
//! capacities from `CHAT_RELAY_COMMAND_CAPACITY` and
//! `CHAT_RELAY_OUTBOUND_CAPACITY`. Anything unset falls back to a default.

use crate::error::ConfigError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default capacity of the hub command channel
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// Default capacity of each session's outbound queue
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 32;

const ADDR_KEY: &str = "CHAT_RELAY_ADDR";
const COMMAND_CAPACITY_KEY: &str = "CHAT_RELAY_COMMAND_CAPACITY";
const OUTBOUND_CAPACITY_KEY: &str = "CHAT_RELAY_OUTBOUND_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
    pub command_capacity: usize,
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Read from the process arguments and environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_sources(std::env::args().skip(1), |key| std::env::var(key).ok())
    }

    /// Build from explicit arguments (program name excluded) and a variable lookup
    pub fn from_sources<I, F>(mut args: I, lookup: F) -> Result<Self, ConfigError>
    where
        I: Iterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let addr = args
            .next()
            .or_else(|| lookup(ADDR_KEY))
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());

        Ok(Self {
            addr,
            command_capacity: capacity(&lookup, COMMAND_CAPACITY_KEY, DEFAULT_COMMAND_CAPACITY)?,
            outbound_capacity: capacity(&lookup, OUTBOUND_CAPACITY_KEY, DEFAULT_OUTBOUND_CAPACITY)?,
        })
    }
}

/// Parse a positive capacity, tokio channels reject zero
fn capacity<F>(lookup: &F, key: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}
