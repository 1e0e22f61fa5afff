//! Client configuration.
//!
//! Connection parameters are passed in per client; nothing is persisted.
//! A configuration can be built in code or loaded from JSON:
//!
//! ```
//! use vscp_client::ClientConfig;
//!
//! let config = ClientConfig::from_json(r#"{ "host": "10.0.0.5", "connect_timeout_ms": 2500 }"#).unwrap();
//! assert_eq!(config.host, "10.0.0.5");
//! assert_eq!(config.port, 9598);
//! assert_eq!(config.connect_timeout().as_millis(), 2500);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VscpError};
use crate::protocol::DEFAULT_PORT;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read buffer size for the read loop.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// Connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Time allowed for TCP connect plus the welcome banner.
    pub connect_timeout_ms: u64,
    /// Tear the connection down after this long without received data.
    /// `None` disables the idle timeout.
    pub idle_timeout_ms: Option<u64>,
    /// Size of the socket read buffer.
    pub read_buffer_size: usize,
}

impl ClientConfig {
    /// Configuration for `host:port` with default timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make connecting impossible.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(VscpError::InvalidArgument("empty host".into()));
        }
        if self.port == 0 {
            return Err(VscpError::InvalidArgument("port 0".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(VscpError::InvalidArgument("zero connect timeout".into()));
        }
        if self.read_buffer_size == 0 {
            return Err(VscpError::InvalidArgument("zero read buffer size".into()));
        }
        Ok(())
    }

    /// Connect timeout as a `Duration`.
    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Idle timeout as a `Duration`, if enabled.
    #[inline]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            idle_timeout_ms: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn test_config_from_json() {
        let config = ClientConfig::from_json(
            r#"{ "host": "vscp.local", "port": 9599, "idle_timeout_ms": 30000 }"#,
        )
        .unwrap();

        assert_eq!(config.host, "vscp.local");
        assert_eq!(config.port, 9599);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_config_from_json_rejects_garbage() {
        assert!(matches!(
            ClientConfig::from_json("{ not json"),
            Err(VscpError::Json(_))
        ));
    }

    #[test]
    fn test_config_validate() {
        assert!(ClientConfig::new("", 9598).validate().is_err());
        assert!(ClientConfig::new("host", 0).validate().is_err());

        let mut config = ClientConfig::new("host", 9598);
        config.connect_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
