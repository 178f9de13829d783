//! Server configuration
//!
//! Provides ServerConfig with a validating builder. Every limit has a default,
//! so `ServerConfig::default()` is always a working configuration.

use std::time::Duration;

use crate::lsp::framing::{DEFAULT_MAX_HEADER_LINE, DEFAULT_MAX_MESSAGE_SIZE};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Smallest accepted header line limit
///
/// Must fit `Content-Length: <20 digits>\r\n` with some room for whitespace.
pub const MIN_HEADER_LINE: usize = 64;

/// Largest accepted value for the message size cap (1 GiB)
pub const MAX_MESSAGE_SIZE_LIMIT: usize = 1024 * 1024 * 1024;

/// Maximum allowed read timeout (1 hour)
pub const MAX_READ_TIMEOUT_SECS: u64 = 3600;

// ============================================================================
// Core Configuration Types
// ============================================================================

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// How long to wait for the next frame; `None` waits forever
    pub read_timeout: Option<Duration>,

    /// Largest accepted message body in bytes
    pub max_message_size: usize,

    /// Largest accepted header line in bytes, line ending included
    pub max_header_line: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_header_line: DEFAULT_MAX_HEADER_LINE,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid max message size: {size} - {reason}")]
    InvalidMessageSize { size: usize, reason: String },

    #[error("Invalid header line limit: {limit} - {reason}")]
    InvalidHeaderLimit { limit: usize, reason: String },

    #[error("Invalid read timeout: {timeout:?} - {reason}")]
    InvalidTimeout { timeout: Duration, reason: String },
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for ServerConfig with validation and defaults
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    read_timeout: Option<Duration>,
    max_message_size: Option<usize>,
    max_header_line: Option<usize>,
}

impl ServerConfigBuilder {
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    pub fn max_header_line(mut self, limit: usize) -> Self {
        self.max_header_line = Some(limit);
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let defaults = ServerConfig::default();

        let max_message_size = self.max_message_size.unwrap_or(defaults.max_message_size);
        if max_message_size == 0 {
            return Err(ConfigError::InvalidMessageSize {
                size: max_message_size,
                reason: "must be greater than zero".to_string(),
            });
        }
        if max_message_size > MAX_MESSAGE_SIZE_LIMIT {
            return Err(ConfigError::InvalidMessageSize {
                size: max_message_size,
                reason: format!("must not exceed {MAX_MESSAGE_SIZE_LIMIT} bytes"),
            });
        }

        let max_header_line = self.max_header_line.unwrap_or(defaults.max_header_line);
        if max_header_line < MIN_HEADER_LINE {
            return Err(ConfigError::InvalidHeaderLimit {
                limit: max_header_line,
                reason: format!("must be at least {MIN_HEADER_LINE} bytes"),
            });
        }

        if let Some(timeout) = self.read_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidTimeout {
                    timeout,
                    reason: "must be greater than zero".to_string(),
                });
            }
            if timeout > Duration::from_secs(MAX_READ_TIMEOUT_SECS) {
                return Err(ConfigError::InvalidTimeout {
                    timeout,
                    reason: format!("must not exceed {MAX_READ_TIMEOUT_SECS} seconds"),
                });
            }
        }

        Ok(ServerConfig {
            read_timeout: self.read_timeout,
            max_message_size,
            max_header_line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ServerConfig::builder().build().unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.max_message_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::builder()
            .read_timeout(Duration::from_millis(250))
            .max_message_size(1024)
            .max_header_line(256)
            .build()
            .unwrap();

        assert_eq!(config.read_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.max_message_size, 1024);
        assert_eq!(config.max_header_line, 256);
    }

    #[test]
    fn test_builder_validation() {
        let err = ServerConfig::builder().max_message_size(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMessageSize { size: 0, .. }));

        let err = ServerConfig::builder()
            .max_message_size(usize::MAX)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMessageSize { .. }));

        let config = ServerConfig::builder()
            .max_message_size(MAX_MESSAGE_SIZE_LIMIT)
            .build()
            .unwrap();
        assert_eq!(config.max_message_size, MAX_MESSAGE_SIZE_LIMIT);

        let err = ServerConfig::builder().max_header_line(8).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHeaderLimit { limit: 8, .. }));

        let err = ServerConfig::builder()
            .read_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }));

        let err = ServerConfig::builder()
            .read_timeout(Duration::from_secs(MAX_READ_TIMEOUT_SECS + 1))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }));
    }
}
