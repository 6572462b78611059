//! Dispatcher configuration loaded from environment variables.

use std::time::Duration;

/// Dispatcher settings with sensible defaults.
///
/// Reads from environment variables:
/// - `DISPATCH_QUEUE_CAPACITY`: commits buffered before `dispatch` waits (default: `1024`)
/// - `DISPATCH_SEND_TIMEOUT_MS`: bound on opening a channel and on each send (default: `5000`)
/// - `DISPATCH_QUEUE_NAME`: outbound queue messages are written to (default: `"bankaccount-tx"`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub send_timeout: Duration,
    pub queue_name: String,
}

impl DispatcherConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_capacity: std::env::var("DISPATCH_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.queue_capacity),
            send_timeout: std::env::var("DISPATCH_SEND_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.send_timeout),
            queue_name: std::env::var("DISPATCH_QUEUE_NAME").unwrap_or(defaults.queue_name),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            send_timeout: Duration::from_millis(5000),
            queue_name: "bankaccount-tx".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = DispatcherConfig::default();
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.send_timeout, Duration::from_secs(5));
        assert_eq!(config.queue_name, "bankaccount-tx");
    }
}
