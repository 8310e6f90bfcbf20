//! Relay configuration.

use std::time::Duration;

pub use peerlink_client::DEFAULT_RELAY_PORT;

/// Timing knobs for a [`RelayServer`](crate::RelayServer).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long an entry may go without NEW or KEEP_ALIVE before the
    /// sweep removes it. Default: 30 seconds.
    pub entry_ttl: Duration,

    /// How often the expiry sweep runs. Default: 1 second.
    pub sweep_interval: Duration,

    /// How long a control connection has to deliver its command.
    /// Default: 5 seconds.
    pub command_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            command_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.entry_ttl, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(DEFAULT_RELAY_PORT, 8000);
    }
}
