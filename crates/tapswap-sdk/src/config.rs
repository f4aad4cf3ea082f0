use std::time::Duration;

use crate::keys::SWAP_KEY_FAMILY;
use crate::network::Network;

/// Bound applied to every collaborator call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Confirmation target handed to funding.
pub const DEFAULT_CONF_TARGET: u32 = 6;

/// Ceiling on fee rates accepted by either builder, in sat/vB.
pub const MAX_FEE_RATE: u32 = 500;

/// Knobs shared by every swap phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapConfig {
    pub call_timeout: Duration,
    pub key_family: u32,
    /// Relative lock time set on the seller's virtual output.
    pub relative_lock_time: u64,
    pub conf_target: u32,
    /// Universe host synced during registration; `None` uses the network default.
    pub universe_host: Option<String>,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            key_family: SWAP_KEY_FAMILY,
            relative_lock_time: 0,
            conf_target: DEFAULT_CONF_TARGET,
            universe_host: None,
        }
    }
}

impl SwapConfig {
    pub fn universe_host(&self, network: Network) -> &str {
        self.universe_host
            .as_deref()
            .unwrap_or_else(|| network.default_universe_host())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universe_host_falls_back_to_network() {
        let mut config = SwapConfig::default();
        assert_eq!(config.universe_host(Network::Regtest), "localhost:10029");
        config.universe_host = Some("u.example:443".into());
        assert_eq!(config.universe_host(Network::Mainnet), "u.example:443");
    }
}
