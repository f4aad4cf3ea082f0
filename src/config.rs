use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tapswap_sdk::{MAX_FEE_RATE, Network, SWAP_KEY_FAMILY, SwapConfig};

use crate::error::NodeError;

pub const CONFIG_FILE: &str = "swap_config.json";

const DEFAULT_FEE_RATE: u32 = 10;

// ============================================================================
// Persisted swap configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub network: Network,
    pub call_timeout_secs: u64,
    pub key_family: u32,
    pub relative_lock_time: u64,
    pub conf_target: u32,
    /// sat/vB used when a caller does not pass one.
    pub default_fee_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub universe_host: Option<String>,
    /// Host buyers name as their proof courier; defaults to the universe host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_courier_host: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let sdk = SwapConfig::default();
        Self {
            network: Network::Regtest,
            call_timeout_secs: sdk.call_timeout.as_secs(),
            key_family: SWAP_KEY_FAMILY,
            relative_lock_time: sdk.relative_lock_time,
            conf_target: sdk.conf_target,
            default_fee_rate: DEFAULT_FEE_RATE,
            universe_host: None,
            proof_courier_host: None,
        }
    }
}

impl AppConfig {
    /// Read `swap_config.json` from `dir`; a missing file yields the defaults.
    pub fn load(dir: &Path) -> Result<Self, NodeError> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            log::info!("no {CONFIG_FILE} in {}, using defaults", dir.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| NodeError::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| NodeError::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, dir: &Path) -> Result<(), NodeError> {
        self.validate()?;
        fs::create_dir_all(dir)
            .map_err(|e| NodeError::Config(format!("create {}: {e}", dir.display())))?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| NodeError::Config(e.to_string()))?;
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, json)
            .map_err(|e| NodeError::Config(format!("write {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.call_timeout_secs == 0 {
            return Err(NodeError::Config("callTimeoutSecs must be positive".into()));
        }
        if self.default_fee_rate > MAX_FEE_RATE {
            return Err(NodeError::Config(format!(
                "defaultFeeRate {} exceeds {MAX_FEE_RATE}",
                self.default_fee_rate
            )));
        }
        Ok(())
    }

    pub fn swap_config(&self) -> SwapConfig {
        SwapConfig {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            key_family: self.key_family,
            relative_lock_time: self.relative_lock_time,
            conf_target: self.conf_target,
            universe_host: self.universe_host.clone(),
        }
    }

    pub fn courier_host(&self) -> &str {
        self.proof_courier_host
            .as_deref()
            .or(self.universe_host.as_deref())
            .unwrap_or_else(|| self.network.default_universe_host())
    }
}
