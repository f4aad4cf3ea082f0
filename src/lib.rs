mod config;
mod error;
mod node;

pub use config::{AppConfig, CONFIG_FILE};
pub use error::NodeError;
pub use node::{SettlementOutcome, SwapNode};

// Re-export the SDK for host-layer use
pub use tapswap_sdk;
