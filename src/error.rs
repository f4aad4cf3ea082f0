use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    /// A swap phase failed.
    #[error("swap error: {0}")]
    Sdk(#[from] tapswap_sdk::Error),
    /// The configuration file could not be read, parsed or written.
    #[error("config error: {0}")]
    Config(String),
}
