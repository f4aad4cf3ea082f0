use std::time::Duration;

use thiserror::Error;

use crate::invariant::InvariantViolation;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid asset id: {0}")]
    InvalidAssetId(String),

    #[error("fee rate {fee_rate} exceeds the maximum of {max}")]
    FeeRateExceeded { fee_rate: u32, max: u32 },

    #[error("invalid outpoint: {0}")]
    InvalidOutPoint(String),

    #[error("asset amount must be non-zero")]
    ZeroAmount,

    #[error("price must be non-zero")]
    ZeroPrice,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    #[error("invalid proof courier host: {0}")]
    InvalidCourierHost(String),

    #[error("structural invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("{op} failed: {message}")]
    Service { op: &'static str, message: String },

    #[error("{op} timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },

    #[error("envelope decode error: {0}")]
    Envelope(String),

    #[error("unsupported envelope version {found} (expected {expected})")]
    UnsupportedEnvelopeVersion { found: u8, expected: u8 },

    #[error("wrong envelope kind: expected {expected}, found {found}")]
    WrongEnvelopeKind {
        expected: &'static str,
        found: String,
    },

    #[error("virtual packet codec error: {0}")]
    VirtualPacket(String),

    #[error("PSBT error: {0}")]
    Psbt(String),

    #[error("proof decode error: {0}")]
    ProofDecode(String),

    #[error("proof server error {errno}: {errmsg}")]
    ProofServer { errno: i64, errmsg: String },

    #[error("asset output preparation failed: {0}")]
    AssetPreparation(String),
}

impl Error {
    /// Validation errors are raised before any collaborator is contacted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidAssetId(_)
                | Error::FeeRateExceeded { .. }
                | Error::InvalidOutPoint(_)
                | Error::ZeroAmount
                | Error::ZeroPrice
                | Error::InvalidAddress(_)
                | Error::InvalidDerivationPath(_)
                | Error::InvalidCourierHost(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
