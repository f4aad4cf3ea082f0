//! Collaborator seams.
//!
//! The wallet, asset transaction and universe services are external
//! processes. Each trait method reports failures as plain strings; the
//! protocol wraps them with the name of the operation that failed.

mod asset;
mod universe;
mod wallet;

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

pub use asset::{
    AssetService, CoinConstraint, CommitRequest, CommitResponse, FundRequest, PublishRequest,
    SignedVirtual, TransferReceipt,
};
pub use universe::{
    DecodedProof, GenesisInfo, ImportProofRequest, ImportReceipt, LastProofQuery,
    LastProofResponse, ProofSource, RegisterTransferRequest, RegisteredTransfer, UniverseId,
    UniverseKey, UniverseLeaf, UniverseRoot, UniverseService,
};
pub use wallet::{OwnedAddress, RawKeyDescriptor, SignedPsbt, WalletService};

/// Result type returned by every collaborator call.
pub type ServiceResult<T> = std::result::Result<T, String>;

/// Await one collaborator call under `timeout`.
///
/// A timeout or service error aborts the enclosing phase; nothing is retried.
pub(crate) async fn call<T, F>(op: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = ServiceResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => {
            log::warn!("{op} failed: {message}");
            Err(Error::Service { op, message })
        }
        Err(_) => {
            log::warn!("{op} timed out after {timeout:?}");
            Err(Error::Timeout { op, timeout })
        }
    }
}
