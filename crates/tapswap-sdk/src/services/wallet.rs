use std::future::Future;

use bitcoin::secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use super::ServiceResult;

/// Key material as the wallet reports it, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawKeyDescriptor {
    pub raw_key_bytes: Vec<u8>,
    pub family: u32,
    pub index: u32,
}

/// An on-chain address owned by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedAddress {
    pub address: String,
    /// Taproot internal key behind the address.
    pub internal_key: PublicKey,
    /// e.g. `m/86/1/0/0/3`; hardening is applied by the caller.
    pub derivation_path: String,
}

/// A PSBT after the wallet added its signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPsbt {
    pub psbt: Vec<u8>,
    pub signed_inputs: Vec<u32>,
}

/// Wallet signing service backing one party.
pub trait WalletService: Send + Sync {
    /// Derive the next unused script key in `family`.
    fn derive_script_key(
        &self,
        family: u32,
    ) -> impl Future<Output = ServiceResult<RawKeyDescriptor>> + Send;

    /// Derive the next unused anchor internal key in `family`.
    fn derive_internal_key(
        &self,
        family: u32,
    ) -> impl Future<Output = ServiceResult<RawKeyDescriptor>> + Send;

    /// A fresh receiving address.
    fn new_address(&self) -> impl Future<Output = ServiceResult<String>> + Send;

    fn list_owned_addresses(&self) -> impl Future<Output = ServiceResult<Vec<OwnedAddress>>> + Send;

    /// Sign every input the wallet controls.
    fn sign_psbt(&self, psbt: Vec<u8>) -> impl Future<Output = ServiceResult<SignedPsbt>> + Send;

    /// Turn a fully-signed PSBT into a finalized, broadcastable one.
    fn finalize_psbt(&self, psbt: Vec<u8>) -> impl Future<Output = ServiceResult<Vec<u8>>> + Send;
}
