use std::future::Future;

use bitcoin::OutPoint;
use bitcoin::secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use super::ServiceResult;
use crate::envelope::{hex_bytes, hex_bytes_vec};
use crate::outpoint::SwapOutPoint;

/// Pins funding to one previously-owned asset unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinConstraint {
    pub anchor_outpoint: SwapOutPoint,
    pub internal_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundRequest {
    pub packet: Vec<u8>,
    /// `None` lets the service select any suitable coin.
    pub coin: Option<CoinConstraint>,
    pub conf_target: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedVirtual {
    pub packet: Vec<u8>,
    pub signed_inputs: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub virtual_packets: Vec<Vec<u8>>,
    pub anchor_psbt: Vec<u8>,
    /// sat/vB
    pub fee_rate: u32,
    pub add_change_output: bool,
}

/// Anchor and virtual packets after the service committed them together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResponse {
    #[serde(with = "hex_bytes")]
    pub anchor_psbt: Vec<u8>,
    #[serde(with = "hex_bytes_vec")]
    pub virtual_packets: Vec<Vec<u8>>,
    /// `-1` when no change output was added.
    pub change_output_index: i32,
    pub locked_utxos: Vec<OutPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub anchor_psbt: Vec<u8>,
    pub virtual_packets: Vec<Vec<u8>>,
    pub change_output_index: i32,
    pub locked_utxos: Vec<OutPoint>,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Hex txid of the broadcast anchor transaction.
    pub anchor_txid: String,
}

/// Asset transaction service: funding, virtual signing, anchoring, publishing.
pub trait AssetService: Send + Sync {
    /// Select input coins for a virtual packet and return the funded packet.
    fn fund_virtual(&self, request: FundRequest)
    -> impl Future<Output = ServiceResult<Vec<u8>>> + Send;

    fn sign_virtual(&self, packet: Vec<u8>)
    -> impl Future<Output = ServiceResult<SignedVirtual>> + Send;

    /// Commit virtual packets into the anchor, adding BTC inputs for fees.
    fn commit(&self, request: CommitRequest)
    -> impl Future<Output = ServiceResult<CommitResponse>> + Send;

    /// Broadcast the anchor and record the asset transfer atomically.
    fn publish_and_log(
        &self,
        request: PublishRequest,
    ) -> impl Future<Output = ServiceResult<TransferReceipt>> + Send;
}
