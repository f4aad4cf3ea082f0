use std::future::Future;

use bitcoin::OutPoint;
use bitcoin::secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use super::ServiceResult;
use crate::asset::AssetId;

/// A universe tree is keyed by asset id, or by group key for grouped assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniverseId {
    Asset(AssetId),
    Group(PublicKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisInfo {
    pub name: String,
    pub genesis_point: OutPoint,
    pub output_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseRoot {
    pub asset_id: AssetId,
    pub group_key: Option<PublicKey>,
    pub genesis: GenesisInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseLeaf {
    pub script_key: PublicKey,
    pub amount: u64,
}

/// Fields recovered from a proof blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedProof {
    pub asset_id: AssetId,
    pub group_key: Option<PublicKey>,
    pub script_key: PublicKey,
    pub outpoint: OutPoint,
}

/// Location of a proof leaf inside a universe tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseKey {
    pub id: UniverseId,
    pub outpoint: OutPoint,
    pub script_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProofRequest {
    pub key: UniverseKey,
    pub proof: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReceipt {
    pub new_root_sum: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTransferRequest {
    pub asset_id: AssetId,
    pub group_key: Option<PublicKey>,
    pub script_key: PublicKey,
    pub outpoint: OutPoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTransfer {
    pub outpoint: OutPoint,
    pub amount: u64,
}

/// Proof registry (universe) service.
pub trait UniverseService: Send + Sync {
    /// Pull `id`'s tree from a remote universe host.
    fn sync_universe(&self, host: &str, id: UniverseId)
    -> impl Future<Output = ServiceResult<()>> + Send;

    fn fetch_root(&self, asset_id: AssetId)
    -> impl Future<Output = ServiceResult<UniverseRoot>> + Send;

    fn fetch_leaves(&self, id: UniverseId)
    -> impl Future<Output = ServiceResult<Vec<UniverseLeaf>>> + Send;

    fn decode_proof(&self, proof: Vec<u8>)
    -> impl Future<Output = ServiceResult<DecodedProof>> + Send;

    fn import_proof(
        &self,
        request: ImportProofRequest,
    ) -> impl Future<Output = ServiceResult<ImportReceipt>> + Send;

    /// Tell the local asset daemon it now owns the asset at `outpoint`.
    fn register_transfer(
        &self,
        request: RegisterTransferRequest,
    ) -> impl Future<Output = ServiceResult<RegisteredTransfer>> + Send;
}

/// Query for `GET /proof/get_last_proof`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastProofQuery {
    pub script_key: String,
    pub outpoint: String,
    pub asset_id: String,
}

/// Response body of the remote proof server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct LastProofResponse {
    #[serde(default)]
    pub errno: i64,
    #[serde(default)]
    pub errmsg: String,
    /// Base64 proof blob.
    #[serde(default)]
    pub data: String,
}

/// Remote server holding the latest proof of each asset unit.
pub trait ProofSource: Send + Sync {
    fn get_last_proof(
        &self,
        query: LastProofQuery,
    ) -> impl Future<Output = ServiceResult<LastProofResponse>> + Send;
}
