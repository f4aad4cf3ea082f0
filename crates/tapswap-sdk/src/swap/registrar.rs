//! Post-settlement proof import and transfer registration.
//!
//! Runs after the anchor is broadcast. The transfer is final on-chain at that
//! point, so import and registration failures are reported, not raised.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bitcoin::secp256k1::PublicKey;

use crate::asset::AssetId;
use crate::envelope::{BuyOrderEnvelope, Envelope};
use crate::error::{Error, Result};
use crate::invariant::{expect_eq, expect_len_at_least};
use crate::outpoint::SwapOutPoint;
use crate::sdk::SwapSdk;
use crate::services::{
    ImportProofRequest, LastProofQuery, ProofSource, RegisterTransferRequest, UniverseId,
    UniverseKey, UniverseService, call,
};
use crate::vpacket::VirtualPacket;

/// Outcome of [`SwapSdk::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReport {
    pub outpoint: SwapOutPoint,
    pub proof_imported: bool,
    pub transfer_registered: bool,
    /// One entry per advisory failure.
    pub warnings: Vec<String>,
}

impl RegistrationReport {
    pub fn is_clean(&self) -> bool {
        self.proof_imported && self.transfer_registered && self.warnings.is_empty()
    }
}

/// Buyer fields of a buy-order envelope, decoded before any network call.
struct BuyerClaim {
    script_key: PublicKey,
    outpoint: SwapOutPoint,
}

fn buyer_claim(buy_order: &str) -> Result<BuyerClaim> {
    let envelope = BuyOrderEnvelope::decode(buy_order)?;
    let script_key = PublicKey::from_slice(&envelope.script_key)
        .map_err(|e| Error::Envelope(format!("buyer script key: {e}")))?;
    let outpoint = envelope.outpoint.parse()?;
    Ok(BuyerClaim {
        script_key,
        outpoint,
    })
}

fn decode_last_proof(last_proof: &str) -> Result<Vec<u8>> {
    let proof = STANDARD
        .decode(last_proof.trim())
        .map_err(|e| Error::ProofDecode(format!("base64: {e}")))?;
    if proof.is_empty() {
        return Err(Error::ProofDecode("empty proof".into()));
    }
    Ok(proof)
}

/// Ask a remote proof server for the latest proof of an asset unit.
///
/// Returns the base64 proof text.
pub async fn fetch_last_proof<P: ProofSource>(
    source: &P,
    query: LastProofQuery,
    timeout: Duration,
) -> Result<String> {
    let response = call("get_last_proof", timeout, source.get_last_proof(query)).await?;
    if !response.errmsg.is_empty() {
        return Err(Error::ProofServer {
            errno: response.errno,
            errmsg: response.errmsg,
        });
    }
    if response.data.trim().is_empty() {
        return Err(Error::ProofDecode("proof server returned no data".into()));
    }
    Ok(response.data)
}

impl<W, A, U: UniverseService> SwapSdk<W, A, U> {
    /// Import the seller's last proof and register the buyer's transfer.
    ///
    /// Every input is validated and decoded before the universe is contacted.
    pub async fn register(
        &self,
        asset_id: &str,
        buy_order: &str,
        last_proof: &str,
    ) -> Result<RegistrationReport> {
        let asset_id = AssetId::from_hex(asset_id)?;
        let claim = buyer_claim(buy_order)?;
        let proof = decode_last_proof(last_proof)?;
        let timeout = self.config.call_timeout;
        let host = self.config.universe_host(self.network).to_string();

        call(
            "sync_universe",
            timeout,
            self.universe.sync_universe(&host, UniverseId::Asset(asset_id)),
        )
        .await?;
        let root = call("fetch_root", timeout, self.universe.fetch_root(asset_id)).await?;
        expect_eq("universe root asset id", &root.asset_id, &asset_id)?;
        log::debug!(
            "register: {} genesis {} group key {:?}",
            root.genesis.name,
            root.genesis.genesis_point,
            root.group_key
        );

        let id = match root.group_key {
            Some(group_key) => UniverseId::Group(group_key),
            None => UniverseId::Asset(asset_id),
        };
        let leaves = call("fetch_leaves", timeout, self.universe.fetch_leaves(id)).await?;
        expect_len_at_least("universe leaves", &leaves, 1)?;

        let decoded = call("decode_proof", timeout, self.universe.decode_proof(proof.clone()))
            .await
            .map_err(|e| match e {
                Error::Service { message, .. } => Error::ProofDecode(message),
                other => other,
            })?;
        expect_eq("proof asset id", &decoded.asset_id, &asset_id)?;

        let mut report = RegistrationReport {
            outpoint: claim.outpoint,
            proof_imported: false,
            transfer_registered: false,
            warnings: Vec::new(),
        };

        let import = ImportProofRequest {
            key: UniverseKey {
                id,
                outpoint: decoded.outpoint,
                script_key: decoded.script_key,
            },
            proof,
        };
        match call("import_proof", timeout, self.universe.import_proof(import)).await {
            Ok(receipt) => {
                log::info!("register: proof imported, root sum {}", receipt.new_root_sum);
                report.proof_imported = true;
            }
            Err(e) => {
                log::warn!("register: proof import failed: {e}");
                report.warnings.push(e.to_string());
            }
        }

        let transfer = RegisterTransferRequest {
            asset_id,
            group_key: root.group_key,
            script_key: claim.script_key,
            outpoint: claim.outpoint.to_outpoint(),
        };
        match call(
            "register_transfer",
            timeout,
            self.universe.register_transfer(transfer),
        )
        .await
        {
            Ok(registered) => {
                log::info!(
                    "register: {} units registered at {}",
                    registered.amount,
                    registered.outpoint
                );
                report.transfer_registered = true;
            }
            Err(e) => {
                log::warn!("register: transfer registration failed: {e}");
                report.warnings.push(e.to_string());
            }
        }

        Ok(report)
    }

    /// Fetch the last proof of the coin the seller spent, then
    /// [`register`](Self::register) it.
    pub async fn fetch_and_register<P: ProofSource>(
        &self,
        source: &P,
        asset_id: &str,
        buy_order: &str,
    ) -> Result<RegistrationReport> {
        let asset_id = AssetId::from_hex(asset_id)?;
        let envelope = BuyOrderEnvelope::decode(buy_order)?;
        let packet = VirtualPacket::from_bytes(&envelope.vpacket)?;
        expect_len_at_least("virtual inputs", &packet.inputs, 1)?;
        let spent = &packet.inputs[0].prev_id;
        let script_key = spent
            .script_key
            .ok_or_else(|| Error::VirtualPacket("input 0 has no previous script key".into()))?;
        let query = LastProofQuery {
            script_key: hex::encode(script_key.serialize()),
            outpoint: SwapOutPoint::from(spent.out_point).to_string(),
            asset_id: asset_id.to_hex(),
        };
        let last_proof = fetch_last_proof(source, query, self.config.call_timeout).await?;
        self.register(&asset_id.to_hex(), buy_order, &last_proof).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_undecodable_proof() {
        assert!(matches!(
            decode_last_proof("***"),
            Err(Error::ProofDecode(_))
        ));
        assert!(matches!(decode_last_proof(""), Err(Error::ProofDecode(_))));
        assert_eq!(decode_last_proof("AQID").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn report_cleanliness() {
        let outpoint: SwapOutPoint = format!("{}:1", "ab".repeat(32)).parse().unwrap();
        let mut report = RegistrationReport {
            outpoint,
            proof_imported: true,
            transfer_registered: true,
            warnings: Vec::new(),
        };
        assert!(report.is_clean());
        report.warnings.push("register_transfer failed: busy".into());
        report.transfer_registered = false;
        assert!(!report.is_clean());
    }
}
