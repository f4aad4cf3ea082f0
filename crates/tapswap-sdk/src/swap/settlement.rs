use std::str::FromStr;

use bitcoin::Txid;

use crate::anchor::{decode_psbt, is_complete, txid};
use crate::envelope::{BuyOrderEnvelope, Envelope};
use crate::error::{Error, Result};
use crate::invariant::expect_eq;
use crate::sdk::SwapSdk;
use crate::services::{AssetService, PublishRequest, call};
use crate::vpacket::VirtualPacket;

/// Label attached to the logged transfer.
const TRANSFER_LABEL: &str = "tapswap";

impl<W, A: AssetService, U> SwapSdk<W, A, U> {
    /// Broadcast the finalized anchor and log the asset transfer.
    ///
    /// Returns the anchor txid in hex. Not retried: after a failure the
    /// transaction may already be in the mempool.
    pub async fn publish(&self, buy_order: &str) -> Result<String> {
        let envelope = BuyOrderEnvelope::decode(buy_order)?;
        let anchor = decode_psbt(&envelope.anchor_psbt)?;
        let packet = VirtualPacket::from_bytes(&envelope.vpacket)?;
        expect_eq("anchor complete", &is_complete(&anchor), &true)?;
        let expected = txid(&anchor);
        log::info!("publish: broadcasting anchor {expected}");

        let receipt = call(
            "publish_and_log",
            self.config.call_timeout,
            self.assets.publish_and_log(PublishRequest {
                anchor_psbt: envelope.anchor_psbt,
                virtual_packets: vec![packet.to_bytes()?],
                change_output_index: envelope.commit.change_output_index,
                locked_utxos: envelope.commit.locked_utxos,
                label: TRANSFER_LABEL.to_string(),
            }),
        )
        .await?;

        if receipt.anchor_txid.len() != 64 {
            return Err(Error::Service {
                op: "publish_and_log",
                message: format!("malformed txid {:?}", receipt.anchor_txid),
            });
        }
        let published = Txid::from_str(&receipt.anchor_txid).map_err(|e| Error::Service {
            op: "publish_and_log",
            message: format!("malformed txid {:?}: {e}", receipt.anchor_txid),
        })?;
        expect_eq("published txid", &published, &expected)?;
        Ok(published.to_string())
    }
}
