//! Buyer side: take over a sell order, pay for it and finalize the anchor.

use crate::anchor::{decode_psbt, encode_psbt, is_complete, retarget_first_asset_output, txid};
use crate::envelope::{BuyOrderEnvelope, Envelope, SellOrderEnvelope};
use crate::error::Result;
use crate::invariant::{expect_contains, expect_eq, expect_len, expect_len_at_least, expect_len_in};
use crate::keys::derive_role_keys;
use crate::outpoint::SwapOutPoint;
use crate::sdk::SwapSdk;
use crate::services::{AssetService, CommitRequest, WalletService, call};
use crate::swap::{check_fee_rate, check_prepared_outputs};
use crate::vpacket::{
    CourierAddress, FIRST_ASSET_ANCHOR_INDEX, VirtualPacket, prepare_output_assets,
};

/// Seller's input plus the buyer's funding input.
const SETTLED_ANCHOR_INPUTS: usize = 2;

/// The buyer's funding input follows the seller's.
const BUYER_ANCHOR_INPUT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyOrderRequest {
    /// Encoded sell-order envelope.
    pub sell_order: String,
    /// sat/vB
    pub fee_rate: u32,
    /// Universe host the buyer fetches its transfer proof from.
    pub proof_courier_host: String,
}

impl<W: WalletService, A: AssetService, U> SwapSdk<W, A, U> {
    /// Accept a sell order, returning the encoded buy-order envelope.
    ///
    /// The resulting anchor is finalized and ready to broadcast. The buyer's
    /// asset lands at anchor output 1.
    pub async fn build_buy_order(&self, request: &BuyOrderRequest) -> Result<String> {
        check_fee_rate(request.fee_rate)?;
        let courier = CourierAddress::universe_rpc(&request.proof_courier_host)?;
        let timeout = self.config.call_timeout;

        let sell = SellOrderEnvelope::decode(&request.sell_order)?;
        let mut packet = VirtualPacket::from_bytes(&sell.vpacket)?;
        expect_len_in("sell order virtual outputs", &packet.outputs, &[1, 2])?;
        let mut anchor = decode_psbt(&sell.anchor_psbt)?;
        expect_len_at_least("sell order anchor outputs", &anchor.outputs, 2)?;
        log::info!(
            "buy order: taking {} units of {}",
            packet.outputs[0].amount,
            packet.inputs.first().map(|i| i.prev_id.asset_id.to_hex()).unwrap_or_default()
        );

        let keys = derive_role_keys(&self.wallet, self.config.key_family, timeout).await?;

        let recipient = &mut packet.outputs[0];
        recipient.script_key = keys.script_key.pub_key;
        recipient.clear_anchor_derivation();
        recipient.set_anchor_internal_key(&keys.internal_key, self.network.coin_type())?;
        for out in packet.outputs.iter_mut() {
            out.proof_courier_addr = Some(courier.clone());
        }

        retarget_first_asset_output(&mut anchor, &packet)?;

        // Preparation rebuilds the witness chains; the seller's signatures
        // must survive it.
        let witnesses = packet.snapshot_witnesses();
        prepare_output_assets(&mut packet)?;
        packet.restore_witnesses(witnesses);

        check_prepared_outputs(&packet)?;

        let committed = call(
            "commit",
            timeout,
            self.assets.commit(CommitRequest {
                virtual_packets: vec![packet.to_bytes()?],
                anchor_psbt: encode_psbt(&anchor),
                fee_rate: request.fee_rate,
                add_change_output: true,
            }),
        )
        .await?;

        expect_len("committed virtual packets", &committed.virtual_packets, 1)?;
        let packet = VirtualPacket::from_bytes(&committed.virtual_packets[0])?;
        check_prepared_outputs(&packet)?;
        expect_eq(
            "committed output 0 script key",
            &packet.outputs[0].script_key,
            &keys.script_key.pub_key,
        )?;
        let anchor = decode_psbt(&committed.anchor_psbt)?;
        expect_len("committed anchor inputs", &anchor.inputs, SETTLED_ANCHOR_INPUTS)?;

        let signed = call("sign_psbt", timeout, self.wallet.sign_psbt(encode_psbt(&anchor))).await?;
        log::debug!("buy order: wallet signed inputs {:?}", signed.signed_inputs);
        let signed_anchor = decode_psbt(&signed.psbt)?;
        expect_len("signed anchor inputs", &signed_anchor.inputs, SETTLED_ANCHOR_INPUTS)?;
        expect_contains("wallet signed inputs", &signed.signed_inputs, &BUYER_ANCHOR_INPUT)?;

        let finalized_bytes =
            call("finalize_psbt", timeout, self.wallet.finalize_psbt(signed.psbt)).await?;
        let finalized = decode_psbt(&finalized_bytes)?;
        expect_len("finalized anchor inputs", &finalized.inputs, SETTLED_ANCHOR_INPUTS)?;
        expect_eq("finalized anchor complete", &is_complete(&finalized), &true)?;

        let outpoint = SwapOutPoint::new(txid(&finalized), FIRST_ASSET_ANCHOR_INDEX);
        log::info!("buy order ready: asset outpoint {outpoint}");

        BuyOrderEnvelope {
            anchor_psbt: finalized_bytes,
            vpacket: packet.to_bytes()?,
            commit: committed,
            script_key: keys.script_key.pub_key.serialize().to_vec(),
            outpoint: outpoint.to_string(),
        }
        .encode()
    }
}
