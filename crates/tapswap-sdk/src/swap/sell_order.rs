//! Seller side: offer an asset unit against a payment to the seller's address.

use bitcoin::{Amount, TapSighashType};

use crate::anchor::{
    address_script, decode_psbt, derive_anchor_template, encode_psbt, hardened_address_path,
    set_input_sighash, set_payment_output, trim,
};
use crate::asset::AssetId;
use crate::envelope::{Envelope, SellOrderEnvelope};
use crate::error::{Error, Result};
use crate::invariant::{
    InvariantViolation, expect_anchor_shape, expect_contains, expect_eq, expect_len,
    expect_len_at_least, expect_len_in,
};
use crate::keys::derive_role_keys;
use crate::sdk::SwapSdk;
use crate::services::{
    AssetService, CoinConstraint, CommitRequest, FundRequest, WalletService, call,
};
use crate::swap::{check_fee_rate, check_prepared_outputs};
use crate::vpacket::{
    KeyOrigin, OutputType, VirtualPacket, prepare_output_assets, unknown_master_fingerprint,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellOrderRequest {
    /// 64 hex characters.
    pub asset_id: String,
    pub amount: u64,
    pub price_sats: u64,
    /// sat/vB
    pub fee_rate: u32,
    /// Pin funding to one owned asset unit.
    pub coin: Option<CoinConstraint>,
}

impl<W: WalletService, A: AssetService, U> SwapSdk<W, A, U> {
    /// Build and sign a sell order, returning the encoded envelope.
    ///
    /// The seller signs its asset input with NONE|ANYONECANPAY and its anchor
    /// input with SINGLE|ANYONECANPAY, so the buyer can add its own inputs
    /// and outputs without invalidating either signature.
    pub async fn build_sell_order(&self, request: &SellOrderRequest) -> Result<String> {
        let asset_id = AssetId::from_hex(&request.asset_id)?;
        check_fee_rate(request.fee_rate)?;
        if request.amount == 0 {
            return Err(Error::ZeroAmount);
        }
        if request.price_sats == 0 {
            return Err(Error::ZeroPrice);
        }
        let timeout = self.config.call_timeout;
        log::info!(
            "sell order: {} units of {asset_id} for {} sats",
            request.amount,
            request.price_sats
        );

        let keys = derive_role_keys(&self.wallet, self.config.key_family, timeout).await?;

        // Self-addressed: the buyer retargets output 0 later.
        let template = VirtualPacket::interactive_send(
            asset_id,
            request.amount,
            keys.script_key.pub_key,
            &keys.internal_key,
            self.config.relative_lock_time,
            self.network,
        )?;

        let funded = call(
            "fund_virtual",
            timeout,
            self.assets.fund_virtual(FundRequest {
                packet: template.to_bytes()?,
                coin: request.coin,
                conf_target: self.config.conf_target,
            }),
        )
        .await?;
        let mut packet = VirtualPacket::from_bytes(&funded)?;
        expect_len("funded virtual inputs", &packet.inputs, 1)?;
        expect_len_in("funded virtual outputs", &packet.outputs, &[1, 2])?;

        for input in packet.inputs.iter_mut() {
            input.set_sighash(TapSighashType::NonePlusAnyoneCanPay);
        }

        expect_eq(
            "virtual output 0 type",
            &packet.outputs[0].output_type,
            &OutputType::Simple,
        )?;
        prepare_output_assets(&mut packet)?;
        check_prepared_outputs(&packet)?;

        let signed = call(
            "sign_virtual",
            timeout,
            self.assets.sign_virtual(packet.to_bytes()?),
        )
        .await?;
        expect_contains("signed virtual inputs", &signed.signed_inputs, &0)?;
        let packet = VirtualPacket::from_bytes(&signed.packet)?;
        expect_len("signed virtual inputs", &packet.inputs, 1)?;
        check_prepared_outputs(&packet)?;

        let mut anchor = derive_anchor_template(&packet, self.network)?;
        let original_inputs = anchor.inputs.len();
        let original_outputs = anchor.outputs.len();

        let address = call("new_address", timeout, self.wallet.new_address()).await?;
        let owned = call(
            "list_owned_addresses",
            timeout,
            self.wallet.list_owned_addresses(),
        )
        .await?;
        let owned = owned
            .into_iter()
            .find(|a| a.address == address)
            .ok_or_else(|| InvariantViolation::Missing {
                what: "owned addresses",
                item: address.clone(),
            })?;
        let origin = KeyOrigin {
            pub_key: owned.internal_key,
            fingerprint: unknown_master_fingerprint(),
            path: hardened_address_path(&owned.derivation_path)?,
        };
        set_payment_output(
            &mut anchor,
            address_script(&address, self.network)?,
            Amount::from_sat(request.price_sats),
            &origin,
        )?;

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
        expect_len("committed virtual inputs", &packet.inputs, 1)?;
        check_prepared_outputs(&packet)?;
        let mut anchor = decode_psbt(&committed.anchor_psbt)?;
        expect_len_at_least("committed anchor inputs", &anchor.inputs, original_inputs)?;

        // Inputs and outputs added by the commit are dropped; the buyer funds
        // its own fees.
        set_input_sighash(
            &mut anchor,
            original_inputs,
            TapSighashType::SinglePlusAnyoneCanPay,
        )?;
        trim(&mut anchor, original_inputs, original_outputs)?;
        expect_anchor_shape(&anchor, &packet)?;

        let signed = call("sign_psbt", timeout, self.wallet.sign_psbt(encode_psbt(&anchor))).await?;
        expect_len("wallet signed inputs", &signed.signed_inputs, original_inputs)?;
        let signed_anchor = decode_psbt(&signed.psbt)?;
        expect_anchor_shape(&signed_anchor, &packet)?;

        log::info!(
            "sell order ready: {} virtual outputs, anchor {}",
            packet.outputs.len(),
            crate::anchor::txid(&signed_anchor)
        );
        SellOrderEnvelope {
            vpacket: packet.to_bytes()?,
            anchor_psbt: signed.psbt,
        }
        .encode()
    }
}
