//! Anchor transaction (PSBT) helpers.
//!
//! Output 0 of every anchor carries the seller's payment; output `i + 1`
//! anchors virtual output `i`.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::bip32::{ChildNumber, DerivationPath};
use bitcoin::psbt::PsbtSighashType;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Psbt, ScriptBuf, Sequence, TapSighashType, Transaction, TxIn, TxOut, Txid,
    Witness, XOnlyPublicKey,
};

use crate::error::{Error, Result};
use crate::invariant::{expect_anchor_shape, expect_eq, expect_len_at_least};
use crate::network::Network;
use crate::vpacket::{KeyOrigin, VirtualPacket};

/// Value of an anchor output before the asset service sets the real one.
pub const DUMMY_ANCHOR_VALUE: Amount = Amount::from_sat(1_000);

/// Derivation levels hardened in a wallet address path (purpose, coin, account).
const HARDENED_PATH_LEVELS: usize = 3;

pub fn decode_psbt(bytes: &[u8]) -> Result<Psbt> {
    Psbt::deserialize(bytes).map_err(|e| Error::Psbt(e.to_string()))
}

pub fn encode_psbt(psbt: &Psbt) -> Vec<u8> {
    psbt.serialize()
}

pub fn txid(psbt: &Psbt) -> Txid {
    psbt.unsigned_tx.compute_txid()
}

/// Build the anchor template for a signed virtual packet.
///
/// One input per virtual input, a placeholder payment output, then one
/// taproot output per virtual output keyed by its anchor internal key.
pub fn derive_anchor_template(packet: &VirtualPacket, network: Network) -> Result<Psbt> {
    let secp = Secp256k1::verification_only();

    let input = packet
        .inputs
        .iter()
        .map(|vin| TxIn {
            previous_output: vin.prev_id.out_point,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        })
        .collect();

    let mut output = vec![TxOut {
        value: Amount::ZERO,
        script_pubkey: ScriptBuf::new(),
    }];
    let mut internal_keys = Vec::with_capacity(packet.outputs.len());
    for (idx, vout) in packet.outputs.iter().enumerate() {
        expect_eq(
            "virtual output anchor index",
            &vout.anchor_output_index,
            &(idx as u32 + 1),
        )?;
        let internal_key = vout.anchor_internal_key.ok_or_else(|| {
            Error::Psbt(format!("virtual output {idx} has no anchor internal key"))
        })?;
        let x_only = internal_key.x_only_public_key().0;
        output.push(TxOut {
            value: DUMMY_ANCHOR_VALUE,
            script_pubkey: ScriptBuf::new_p2tr(&secp, x_only, None),
        });
        internal_keys.push(x_only);
    }

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    };
    let mut psbt = Psbt::from_unsigned_tx(tx).map_err(|e| Error::Psbt(e.to_string()))?;

    for (idx, (vout, x_only)) in packet.outputs.iter().zip(internal_keys).enumerate() {
        let out = &mut psbt.outputs[idx + 1];
        out.tap_internal_key = Some(x_only);
        for origin in &vout.anchor_bip32_derivation {
            out.bip32_derivation
                .insert(origin.pub_key, (origin.fingerprint, origin.path.clone()));
        }
        for origin in &vout.anchor_tr_bip32_derivation {
            out.tap_key_origins.insert(
                origin.pub_key.x_only_public_key().0,
                (Vec::new(), (origin.fingerprint, origin.path.clone())),
            );
        }
    }

    expect_anchor_shape(&psbt, packet)?;
    log::debug!(
        "derived {} anchor template: {} inputs, {} outputs",
        network,
        psbt.inputs.len(),
        psbt.outputs.len()
    );
    Ok(psbt)
}

/// Parse `address` for `network` and return its output script.
pub fn address_script(address: &str, network: Network) -> Result<ScriptBuf> {
    let addr = Address::from_str(address)
        .map_err(|e| Error::InvalidAddress(format!("{address}: {e}")))?
        .require_network(network.to_bitcoin())
        .map_err(|e| Error::InvalidAddress(format!("{address}: {e}")))?;
    Ok(addr.script_pubkey())
}

/// Parse a wallet derivation path and harden its first three levels.
pub fn hardened_address_path(path: &str) -> Result<DerivationPath> {
    let parsed = DerivationPath::from_str(path)
        .map_err(|e| Error::InvalidDerivationPath(format!("{path}: {e}")))?;
    let children = parsed
        .into_iter()
        .enumerate()
        .map(|(level, child)| match child {
            ChildNumber::Normal { index } if level < HARDENED_PATH_LEVELS => {
                ChildNumber::from_hardened_idx(*index)
                    .map_err(|e| Error::InvalidDerivationPath(e.to_string()))
            }
            other => Ok(*other),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DerivationPath::from(children))
}

/// Point output 0 at the seller's address for `price` and record the key
/// behind it.
pub fn set_payment_output(
    psbt: &mut Psbt,
    script_pubkey: ScriptBuf,
    price: Amount,
    origin: &KeyOrigin,
) -> Result<()> {
    expect_len_at_least("anchor outputs", &psbt.outputs, 1)?;
    expect_len_at_least("anchor unsigned tx outputs", &psbt.unsigned_tx.output, 1)?;

    psbt.unsigned_tx.output[0] = TxOut {
        value: price,
        script_pubkey,
    };
    let x_only: XOnlyPublicKey = origin.pub_key.x_only_public_key().0;
    let key_source = (origin.fingerprint, origin.path.clone());
    let out = &mut psbt.outputs[0];
    out.tap_internal_key = Some(x_only);
    out.bip32_derivation.insert(origin.pub_key, key_source.clone());
    out.tap_key_origins.insert(x_only, (Vec::new(), key_source));
    Ok(())
}

/// Copy the internal key and key origins of virtual output 0 onto anchor
/// output 1.
pub fn retarget_first_asset_output(psbt: &mut Psbt, packet: &VirtualPacket) -> Result<()> {
    expect_len_at_least("anchor outputs", &psbt.outputs, 2)?;
    expect_len_at_least("virtual outputs", &packet.outputs, 1)?;
    let vout = &packet.outputs[0];
    let internal_key = vout
        .anchor_internal_key
        .ok_or_else(|| Error::Psbt("virtual output 0 has no anchor internal key".into()))?;

    let out = &mut psbt.outputs[1];
    out.tap_internal_key = Some(internal_key.x_only_public_key().0);
    out.bip32_derivation = vout
        .anchor_bip32_derivation
        .iter()
        .map(|o| (o.pub_key, (o.fingerprint, o.path.clone())))
        .collect();
    out.tap_key_origins = vout
        .anchor_tr_bip32_derivation
        .iter()
        .map(|o| {
            (
                o.pub_key.x_only_public_key().0,
                (Vec::new(), (o.fingerprint, o.path.clone())),
            )
        })
        .collect();
    Ok(())
}

/// Set the sighash flag on the first `count` inputs.
pub fn set_input_sighash(psbt: &mut Psbt, count: usize, sighash: TapSighashType) -> Result<()> {
    expect_len_at_least("anchor inputs", &psbt.inputs, count)?;
    for input in psbt.inputs.iter_mut().take(count) {
        input.sighash_type = Some(PsbtSighashType::from(sighash));
    }
    Ok(())
}

/// Drop every input and output past the given counts.
pub fn trim(psbt: &mut Psbt, inputs: usize, outputs: usize) -> Result<()> {
    expect_len_at_least("anchor inputs", &psbt.inputs, inputs)?;
    expect_len_at_least("anchor unsigned tx inputs", &psbt.unsigned_tx.input, inputs)?;
    expect_len_at_least("anchor outputs", &psbt.outputs, outputs)?;
    expect_len_at_least("anchor unsigned tx outputs", &psbt.unsigned_tx.output, outputs)?;

    psbt.inputs.truncate(inputs);
    psbt.unsigned_tx.input.truncate(inputs);
    psbt.outputs.truncate(outputs);
    psbt.unsigned_tx.output.truncate(outputs);
    Ok(())
}

/// Every input carries a final witness or script sig.
pub fn is_complete(psbt: &Psbt) -> bool {
    !psbt.inputs.is_empty()
        && psbt
            .inputs
            .iter()
            .all(|i| i.final_script_witness.is_some() || i.final_script_sig.is_some())
}
