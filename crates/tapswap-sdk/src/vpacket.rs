//! Asset-level virtual transaction templates.
//!
//! A virtual packet moves asset units from its inputs to its outputs
//! independently of the base-chain transaction that anchors it. Each output
//! names the anchor output it will be committed into.

use bitcoin::bip32::{DerivationPath, Fingerprint};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{OutPoint, TapSighashType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::asset::AssetId;
use crate::error::{Error, Result};
use crate::invariant::{expect_eq, expect_len_at_least};
use crate::keys::KeyDescriptor;
use crate::network::Network;

pub const VIRTUAL_PACKET_VERSION: u8 = 1;

/// Anchor output index of the first virtual output; index 0 is the payment.
pub const FIRST_ASSET_ANCHOR_INDEX: u32 = 1;

/// Master fingerprint recorded on every key origin.
///
/// Wallet key descriptors carry family and index but not the master key, so
/// origins are left zeroed and the signing wallet resolves them by path.
pub fn unknown_master_fingerprint() -> Fingerprint {
    Fingerprint::default()
}

/// Identifies the asset unit an input spends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrevId {
    pub out_point: OutPoint,
    pub asset_id: AssetId,
    pub script_key: Option<PublicKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualInput {
    pub prev_id: PrevId,
    pub amount: u64,
    /// Taproot sighash flag byte (`0x00` is the default mode).
    pub sighash_type: u8,
}

impl VirtualInput {
    pub fn sighash(&self) -> Result<TapSighashType> {
        TapSighashType::from_consensus_u8(self.sighash_type)
            .map_err(|e| Error::VirtualPacket(format!("bad sighash flag: {e}")))
    }

    pub fn set_sighash(&mut self, sighash: TapSighashType) {
        self.sighash_type = sighash as u8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    /// Plain transfer of the full output amount.
    Simple,
    /// Split root carrying the witnesses of every input.
    SplitRoot,
}

/// BIP-32 origin of a key attached to an anchor output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOrigin {
    pub pub_key: PublicKey,
    pub fingerprint: Fingerprint,
    pub path: DerivationPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourierScheme {
    /// Receiver fetches the proof from a remote universe server.
    UniverseRpc,
}

impl CourierScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            CourierScheme::UniverseRpc => "universerpc",
        }
    }
}

/// Where the receiver of an output picks up its transfer proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierAddress {
    pub scheme: CourierScheme,
    pub host: String,
}

impl CourierAddress {
    pub fn universe_rpc(host: &str) -> Result<Self> {
        let host = host.trim();
        if host.is_empty() || host.contains("://") || host.contains(char::is_whitespace) {
            return Err(Error::InvalidCourierHost(host.to_string()));
        }
        Ok(Self {
            scheme: CourierScheme::UniverseRpc,
            host: host.to_string(),
        })
    }
}

impl std::fmt::Display for CourierAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.host)
    }
}

/// Links a split output back to the root output holding the input witnesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCommitment {
    pub root_output_index: u32,
}

/// One link of an asset's ownership-witness chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub prev_id: Option<PrevId>,
    /// Raw witness stack, filled in by the signer.
    pub tx_witness: Vec<Vec<u8>>,
    pub split_commitment: Option<SplitCommitment>,
}

/// The asset materialized for an output by [`prepare_output_assets`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: AssetId,
    pub amount: u64,
    pub script_key: PublicKey,
    pub lock_time: u64,
    pub relative_lock_time: u64,
    pub prev_witnesses: Vec<Witness>,
    pub commitment: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualOutput {
    pub amount: u64,
    pub output_type: OutputType,
    pub script_key: PublicKey,
    pub anchor_output_index: u32,
    pub anchor_internal_key: Option<PublicKey>,
    pub anchor_bip32_derivation: Vec<KeyOrigin>,
    pub anchor_tr_bip32_derivation: Vec<KeyOrigin>,
    pub proof_courier_addr: Option<CourierAddress>,
    pub lock_time: u64,
    pub relative_lock_time: u64,
    pub asset: Option<Asset>,
}

impl VirtualOutput {
    /// Set the anchor internal key together with its derivation under the
    /// network's coin type.
    pub fn set_anchor_internal_key(&mut self, key: &KeyDescriptor, coin_type: u32) -> Result<()> {
        let origin = KeyOrigin {
            pub_key: key.pub_key,
            fingerprint: unknown_master_fingerprint(),
            path: key.derivation_path(coin_type)?,
        };
        self.anchor_internal_key = Some(key.pub_key);
        self.anchor_bip32_derivation = vec![origin.clone()];
        self.anchor_tr_bip32_derivation = vec![origin];
        Ok(())
    }

    pub fn clear_anchor_derivation(&mut self) {
        self.anchor_bip32_derivation.clear();
        self.anchor_tr_bip32_derivation.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPacket {
    pub version: u8,
    pub network: Network,
    pub inputs: Vec<VirtualInput>,
    pub outputs: Vec<VirtualOutput>,
}

impl VirtualPacket {
    /// Template for an interactive full-value send of `amount` units.
    ///
    /// The single input only names the asset; funding selects the real coin.
    /// The output is anchored right after the payment output.
    pub fn interactive_send(
        asset_id: AssetId,
        amount: u64,
        script_key: PublicKey,
        internal_key: &KeyDescriptor,
        relative_lock_time: u64,
        network: Network,
    ) -> Result<Self> {
        let mut output = VirtualOutput {
            amount,
            output_type: OutputType::Simple,
            script_key,
            anchor_output_index: FIRST_ASSET_ANCHOR_INDEX,
            anchor_internal_key: None,
            anchor_bip32_derivation: Vec::new(),
            anchor_tr_bip32_derivation: Vec::new(),
            proof_courier_addr: None,
            lock_time: 0,
            relative_lock_time,
            asset: None,
        };
        output.set_anchor_internal_key(internal_key, network.coin_type())?;

        Ok(Self {
            version: VIRTUAL_PACKET_VERSION,
            network,
            inputs: vec![VirtualInput {
                prev_id: PrevId {
                    out_point: OutPoint::null(),
                    asset_id,
                    script_key: None,
                },
                amount: 0,
                sighash_type: TapSighashType::Default as u8,
            }],
            outputs: vec![output],
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::VirtualPacket(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let packet: Self =
            serde_json::from_slice(bytes).map_err(|e| Error::VirtualPacket(e.to_string()))?;
        if packet.version != VIRTUAL_PACKET_VERSION {
            return Err(Error::VirtualPacket(format!(
                "unsupported version {}",
                packet.version
            )));
        }
        Ok(packet)
    }

    /// Ownership witnesses per output, `None` for unprepared outputs.
    pub fn snapshot_witnesses(&self) -> Vec<Option<Vec<Witness>>> {
        self.outputs
            .iter()
            .map(|out| out.asset.as_ref().map(|a| a.prev_witnesses.clone()))
            .collect()
    }

    /// Put back witnesses taken by [`snapshot_witnesses`](Self::snapshot_witnesses).
    pub fn restore_witnesses(&mut self, snapshot: Vec<Option<Vec<Witness>>>) {
        for (out, witnesses) in self.outputs.iter_mut().zip(snapshot) {
            if let (Some(asset), Some(witnesses)) = (out.asset.as_mut(), witnesses) {
                asset.prev_witnesses = witnesses;
            }
        }
    }
}

/// Leaf commitment of a materialized asset.
pub fn asset_commitment(asset_id: &AssetId, amount: u64, script_key: &PublicKey) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(asset_id.as_bytes());
    hasher.update(amount.to_be_bytes());
    hasher.update(script_key.serialize());
    hasher.finalize().into()
}

/// Materialize every output's asset from the packet's inputs.
///
/// Recomputes commitments and rebuilds the witness chains from scratch:
/// any signatures previously attached to the outputs are dropped.
pub fn prepare_output_assets(packet: &mut VirtualPacket) -> Result<()> {
    expect_len_at_least("virtual inputs", &packet.inputs, 1)?;
    expect_len_at_least("virtual outputs", &packet.outputs, 1)?;

    let asset_id = packet.inputs[0].prev_id.asset_id;
    for input in &packet.inputs {
        expect_eq("input asset id", &input.prev_id.asset_id, &asset_id)?;
    }

    let total_in = packet
        .inputs
        .iter()
        .try_fold(0u64, |acc, i| acc.checked_add(i.amount))
        .ok_or_else(|| Error::AssetPreparation("input amount overflow".into()))?;
    let total_out = packet
        .outputs
        .iter()
        .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
        .ok_or_else(|| Error::AssetPreparation("output amount overflow".into()))?;
    if total_in != total_out {
        return Err(Error::AssetPreparation(format!(
            "inputs carry {total_in} units but outputs carry {total_out}"
        )));
    }

    let root_index = if packet.outputs.len() == 1 {
        0
    } else {
        let roots: Vec<usize> = packet
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, o)| o.output_type == OutputType::SplitRoot)
            .map(|(i, _)| i)
            .collect();
        match roots.as_slice() {
            [root] => *root,
            _ => {
                return Err(Error::AssetPreparation(format!(
                    "split send needs exactly one split root, found {}",
                    roots.len()
                )));
            }
        }
    };

    let input_witnesses: Vec<Witness> = packet
        .inputs
        .iter()
        .map(|input| Witness {
            prev_id: Some(input.prev_id.clone()),
            tx_witness: Vec::new(),
            split_commitment: None,
        })
        .collect();

    for (idx, out) in packet.outputs.iter_mut().enumerate() {
        let prev_witnesses = if idx == root_index {
            input_witnesses.clone()
        } else {
            vec![Witness {
                prev_id: None,
                tx_witness: Vec::new(),
                split_commitment: Some(SplitCommitment {
                    root_output_index: root_index as u32,
                }),
            }]
        };
        out.asset = Some(Asset {
            asset_id,
            amount: out.amount,
            script_key: out.script_key,
            lock_time: out.lock_time,
            relative_lock_time: out.relative_lock_time,
            prev_witnesses,
            commitment: asset_commitment(&asset_id, out.amount, &out.script_key),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    fn key(b: u8) -> KeyDescriptor {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[b; 32]).unwrap();
        KeyDescriptor {
            pub_key: PublicKey::from_secret_key(&secp, &sk),
            family: 212,
            index: b as u32,
        }
    }

    fn funded_packet(change: Option<u64>) -> VirtualPacket {
        let asset_id = AssetId::from_bytes([0xa1; 32]);
        let mut packet = VirtualPacket::interactive_send(
            asset_id,
            10,
            key(1).pub_key,
            &key(2),
            0,
            Network::Regtest,
        )
        .unwrap();
        packet.inputs[0].prev_id.out_point =
            OutPoint::new(bitcoin::Txid::from_byte_array([7; 32]), 0);
        packet.inputs[0].amount = 10 + change.unwrap_or(0);
        if let Some(amount) = change {
            let mut out = packet.outputs[0].clone();
            out.amount = amount;
            out.output_type = OutputType::SplitRoot;
            out.anchor_output_index = 2;
            packet.outputs.push(out);
        }
        packet
    }

    #[test]
    fn interactive_send_shape() {
        let packet = funded_packet(None);
        assert_eq!(packet.inputs.len(), 1);
        assert_eq!(packet.outputs[0].anchor_output_index, 1);
        assert_eq!(packet.outputs[0].anchor_internal_key, Some(key(2).pub_key));
        assert_eq!(packet.outputs[0].anchor_tr_bip32_derivation.len(), 1);
    }

    #[test]
    fn anchor_key_origin_leaves_fingerprint_zeroed() {
        let packet = funded_packet(None);
        let origin = &packet.outputs[0].anchor_tr_bip32_derivation[0];
        assert_eq!(origin.fingerprint, unknown_master_fingerprint());
        assert_eq!(origin.fingerprint, Fingerprint::from([0u8; 4]));
        assert_eq!(origin.path, key(2).derivation_path(1).unwrap());
        assert_eq!(packet.outputs[0].anchor_bip32_derivation[0], *origin);
    }

    #[test]
    fn prepare_single_output() {
        let mut packet = funded_packet(None);
        prepare_output_assets(&mut packet).unwrap();
        let asset = packet.outputs[0].asset.as_ref().unwrap();
        assert_eq!(asset.script_key, packet.outputs[0].script_key);
        assert_eq!(asset.prev_witnesses.len(), 1);
        assert!(asset.prev_witnesses[0].prev_id.is_some());
        assert_eq!(
            asset.commitment,
            asset_commitment(&asset.asset_id, 10, &asset.script_key)
        );
    }

    #[test]
    fn prepare_split_links_to_root() {
        let mut packet = funded_packet(Some(5));
        prepare_output_assets(&mut packet).unwrap();
        let recipient = packet.outputs[0].asset.as_ref().unwrap();
        assert_eq!(
            recipient.prev_witnesses[0].split_commitment,
            Some(SplitCommitment {
                root_output_index: 1
            })
        );
        let root = packet.outputs[1].asset.as_ref().unwrap();
        assert!(root.prev_witnesses[0].prev_id.is_some());
    }

    #[test]
    fn prepare_rejects_unbalanced_amounts() {
        let mut packet = funded_packet(None);
        packet.inputs[0].amount = 11;
        assert!(matches!(
            prepare_output_assets(&mut packet),
            Err(Error::AssetPreparation(_))
        ));
    }

    #[test]
    fn prepare_drops_signatures() {
        let mut packet = funded_packet(None);
        prepare_output_assets(&mut packet).unwrap();
        packet.outputs[0].asset.as_mut().unwrap().prev_witnesses[0].tx_witness = vec![vec![1; 64]];
        prepare_output_assets(&mut packet).unwrap();
        let witness = &packet.outputs[0].asset.as_ref().unwrap().prev_witnesses[0];
        assert!(witness.tx_witness.is_empty());
    }

    #[test]
    fn snapshot_restore_keeps_witnesses() {
        let mut packet = funded_packet(Some(5));
        prepare_output_assets(&mut packet).unwrap();
        for out in packet.outputs.iter_mut() {
            for w in out.asset.as_mut().unwrap().prev_witnesses.iter_mut() {
                w.tx_witness = vec![vec![0xee; 64]];
            }
        }
        let before = packet.snapshot_witnesses();

        packet.outputs[0].script_key = key(9).pub_key;
        prepare_output_assets(&mut packet).unwrap();
        packet.restore_witnesses(before.clone());

        assert_eq!(packet.snapshot_witnesses(), before);
        assert_eq!(
            packet.outputs[0].asset.as_ref().unwrap().script_key,
            key(9).pub_key
        );
    }

    #[test]
    fn codec_rejects_garbage() {
        assert!(VirtualPacket::from_bytes(b"not a packet").is_err());
        let packet = funded_packet(None);
        let decoded = VirtualPacket::from_bytes(&packet.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn courier_address_validation() {
        let addr = CourierAddress::universe_rpc("proofs.example.com:10029").unwrap();
        assert_eq!(addr.to_string(), "universerpc://proofs.example.com:10029");
        assert!(CourierAddress::universe_rpc("").is_err());
        assert!(CourierAddress::universe_rpc("https://x").is_err());
    }
}
