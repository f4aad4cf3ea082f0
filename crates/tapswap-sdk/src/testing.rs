//! In-memory collaborators for exercising the swap phases without a wallet,
//! asset daemon or universe server.
//!
//! Every mock records the operations it served, in order, and can be told to
//! fail a named operation.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, schnorr};
use bitcoin::{
    Address, Amount, OutPoint, ScriptBuf, Sequence, TapSighashType, TxIn, TxOut, Txid, Witness,
    taproot,
};

use crate::anchor::{decode_psbt, encode_psbt, is_complete, txid};
use crate::asset::AssetId;
use crate::network::Network;
use crate::sdk::SwapSdk;
use crate::services::{
    AssetService, CommitRequest, CommitResponse, DecodedProof, FundRequest, GenesisInfo,
    ImportProofRequest, ImportReceipt, LastProofQuery, LastProofResponse, OwnedAddress,
    ProofSource, PublishRequest, RawKeyDescriptor, RegisterTransferRequest, RegisteredTransfer,
    ServiceResult, SignedPsbt, SignedVirtual, TransferReceipt, UniverseId, UniverseLeaf,
    UniverseRoot, UniverseService, WalletService,
};
use crate::swap::SellOrderRequest;
use crate::vpacket::{OutputType, VirtualPacket};

/// Asset id used throughout the fixtures (`a1` repeated).
pub const TEST_ASSET_ID: [u8; 32] = [0xa1; 32];

/// Value of the BTC change output added by [`MockAssetService::commit`].
pub const CHANGE_VALUE: Amount = Amount::from_sat(10_000);

pub fn test_asset_id() -> AssetId {
    AssetId::from_bytes(TEST_ASSET_ID)
}

pub fn test_asset_id_hex() -> String {
    test_asset_id().to_hex()
}

/// Deterministic key for `seed`; distinct seeds give distinct keys.
pub fn test_key(seed: u8) -> PublicKey {
    let mut bytes = [0x42; 32];
    bytes[0] = seed;
    bytes[1] = seed.wrapping_add(1);
    let sk = SecretKey::from_slice(&bytes).expect("valid scalar");
    PublicKey::from_secret_key(&Secp256k1::new(), &sk)
}

/// Placeholder schnorr signature; the mocks never verify signatures.
pub fn fake_signature(sighash_type: TapSighashType) -> taproot::Signature {
    taproot::Signature {
        signature: schnorr::Signature::from_slice(&[0x01; 64]).expect("64 bytes"),
        sighash_type,
    }
}

pub type MockSdk = SwapSdk<MockWallet, MockAssetService, MockUniverse>;

/// Regtest SDK over fresh mocks. `coin_amount` is the size of the one asset
/// coin the asset service owns.
pub fn mock_sdk(wallet_seed: u8, coin_amount: u64) -> MockSdk {
    SwapSdk::new(
        MockWallet::new(wallet_seed),
        MockAssetService::new(coin_amount),
        MockUniverse::new(test_asset_id()),
        Network::Regtest,
    )
}

pub fn sell_request(amount: u64, price_sats: u64, fee_rate: u32) -> SellOrderRequest {
    SellOrderRequest {
        asset_id: test_asset_id_hex(),
        amount,
        price_sats,
        fee_rate,
        coin: None,
    }
}

/// Shared call log and failure switches.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl Recorder {
    fn enter(&self, op: &'static str) -> ServiceResult<()> {
        self.calls.lock().unwrap().push(op);
        if self.failing.lock().unwrap().contains(op) {
            return Err(format!("{op}: injected failure"));
        }
        Ok(())
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn fail_on(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }
}

// ── Wallet ──────────────────────────────────────────────────────────────────

pub struct MockWallet {
    seed: u8,
    network: Network,
    next_index: AtomicU32,
    withhold_signatures: AtomicBool,
    recorder: Recorder,
}

impl MockWallet {
    pub fn new(seed: u8) -> Self {
        Self {
            seed,
            network: Network::Regtest,
            next_index: AtomicU32::new(0),
            withhold_signatures: AtomicBool::new(false),
            recorder: Recorder::default(),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.recorder.calls()
    }

    pub fn fail_on(&self, op: &'static str) {
        self.recorder.fail_on(op);
    }

    /// Make `sign_psbt` succeed without signing anything.
    pub fn withhold_signatures(&self) {
        self.withhold_signatures.store(true, Ordering::SeqCst);
    }

    /// Key behind the wallet's receiving address.
    pub fn address_key(&self) -> PublicKey {
        test_key(self.seed.wrapping_add(100))
    }

    pub fn address(&self) -> String {
        let x_only = self.address_key().x_only_public_key().0;
        Address::p2tr(&Secp256k1::new(), x_only, None, self.network.to_bitcoin()).to_string()
    }

    fn derive(&self, family: u32, offset: u8) -> RawKeyDescriptor {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let seed = self
            .seed
            .wrapping_add(offset)
            .wrapping_add((index as u8).wrapping_mul(2));
        RawKeyDescriptor {
            raw_key_bytes: test_key(seed).serialize().to_vec(),
            family,
            index,
        }
    }
}

impl WalletService for MockWallet {
    async fn derive_script_key(&self, family: u32) -> ServiceResult<RawKeyDescriptor> {
        self.recorder.enter("derive_script_key")?;
        Ok(self.derive(family, 1))
    }

    async fn derive_internal_key(&self, family: u32) -> ServiceResult<RawKeyDescriptor> {
        self.recorder.enter("derive_internal_key")?;
        Ok(self.derive(family, 50))
    }

    async fn new_address(&self) -> ServiceResult<String> {
        self.recorder.enter("new_address")?;
        Ok(self.address())
    }

    async fn list_owned_addresses(&self) -> ServiceResult<Vec<OwnedAddress>> {
        self.recorder.enter("list_owned_addresses")?;
        let decoy = test_key(self.seed.wrapping_add(101)).x_only_public_key().0;
        Ok(vec![
            OwnedAddress {
                address: Address::p2tr(&Secp256k1::new(), decoy, None, self.network.to_bitcoin())
                    .to_string(),
                internal_key: test_key(self.seed.wrapping_add(101)),
                derivation_path: "m/86/1/0/0/1".into(),
            },
            OwnedAddress {
                address: self.address(),
                internal_key: self.address_key(),
                derivation_path: "m/86/1/0/0/0".into(),
            },
        ])
    }

    /// Signs every input that carries neither a key signature nor a final
    /// witness.
    async fn sign_psbt(&self, psbt: Vec<u8>) -> ServiceResult<SignedPsbt> {
        self.recorder.enter("sign_psbt")?;
        if self.withhold_signatures.load(Ordering::SeqCst) {
            return Ok(SignedPsbt {
                psbt,
                signed_inputs: Vec::new(),
            });
        }
        let mut psbt = decode_psbt(&psbt).map_err(|e| e.to_string())?;
        let mut signed_inputs = Vec::new();
        for (idx, input) in psbt.inputs.iter_mut().enumerate() {
            if input.tap_key_sig.is_some() || input.final_script_witness.is_some() {
                continue;
            }
            let sighash = match input.sighash_type {
                Some(t) => t.taproot_hash_ty().map_err(|e| e.to_string())?,
                None => TapSighashType::Default,
            };
            input.tap_key_sig = Some(fake_signature(sighash));
            signed_inputs.push(idx as u32);
        }
        Ok(SignedPsbt {
            psbt: encode_psbt(&psbt),
            signed_inputs,
        })
    }

    async fn finalize_psbt(&self, psbt: Vec<u8>) -> ServiceResult<Vec<u8>> {
        self.recorder.enter("finalize_psbt")?;
        let mut psbt = decode_psbt(&psbt).map_err(|e| e.to_string())?;
        for (idx, input) in psbt.inputs.iter_mut().enumerate() {
            if input.final_script_witness.is_some() {
                continue;
            }
            let sig = input
                .tap_key_sig
                .take()
                .ok_or_else(|| format!("input {idx} is not signed"))?;
            input.final_script_witness = Some(Witness::from_slice(&[sig.to_vec()]));
        }
        Ok(encode_psbt(&psbt))
    }
}

// ── Asset service ───────────────────────────────────────────────────────────

/// Rewrites a virtual packet on its way back to the caller.
type PacketHook = Box<dyn Fn(&mut VirtualPacket) + Send>;

pub struct MockAssetService {
    /// Amount held by the single owned asset coin.
    coin_amount: u64,
    coin_outpoint: OutPoint,
    coin_script_key: PublicKey,
    change_key: PublicKey,
    funding_inputs: AtomicU32,
    published: Mutex<Vec<PublishRequest>>,
    signed_hook: Mutex<Option<PacketHook>>,
    committed_hook: Mutex<Option<PacketHook>>,
    recorder: Recorder,
}

impl MockAssetService {
    pub fn new(coin_amount: u64) -> Self {
        Self {
            coin_amount,
            coin_outpoint: OutPoint::new(Txid::from_byte_array([0x33; 32]), 0),
            coin_script_key: test_key(0x31),
            change_key: test_key(0x71),
            funding_inputs: AtomicU32::new(0),
            published: Mutex::new(Vec::new()),
            signed_hook: Mutex::new(None),
            committed_hook: Mutex::new(None),
            recorder: Recorder::default(),
        }
    }

    pub fn coin_outpoint(&self) -> OutPoint {
        self.coin_outpoint
    }

    pub fn coin_script_key(&self) -> PublicKey {
        self.coin_script_key
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.recorder.calls()
    }

    pub fn fail_on(&self, op: &'static str) {
        self.recorder.fail_on(op);
    }

    pub fn published(&self) -> Vec<PublishRequest> {
        self.published.lock().unwrap().clone()
    }

    /// Alter the packet returned by `sign_virtual`. The reported signed
    /// inputs still reflect the untouched packet.
    pub fn tamper_signed_virtual(&self, hook: impl Fn(&mut VirtualPacket) + Send + 'static) {
        *self.signed_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Alter every virtual packet returned by `commit`.
    pub fn tamper_committed_virtual(&self, hook: impl Fn(&mut VirtualPacket) + Send + 'static) {
        *self.committed_hook.lock().unwrap() = Some(Box::new(hook));
    }
}

impl AssetService for MockAssetService {
    /// Spends the owned coin, splitting off a change output when it holds
    /// more than requested.
    async fn fund_virtual(&self, request: FundRequest) -> ServiceResult<Vec<u8>> {
        self.recorder.enter("fund_virtual")?;
        let mut packet = VirtualPacket::from_bytes(&request.packet).map_err(|e| e.to_string())?;
        let [input] = packet.inputs.as_mut_slice() else {
            return Err("expected one placeholder input".into());
        };
        let wanted: u64 = packet.outputs.iter().map(|o| o.amount).sum();
        if wanted > self.coin_amount {
            return Err(format!("insufficient balance: {} < {wanted}", self.coin_amount));
        }
        input.prev_id.out_point = request
            .coin
            .map(|c| c.anchor_outpoint.to_outpoint())
            .unwrap_or(self.coin_outpoint);
        input.prev_id.script_key = Some(self.coin_script_key);
        input.amount = self.coin_amount;

        if self.coin_amount > wanted {
            let mut change = packet.outputs[0].clone();
            change.amount = self.coin_amount - wanted;
            change.output_type = OutputType::SplitRoot;
            change.script_key = self.change_key;
            change.anchor_output_index = packet.outputs.len() as u32 + 1;
            change.anchor_internal_key = Some(self.change_key);
            change.clear_anchor_derivation();
            packet.outputs.push(change);
        }
        packet.to_bytes().map_err(|e| e.to_string())
    }

    async fn sign_virtual(&self, packet: Vec<u8>) -> ServiceResult<SignedVirtual> {
        self.recorder.enter("sign_virtual")?;
        let mut packet = VirtualPacket::from_bytes(&packet).map_err(|e| e.to_string())?;
        for out in packet.outputs.iter_mut() {
            let asset = out.asset.as_mut().ok_or("output not prepared")?;
            for witness in asset.prev_witnesses.iter_mut() {
                if witness.prev_id.is_some() {
                    witness.tx_witness = vec![vec![0x5a; 64]];
                }
            }
        }
        let signed_inputs = (0..packet.inputs.len() as u32).collect();
        if let Some(hook) = self.signed_hook.lock().unwrap().as_ref() {
            hook(&mut packet);
        }
        Ok(SignedVirtual {
            signed_inputs,
            packet: packet.to_bytes().map_err(|e| e.to_string())?,
        })
    }

    /// Adds one BTC funding input and, when asked, a change output; re-keys
    /// every asset anchor output to its internal key.
    async fn commit(&self, request: CommitRequest) -> ServiceResult<CommitResponse> {
        self.recorder.enter("commit")?;
        let mut psbt = decode_psbt(&request.anchor_psbt).map_err(|e| e.to_string())?;
        let secp = Secp256k1::verification_only();

        for (tx_out, out) in psbt
            .unsigned_tx
            .output
            .iter_mut()
            .zip(psbt.outputs.iter())
            .skip(1)
        {
            if let Some(key) = out.tap_internal_key {
                tx_out.script_pubkey = ScriptBuf::new_p2tr(&secp, key, None);
            }
        }

        let n = self.funding_inputs.fetch_add(1, Ordering::SeqCst) as u8;
        let funding = OutPoint::new(Txid::from_byte_array([0xf0 ^ n; 32]), 1);
        psbt.unsigned_tx.input.push(TxIn {
            previous_output: funding,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        });
        psbt.inputs.push(Default::default());

        let mut change_output_index = -1;
        if request.add_change_output {
            let change = self.change_key.x_only_public_key().0;
            psbt.unsigned_tx.output.push(TxOut {
                value: CHANGE_VALUE,
                script_pubkey: ScriptBuf::new_p2tr(&secp, change, None),
            });
            psbt.outputs.push(Default::default());
            change_output_index = psbt.outputs.len() as i32 - 1;
        }

        let mut virtual_packets = request.virtual_packets;
        if let Some(hook) = self.committed_hook.lock().unwrap().as_ref() {
            for bytes in virtual_packets.iter_mut() {
                let mut packet = VirtualPacket::from_bytes(bytes).map_err(|e| e.to_string())?;
                hook(&mut packet);
                *bytes = packet.to_bytes().map_err(|e| e.to_string())?;
            }
        }

        Ok(CommitResponse {
            anchor_psbt: encode_psbt(&psbt),
            virtual_packets,
            change_output_index,
            locked_utxos: vec![funding],
        })
    }

    async fn publish_and_log(&self, request: PublishRequest) -> ServiceResult<TransferReceipt> {
        self.recorder.enter("publish_and_log")?;
        let psbt = decode_psbt(&request.anchor_psbt).map_err(|e| e.to_string())?;
        if !is_complete(&psbt) {
            return Err("anchor is not finalized".into());
        }
        let anchor_txid = txid(&psbt).to_string();
        self.published.lock().unwrap().push(request);
        Ok(TransferReceipt { anchor_txid })
    }
}

// ── Universe ────────────────────────────────────────────────────────────────

pub struct MockUniverse {
    asset_id: AssetId,
    group_key: Option<PublicKey>,
    proof_outpoint: OutPoint,
    proof_script_key: PublicKey,
    synced_hosts: Mutex<Vec<String>>,
    transfers: Mutex<Vec<RegisterTransferRequest>>,
    recorder: Recorder,
}

impl MockUniverse {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            group_key: None,
            proof_outpoint: OutPoint::new(Txid::from_byte_array([0x33; 32]), 0),
            proof_script_key: test_key(0x31),
            synced_hosts: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            recorder: Recorder::default(),
        }
    }

    pub fn with_group_key(mut self, group_key: PublicKey) -> Self {
        self.group_key = Some(group_key);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.recorder.calls()
    }

    pub fn fail_on(&self, op: &'static str) {
        self.recorder.fail_on(op);
    }

    pub fn synced_hosts(&self) -> Vec<String> {
        self.synced_hosts.lock().unwrap().clone()
    }

    pub fn transfers(&self) -> Vec<RegisterTransferRequest> {
        self.transfers.lock().unwrap().clone()
    }
}

impl UniverseService for MockUniverse {
    async fn sync_universe(&self, host: &str, _id: UniverseId) -> ServiceResult<()> {
        self.recorder.enter("sync_universe")?;
        self.synced_hosts.lock().unwrap().push(host.to_string());
        Ok(())
    }

    async fn fetch_root(&self, asset_id: AssetId) -> ServiceResult<UniverseRoot> {
        self.recorder.enter("fetch_root")?;
        if asset_id != self.asset_id {
            return Err(format!("no universe for {asset_id}"));
        }
        Ok(UniverseRoot {
            asset_id,
            group_key: self.group_key,
            genesis: GenesisInfo {
                name: "tapswap-fixture".into(),
                genesis_point: OutPoint::new(Txid::from_byte_array([0x11; 32]), 0),
                output_index: 0,
            },
        })
    }

    async fn fetch_leaves(&self, _id: UniverseId) -> ServiceResult<Vec<UniverseLeaf>> {
        self.recorder.enter("fetch_leaves")?;
        Ok(vec![UniverseLeaf {
            script_key: self.proof_script_key,
            amount: 10,
        }])
    }

    async fn decode_proof(&self, proof: Vec<u8>) -> ServiceResult<DecodedProof> {
        self.recorder.enter("decode_proof")?;
        if !proof.starts_with(b"proof") {
            return Err("unrecognized proof encoding".into());
        }
        Ok(DecodedProof {
            asset_id: self.asset_id,
            group_key: self.group_key,
            script_key: self.proof_script_key,
            outpoint: self.proof_outpoint,
        })
    }

    async fn import_proof(&self, _request: ImportProofRequest) -> ServiceResult<ImportReceipt> {
        self.recorder.enter("import_proof")?;
        Ok(ImportReceipt { new_root_sum: 10 })
    }

    async fn register_transfer(
        &self,
        request: RegisterTransferRequest,
    ) -> ServiceResult<RegisteredTransfer> {
        self.recorder.enter("register_transfer")?;
        let registered = RegisteredTransfer {
            outpoint: request.outpoint,
            amount: 10,
        };
        self.transfers.lock().unwrap().push(request);
        Ok(registered)
    }
}

/// Proof blob [`MockUniverse::decode_proof`] accepts, base64-encoded.
pub fn test_last_proof() -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(b"proof:fixture")
}

// ── Proof server ────────────────────────────────────────────────────────────

pub struct MockProofSource {
    response: LastProofResponse,
    queries: Mutex<Vec<LastProofQuery>>,
}

impl MockProofSource {
    pub fn new(response: LastProofResponse) -> Self {
        Self {
            response,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Serves [`test_last_proof`].
    pub fn serving_fixture() -> Self {
        Self::new(LastProofResponse {
            errno: 0,
            errmsg: String::new(),
            data: test_last_proof(),
        })
    }

    pub fn queries(&self) -> Vec<LastProofQuery> {
        self.queries.lock().unwrap().clone()
    }
}

impl ProofSource for MockProofSource {
    async fn get_last_proof(&self, query: LastProofQuery) -> ServiceResult<LastProofResponse> {
        self.queries.lock().unwrap().push(query);
        Ok(self.response.clone())
    }
}
