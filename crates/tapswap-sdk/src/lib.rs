pub use bitcoin;

pub mod anchor;
pub mod asset;
pub mod config;
pub mod envelope;
pub mod error;
pub mod invariant;
pub mod keys;
pub mod network;
pub mod outpoint;
pub mod sdk;
pub mod services;
pub mod swap;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod vpacket;

// Core types
pub use asset::AssetId;
pub use config::{DEFAULT_CALL_TIMEOUT, MAX_FEE_RATE, SwapConfig};
pub use error::{Error, Result};
pub use invariant::InvariantViolation;
pub use network::Network;
pub use outpoint::SwapOutPoint;
pub use sdk::SwapSdk;

// Keys
pub use keys::{KeyDescriptor, RoleKeys, SWAP_KEY_FAMILY, derive_role_keys};

// Envelopes
pub use envelope::{BuyOrderEnvelope, ENVELOPE_VERSION, Envelope, SellOrderEnvelope};

// Virtual packets
pub use vpacket::{
    CourierAddress, OutputType, VirtualInput, VirtualOutput, VirtualPacket, prepare_output_assets,
};

// Collaborator seams
pub use services::{
    AssetService, CoinConstraint, CommitResponse, LastProofQuery, LastProofResponse, ProofSource,
    UniverseService, WalletService,
};

// Swap phases
pub use swap::registrar::fetch_last_proof;
pub use swap::{BuyOrderRequest, RegistrationReport, SellOrderRequest};
