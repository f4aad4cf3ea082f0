//! Single-use key material for one party's role in a swap.

use std::time::Duration;

use bitcoin::bip32::{ChildNumber, DerivationPath};
use bitcoin::secp256k1::PublicKey;
use bitcoin::XOnlyPublicKey;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::services::{RawKeyDescriptor, WalletService, call};

/// Key family reserved for taproot asset keys.
pub const SWAP_KEY_FAMILY: u32 = 212;

/// BIP-43 purpose used for anchor internal keys.
pub const ANCHOR_KEY_PURPOSE: u32 = 1017;

/// A public key plus the locator the wallet used to derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    pub pub_key: PublicKey,
    pub family: u32,
    pub index: u32,
}

impl KeyDescriptor {
    pub fn x_only(&self) -> XOnlyPublicKey {
        self.pub_key.x_only_public_key().0
    }

    /// `m/1017'/coin_type'/family'/0/index`
    pub fn derivation_path(&self, coin_type: u32) -> Result<DerivationPath> {
        let hardened = |i: u32| {
            ChildNumber::from_hardened_idx(i)
                .map_err(|e| Error::InvalidDerivationPath(e.to_string()))
        };
        let normal = |i: u32| {
            ChildNumber::from_normal_idx(i).map_err(|e| Error::InvalidDerivationPath(e.to_string()))
        };
        Ok(DerivationPath::from(vec![
            hardened(ANCHOR_KEY_PURPOSE)?,
            hardened(coin_type)?,
            hardened(self.family)?,
            normal(0)?,
            normal(self.index)?,
        ]))
    }
}

/// The script key names the asset owner; the internal key anchors the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleKeys {
    pub script_key: KeyDescriptor,
    pub internal_key: KeyDescriptor,
}

fn parse_descriptor(raw: RawKeyDescriptor, family: u32, what: &str) -> Result<KeyDescriptor> {
    if raw.family != family {
        return Err(Error::KeyDerivation(format!(
            "{what} derived in family {}, expected {family}",
            raw.family
        )));
    }
    let pub_key = PublicKey::from_slice(&raw.raw_key_bytes)
        .map_err(|e| Error::KeyDerivation(format!("malformed {what}: {e}")))?;
    Ok(KeyDescriptor {
        pub_key,
        family: raw.family,
        index: raw.index,
    })
}

/// Derive a fresh script key and internal key.
///
/// The wallet marks both keys used as soon as it hands them out, so an abort
/// later in the phase still consumes them.
pub async fn derive_role_keys<W: WalletService>(
    wallet: &W,
    family: u32,
    timeout: Duration,
) -> Result<RoleKeys> {
    let script_raw = call("derive_script_key", timeout, wallet.derive_script_key(family))
        .await
        .map_err(as_key_error)?;
    let script_key = parse_descriptor(script_raw, family, "script key")?;

    let internal_raw = call("derive_internal_key", timeout, wallet.derive_internal_key(family))
        .await
        .map_err(as_key_error)?;
    let internal_key = parse_descriptor(internal_raw, family, "internal key")?;

    log::debug!(
        "derived role keys: script={} internal={}",
        script_key.pub_key,
        internal_key.pub_key
    );
    Ok(RoleKeys {
        script_key,
        internal_key,
    })
}

fn as_key_error(e: Error) -> Error {
    match e {
        Error::Service { op, message } => Error::KeyDerivation(format!("{op}: {message}")),
        Error::Timeout { op, timeout } => {
            Error::KeyDerivation(format!("{op} timed out after {timeout:?}"))
        }
        other => other,
    }
}
