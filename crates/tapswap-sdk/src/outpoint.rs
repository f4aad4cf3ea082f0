use std::str::FromStr;

use bitcoin::{OutPoint, Txid};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A `txid:index` reference validated once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SwapOutPoint {
    txid: Txid,
    index: u32,
}

impl SwapOutPoint {
    pub fn new(txid: Txid, index: u32) -> Self {
        Self { txid, index }
    }

    pub fn txid(&self) -> Txid {
        self.txid
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn to_outpoint(self) -> OutPoint {
        OutPoint::new(self.txid, self.index)
    }
}

impl From<OutPoint> for SwapOutPoint {
    fn from(op: OutPoint) -> Self {
        Self::new(op.txid, op.vout)
    }
}

impl FromStr for SwapOutPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split(':').collect();
        let [txid_hex, index_str] = fields.as_slice() else {
            return Err(Error::InvalidOutPoint(format!(
                "expected txid:index, got {s:?}"
            )));
        };
        if txid_hex.len() != 64 || !txid_hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidOutPoint(format!(
                "txid must be 64 hex characters, got {txid_hex:?}"
            )));
        }
        let txid = Txid::from_str(txid_hex)
            .map_err(|e| Error::InvalidOutPoint(format!("bad txid: {e}")))?;
        // u32::from_str accepts a leading '+', which is not a canonical index
        if index_str.is_empty() || !index_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidOutPoint(format!(
                "index must be a non-negative integer, got {index_str:?}"
            )));
        }
        let index = index_str
            .parse::<u32>()
            .map_err(|e| Error::InvalidOutPoint(format!("bad index: {e}")))?;
        Ok(Self { txid, index })
    }
}

impl std::fmt::Display for SwapOutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

impl From<SwapOutPoint> for String {
    fn from(op: SwapOutPoint) -> Self {
        op.to_string()
    }
}

impl TryFrom<String> for SwapOutPoint {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}
