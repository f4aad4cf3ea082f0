//! Versioned hand-off bundles exchanged between seller and buyer.
//!
//! An envelope is a JSON object carrying `version`, `kind` and hex-encoded
//! byte fields, wrapped in standard base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::services::CommitResponse;

pub const ENVELOPE_VERSION: u8 = 1;

#[derive(Deserialize)]
struct Header {
    version: u8,
    kind: String,
}

#[derive(Serialize)]
struct Framed<'a, T> {
    version: u8,
    kind: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

/// Shared framing for both envelope kinds.
pub trait Envelope: Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn encode(&self) -> Result<String> {
        let framed = Framed {
            version: ENVELOPE_VERSION,
            kind: Self::KIND,
            body: self,
        };
        let json = serde_json::to_vec(&framed)
            .map_err(|e| Error::Envelope(format!("{}: {e}", Self::KIND)))?;
        Ok(STANDARD.encode(json))
    }

    fn decode(encoded: &str) -> Result<Self> {
        let json = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Envelope(format!("base64: {e}")))?;
        let header: Header =
            serde_json::from_slice(&json).map_err(|e| Error::Envelope(format!("json: {e}")))?;
        if header.version != ENVELOPE_VERSION {
            return Err(Error::UnsupportedEnvelopeVersion {
                found: header.version,
                expected: ENVELOPE_VERSION,
            });
        }
        if header.kind != Self::KIND {
            return Err(Error::WrongEnvelopeKind {
                expected: Self::KIND,
                found: header.kind,
            });
        }
        serde_json::from_slice(&json).map_err(|e| Error::Envelope(format!("{}: {e}", Self::KIND)))
    }
}

/// Seller → buyer: the signed virtual packet and the seller-signed,
/// not yet finalized anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOrderEnvelope {
    #[serde(with = "hex_bytes")]
    pub vpacket: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub anchor_psbt: Vec<u8>,
}

impl Envelope for SellOrderEnvelope {
    const KIND: &'static str = "sell_order";
}

/// Buyer → seller: everything needed to publish and register the swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyOrderEnvelope {
    /// Finalized anchor.
    #[serde(with = "hex_bytes")]
    pub anchor_psbt: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub vpacket: Vec<u8>,
    pub commit: CommitResponse,
    /// Compressed buyer script key.
    #[serde(with = "hex_bytes")]
    pub script_key: Vec<u8>,
    /// `txid:1` of the finalized anchor.
    pub outpoint: String,
}

impl Envelope for BuyOrderEnvelope {
    const KIND: &'static str = "buy_order";
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, T: AsRef<[u8]>>(bytes: T, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod hex_bytes_vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
        items.iter().map(hex::encode).collect::<Vec<_>>().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(d)?
            .iter()
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sell() -> SellOrderEnvelope {
        SellOrderEnvelope {
            vpacket: vec![1, 2, 3],
            anchor_psbt: b"psbt\xff".to_vec(),
        }
    }

    fn buy() -> BuyOrderEnvelope {
        BuyOrderEnvelope {
            anchor_psbt: vec![0xaa; 8],
            vpacket: vec![0xbb; 4],
            commit: CommitResponse {
                anchor_psbt: vec![0xcc; 3],
                virtual_packets: vec![vec![0xdd], vec![]],
                change_output_index: -1,
                locked_utxos: Vec::new(),
            },
            script_key: vec![0x02; 33],
            outpoint: format!("{}:1", "ab".repeat(32)),
        }
    }

    #[test]
    fn sell_order_round_trip() {
        let env = sell();
        let decoded = SellOrderEnvelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn buy_order_round_trip() {
        let env = buy();
        let decoded = BuyOrderEnvelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded.anchor_psbt, env.anchor_psbt);
        assert_eq!(decoded.commit, env.commit);
        assert_eq!(decoded, env);
    }

    #[test]
    fn rejects_wrong_kind() {
        let encoded = sell().encode().unwrap();
        assert!(matches!(
            BuyOrderEnvelope::decode(&encoded),
            Err(Error::WrongEnvelopeKind {
                expected: "buy_order",
                ..
            })
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let json = r#"{"version":2,"kind":"sell_order","vpacket":"","anchor_psbt":""}"#;
        let encoded = STANDARD.encode(json);
        assert!(matches!(
            SellOrderEnvelope::decode(&encoded),
            Err(Error::UnsupportedEnvelopeVersion {
                found: 2,
                expected: 1
            })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            SellOrderEnvelope::decode("!!not base64!!"),
            Err(Error::Envelope(_))
        ));
        assert!(matches!(
            SellOrderEnvelope::decode(&STANDARD.encode("{")),
            Err(Error::Envelope(_))
        ));
        let bad_hex = STANDARD
            .encode(r#"{"version":1,"kind":"sell_order","vpacket":"zz","anchor_psbt":""}"#);
        assert!(SellOrderEnvelope::decode(&bad_hex).is_err());
    }
}
