//! Structural sanity gates run after every collaborator response.
//!
//! A violation means a counterparty or service handed back an artifact the
//! protocol cannot work with. Callers abort the phase; nothing here is
//! retried or repaired.

use std::fmt::Debug;

use bitcoin::Psbt;
use thiserror::Error;

use crate::vpacket::VirtualPacket;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("{what}: expected length {expected}, found {actual}")]
    Length {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what}: length {actual} is not one of {allowed:?}")]
    LengthNotIn {
        what: &'static str,
        allowed: Vec<usize>,
        actual: usize,
    },

    #[error("{what}: expected at least {min} entries, found {actual}")]
    LengthBelow {
        what: &'static str,
        min: usize,
        actual: usize,
    },

    #[error("{what}: {item} not present")]
    Missing { what: &'static str, item: String },

    #[error("{what}: expected {expected}, found {actual}")]
    Mismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },
}

pub type CheckResult = std::result::Result<(), InvariantViolation>;

pub fn expect_len<T>(what: &'static str, items: &[T], expected: usize) -> CheckResult {
    if items.len() != expected {
        return Err(InvariantViolation::Length {
            what,
            expected,
            actual: items.len(),
        });
    }
    Ok(())
}

pub fn expect_len_in<T>(what: &'static str, items: &[T], allowed: &[usize]) -> CheckResult {
    if !allowed.contains(&items.len()) {
        return Err(InvariantViolation::LengthNotIn {
            what,
            allowed: allowed.to_vec(),
            actual: items.len(),
        });
    }
    Ok(())
}

pub fn expect_len_at_least<T>(what: &'static str, items: &[T], min: usize) -> CheckResult {
    if items.len() < min {
        return Err(InvariantViolation::LengthBelow {
            what,
            min,
            actual: items.len(),
        });
    }
    Ok(())
}

pub fn expect_contains<T: PartialEq + Debug>(what: &'static str, set: &[T], item: &T) -> CheckResult {
    if !set.contains(item) {
        return Err(InvariantViolation::Missing {
            what,
            item: format!("{item:?}"),
        });
    }
    Ok(())
}

pub fn expect_eq<T: PartialEq + Debug>(what: &'static str, actual: &T, expected: &T) -> CheckResult {
    if actual != expected {
        return Err(InvariantViolation::Mismatch {
            what,
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        });
    }
    Ok(())
}

/// Byte comparison reported in hex rather than as a `Debug` list of integers.
pub fn expect_bytes_eq(what: &'static str, actual: &[u8], expected: &[u8]) -> CheckResult {
    if actual != expected {
        return Err(InvariantViolation::Mismatch {
            what,
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}

/// The anchor carries one input per virtual input, and one output per
/// virtual output plus the payment output at index 0.
pub fn expect_anchor_shape(anchor: &Psbt, packet: &VirtualPacket) -> CheckResult {
    expect_len("anchor inputs", &anchor.inputs, packet.inputs.len())?;
    expect_len("anchor unsigned tx inputs", &anchor.unsigned_tx.input, packet.inputs.len())?;
    expect_len("anchor outputs", &anchor.outputs, packet.outputs.len() + 1)?;
    expect_len(
        "anchor unsigned tx outputs",
        &anchor.unsigned_tx.output,
        packet.outputs.len() + 1,
    )
}
