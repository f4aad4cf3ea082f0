//! The four protocol phases, each a method on [`SwapSdk`](crate::SwapSdk).

pub mod buy_order;
pub mod registrar;
pub mod sell_order;
pub mod settlement;

pub use buy_order::BuyOrderRequest;
pub use registrar::RegistrationReport;
pub use sell_order::SellOrderRequest;

use crate::config::MAX_FEE_RATE;
use crate::error::{Error, Result};
use crate::invariant::{expect_eq, expect_len_in};
use crate::vpacket::VirtualPacket;

pub(crate) fn check_fee_rate(fee_rate: u32) -> Result<()> {
    if fee_rate > MAX_FEE_RATE {
        return Err(Error::FeeRateExceeded {
            fee_rate,
            max: MAX_FEE_RATE,
        });
    }
    Ok(())
}

/// Shape of a prepared packet: one or two outputs, output 0 materialized
/// under its own script key. Re-run on every packet a collaborator returns.
pub(crate) fn check_prepared_outputs(packet: &VirtualPacket) -> Result<()> {
    expect_len_in("virtual outputs", &packet.outputs, &[1, 2])?;
    let recipient = &packet.outputs[0];
    let prepared_key = recipient
        .asset
        .as_ref()
        .map(|a| a.script_key)
        .ok_or_else(|| Error::AssetPreparation("output 0 has no asset".into()))?;
    expect_eq("output 0 script key", &prepared_key, &recipient.script_key)?;
    Ok(())
}
