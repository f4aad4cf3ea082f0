//! `SwapNode`: the host's entry point into the swap protocol.
//!
//! Wraps one [`SwapSdk`] configured from [`AppConfig`] and fills in the
//! defaults (fee rate, courier host) a caller leaves out.

use tapswap_sdk::services::{AssetService, ProofSource, UniverseService, WalletService};
use tapswap_sdk::{
    BuyOrderRequest, CoinConstraint, RegistrationReport, SellOrderRequest, SwapSdk,
};

use crate::config::AppConfig;
use crate::error::NodeError;

/// Result of [`SwapNode::settle_and_register`].
///
/// The broadcast is final once `txid` is set; `registration` carries the
/// outcome of the follow-up proof work.
#[derive(Debug)]
pub struct SettlementOutcome {
    pub txid: String,
    pub registration: Result<RegistrationReport, NodeError>,
}

impl SettlementOutcome {
    /// Broadcast succeeded and every registration step went through.
    pub fn is_fully_registered(&self) -> bool {
        matches!(&self.registration, Ok(report) if report.is_clean())
    }
}

pub struct SwapNode<W, A, U> {
    sdk: SwapSdk<W, A, U>,
    default_fee_rate: u32,
    courier_host: String,
}

impl<W, A, U> SwapNode<W, A, U> {
    pub fn new(wallet: W, assets: A, universe: U, config: &AppConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let sdk = SwapSdk::new(wallet, assets, universe, config.network)
            .with_config(config.swap_config());
        log::info!(
            "swap node on {} (courier {})",
            config.network,
            config.courier_host()
        );
        Ok(Self {
            sdk,
            default_fee_rate: config.default_fee_rate,
            courier_host: config.courier_host().to_string(),
        })
    }

    pub fn sdk(&self) -> &SwapSdk<W, A, U> {
        &self.sdk
    }
}

impl<W: WalletService, A: AssetService, U: UniverseService> SwapNode<W, A, U> {
    pub async fn sell(
        &self,
        asset_id: &str,
        amount: u64,
        price_sats: u64,
        fee_rate: Option<u32>,
        coin: Option<CoinConstraint>,
    ) -> Result<String, NodeError> {
        let request = SellOrderRequest {
            asset_id: asset_id.to_string(),
            amount,
            price_sats,
            fee_rate: fee_rate.unwrap_or(self.default_fee_rate),
            coin,
        };
        Ok(self.sdk.build_sell_order(&request).await?)
    }

    pub async fn buy(&self, sell_order: &str, fee_rate: Option<u32>) -> Result<String, NodeError> {
        let request = BuyOrderRequest {
            sell_order: sell_order.to_string(),
            fee_rate: fee_rate.unwrap_or(self.default_fee_rate),
            proof_courier_host: self.courier_host.clone(),
        };
        Ok(self.sdk.build_buy_order(&request).await?)
    }

    pub async fn publish(&self, buy_order: &str) -> Result<String, NodeError> {
        Ok(self.sdk.publish(buy_order).await?)
    }

    pub async fn register(
        &self,
        asset_id: &str,
        buy_order: &str,
        last_proof: &str,
    ) -> Result<RegistrationReport, NodeError> {
        Ok(self.sdk.register(asset_id, buy_order, last_proof).await?)
    }

    /// Publish, then register. Not atomic: a registration failure is logged
    /// and returned in the outcome, the broadcast stands.
    pub async fn settle_and_register(
        &self,
        asset_id: &str,
        buy_order: &str,
        last_proof: &str,
    ) -> Result<SettlementOutcome, NodeError> {
        let txid = self.publish(buy_order).await?;
        let registration = self.register(asset_id, buy_order, last_proof).await;
        match &registration {
            Ok(report) => {
                for warning in &report.warnings {
                    log::warn!("settle {txid}: {warning}");
                }
            }
            Err(e) => log::warn!("settle {txid}: registration failed: {e}"),
        }
        Ok(SettlementOutcome { txid, registration })
    }

    /// [`settle_and_register`](Self::settle_and_register) with the last proof
    /// fetched from a remote proof server.
    pub async fn settle_with_proof_source<P: ProofSource>(
        &self,
        source: &P,
        asset_id: &str,
        buy_order: &str,
    ) -> Result<SettlementOutcome, NodeError> {
        let txid = self.publish(buy_order).await?;
        let registration = self
            .sdk
            .fetch_and_register(source, asset_id, buy_order)
            .await
            .map_err(NodeError::from);
        if let Err(e) = &registration {
            log::warn!("settle {txid}: registration failed: {e}");
        }
        Ok(SettlementOutcome { txid, registration })
    }
}
