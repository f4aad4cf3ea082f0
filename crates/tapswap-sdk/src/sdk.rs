//! `SwapSdk`: one party's view of the swap protocol.
//!
//! Owns the collaborator handles, the network and the shared configuration.
//! The phase methods live next to their builders under [`crate::swap`].

use crate::config::SwapConfig;
use crate::network::Network;

pub struct SwapSdk<W, A, U> {
    pub(crate) wallet: W,
    pub(crate) assets: A,
    pub(crate) universe: U,
    pub(crate) network: Network,
    pub(crate) config: SwapConfig,
}

impl<W, A, U> SwapSdk<W, A, U> {
    pub fn new(wallet: W, assets: A, universe: U, network: Network) -> Self {
        Self {
            wallet,
            assets,
            universe,
            network,
            config: SwapConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SwapConfig) -> Self {
        self.config = config;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn assets(&self) -> &A {
        &self.assets
    }

    pub fn universe(&self) -> &U {
        &self.universe
    }
}
