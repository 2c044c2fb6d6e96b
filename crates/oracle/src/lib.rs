// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! USD price sources for bridged tokens.

mod client;
mod uniswap;

use alloy::primitives::Address;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use thiserror::Error;

pub use crate::{
    client::{ResponseResult, SubgraphClient},
    uniswap::UniswapOracle,
};

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Price source could not be reached: {0}")]
    Transport(anyhow::Error),
    #[error("Price source returned an error: {0}")]
    Subgraph(anyhow::Error),
    #[error("No ETH price returned by the price source")]
    NoEthPrice,
    #[error("No price known for token {token}")]
    UnknownToken { token: Address },
    #[error("Could not parse `{field}` value `{value}`: {error}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        error: String,
    },
}

/// Converts an L1 token address into its USD value per whole token.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price(&self, token: Address) -> Result<BigDecimal, OracleError>;
}
