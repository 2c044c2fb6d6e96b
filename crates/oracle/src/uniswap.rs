// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use alloy::{hex::ToHexExt, primitives::Address};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use faucet_query::{token_price, TokenPrice};

use crate::{client::SubgraphClient, OracleError, PriceOracle};

/// Prices L1 tokens through the Uniswap v2 subgraph: `derivedETH * ethPrice`.
///
/// [`Address::ZERO`] stands for ether itself and is priced at `ethPrice`.
#[derive(Debug, Clone)]
pub struct UniswapOracle {
    client: SubgraphClient,
}

impl UniswapOracle {
    pub fn new(client: SubgraphClient) -> Self {
        Self { client }
    }
}

fn parse_decimal(value: &str, field: &'static str) -> Result<BigDecimal, OracleError> {
    BigDecimal::from_str(value).map_err(|e| OracleError::InvalidNumber {
        field,
        value: value.to_string(),
        error: e.to_string(),
    })
}

#[async_trait]
impl PriceOracle for UniswapOracle {
    async fn price(&self, token: Address) -> Result<BigDecimal, OracleError> {
        let response = self
            .client
            .query::<TokenPrice>(token_price::Variables {
                token_id: token.encode_hex_with_prefix(),
            })
            .await
            .map_err(OracleError::Transport)?
            .map_err(OracleError::Subgraph)?;

        tracing::trace!(%token, ?response, "Token price response");

        let eth_price = response
            .bundles
            .first()
            .ok_or(OracleError::NoEthPrice)
            .and_then(|bundle| parse_decimal(&bundle.eth_price, "ethPrice"))?;

        if token == Address::ZERO {
            return Ok(eth_price);
        }

        let derived_eth = response
            .tokens
            .first()
            .ok_or(OracleError::UnknownToken { token })
            .and_then(|t| parse_decimal(&t.derived_eth, "derivedETH"))?;

        Ok(derived_eth * eth_price)
    }
}
