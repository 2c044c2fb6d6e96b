// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashSet, str::FromStr, sync::Arc};

use alloy::primitives::{Address, U256};
use anyhow::Context;
use bigdecimal::{num_bigint::BigInt, BigDecimal};
use faucet_oracle::PriceOracle;
use thiserror::Error;

use crate::{
    chain::ChainClient,
    ledger::{Deposit, DepositLedger},
};

/// Recipients already dripped during the current send pass.
///
/// Lives for one pass only; the ledger covers earlier passes.
#[derive(Debug, Default)]
pub struct CycleDedup(HashSet<Address>);

impl CycleDedup {
    pub fn contains(&self, address: &Address) -> bool {
        self.0.contains(address)
    }

    pub fn insert(&mut self, address: Address) {
        self.0.insert(address);
    }
}

/// Why a deposit's recipient gets no drip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IneligibleReason {
    #[error("recipient was already dripped in this pass")]
    DrippedThisCycle,
    #[error("deposit height {height} is below the drip height {drip_height}")]
    BelowDripHeight { height: u64, drip_height: u64 },
    #[error("deposit is worth {value} USD, below the minimum of {min} USD")]
    BelowMinimumValue { value: BigDecimal, min: BigDecimal },
    #[error("recipient received a drip before")]
    DrippedBefore,
    #[error("recipient already holds {balance} wei")]
    HasBalance { balance: U256 },
    #[error("recipient is a contract")]
    NotAnEoa,
    #[error("recipient already sent {nonce} transactions")]
    HasTransactions { nonce: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    Ineligible(IneligibleReason),
}

/// Thresholds a deposit has to clear.
#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    pub drip_height: u64,
    pub min_usd: BigDecimal,
    /// L2 addresses of tokens worth one USD per whole token.
    pub stablecoins: HashSet<Address>,
}

pub struct Evaluator {
    chain: Arc<dyn ChainClient>,
    ledger: Arc<dyn DepositLedger>,
    oracle: Arc<dyn PriceOracle>,
    policy: EligibilityPolicy,
}

/// `amount / 10^decimals` without losing precision.
fn human_amount(amount: U256, decimals: u8) -> anyhow::Result<BigDecimal> {
    let units = BigInt::from_str(&amount.to_string()).context("Invalid token amount")?;
    Ok(BigDecimal::new(units, decimals.into()))
}

impl Evaluator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        ledger: Arc<dyn DepositLedger>,
        oracle: Arc<dyn PriceOracle>,
        policy: EligibilityPolicy,
    ) -> Self {
        Self {
            chain,
            ledger,
            oracle,
            policy,
        }
    }

    /// USD value of a deposit.
    pub async fn usd_value(&self, deposit: &Deposit) -> anyhow::Result<BigDecimal> {
        let event = &deposit.event;
        let decimals = self
            .chain
            .token_decimals(event.l2_token)
            .await
            .with_context(|| format!("Failed to read decimals of {}", event.l2_token))?;
        let amount = human_amount(event.amount, decimals)?;

        if self.policy.stablecoins.contains(&event.l2_token) {
            return Ok(amount);
        }

        let price = self
            .oracle
            .price(event.l1_token)
            .await
            .with_context(|| format!("Failed to price {}", event.l1_token))?;
        Ok(amount * price)
    }

    /// Runs the checks in order and stops at the first one that fails.
    ///
    /// Oracle and chain failures are errors, so a flaky dependency never turns
    /// into a permanent decline.
    pub async fn evaluate(
        &self,
        deposit: &Deposit,
        dedup: &CycleDedup,
    ) -> anyhow::Result<Verdict> {
        use IneligibleReason::*;

        let event = &deposit.event;
        let to = event.to;

        if dedup.contains(&to) {
            return Ok(Verdict::Ineligible(DrippedThisCycle));
        }

        if event.height < self.policy.drip_height {
            return Ok(Verdict::Ineligible(BelowDripHeight {
                height: event.height,
                drip_height: self.policy.drip_height,
            }));
        }

        let value = self.usd_value(deposit).await?;
        tracing::debug!(deposit_id = deposit.id, %to, usd = %value, "Deposit valued");
        if value < self.policy.min_usd {
            return Ok(Verdict::Ineligible(BelowMinimumValue {
                value,
                min: self.policy.min_usd.clone(),
            }));
        }

        if self.ledger.has_received_drip(to).await? {
            return Ok(Verdict::Ineligible(DrippedBefore));
        }

        let balance = self.chain.balance(to).await?;
        if !balance.is_zero() {
            return Ok(Verdict::Ineligible(HasBalance { balance }));
        }

        if !self.chain.code(to).await?.is_empty() {
            return Ok(Verdict::Ineligible(NotAnEoa));
        }

        let nonce = self.chain.transaction_count(to).await?;
        if nonce != 0 {
            return Ok(Verdict::Ineligible(HasTransactions { nonce }));
        }

        Ok(Verdict::Eligible)
    }
}
