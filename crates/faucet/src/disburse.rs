// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use alloy::{primitives::U256, signers::local::PrivateKeySigner};
use anyhow::Context;

use crate::{
    chain::ChainClient,
    eligibility::{CycleDedup, Evaluator, Verdict},
    ledger::{Deposit, DepositLedger, Drip, LedgerError},
    nonce::NonceSequence,
    transaction::{sign_transfer, Transfer},
};

/// Outcome of one send pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendSummary {
    pub considered: usize,
    pub dripped: usize,
}

/// Turns eligible deposits into signed, persisted and broadcast drips.
pub struct Disburser {
    chain: Arc<dyn ChainClient>,
    ledger: Arc<dyn DepositLedger>,
    evaluator: Evaluator,
    signer: PrivateKeySigner,
    chain_id: u64,
    drip_amount: U256,
    nonce: NonceSequence,
}

#[bon::bon]
impl Disburser {
    #[builder]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        ledger: Arc<dyn DepositLedger>,
        evaluator: Evaluator,
        signer: PrivateKeySigner,
        chain_id: u64,
        drip_amount: U256,
        nonce: NonceSequence,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            nonce.account() == signer.address(),
            "Nonce sequence of {} cannot sign for {}",
            nonce.account(),
            signer.address()
        );
        Ok(Self {
            chain,
            ledger,
            evaluator,
            signer,
            chain_id,
            drip_amount,
            nonce,
        })
    }

    /// One pass over the `Unprocessed` deposits, oldest first.
    ///
    /// The first error stops the pass. The failing deposit stays
    /// `Unprocessed` and is retried on the next pass.
    pub async fn send_drips(&mut self) -> anyhow::Result<SendSummary> {
        let deposits = self.ledger.unprocessed_deposits().await?;
        let mut dedup = CycleDedup::default();
        let mut summary = SendSummary::default();

        for deposit in &deposits {
            summary.considered += 1;
            if self.disburse(deposit, &mut dedup).await?.is_some() {
                summary.dripped += 1;
            }
        }

        if summary.considered > 0 {
            tracing::info!(
                considered = summary.considered,
                dripped = summary.dripped,
                "Send pass finished"
            );
        }
        Ok(summary)
    }

    /// Settles a single deposit, returning the drip when one was sent.
    pub async fn disburse(
        &mut self,
        deposit: &Deposit,
        dedup: &mut CycleDedup,
    ) -> anyhow::Result<Option<Drip>> {
        let to = deposit.event.to;

        if let Verdict::Ineligible(reason) = self.evaluator.evaluate(deposit, dedup).await? {
            tracing::debug!(deposit_id = deposit.id, %to, %reason, "No drip for deposit");
            self.ledger.record_outcome(deposit.id, None).await?;
            return Ok(None);
        }

        let from = self.signer.address();
        let gas_price = self.chain.gas_price().await?;
        let gas_limit = self
            .chain
            .estimate_transfer_gas(from, to, self.drip_amount)
            .await
            .context("Failed to estimate drip gas")?;
        let nonce = self.nonce.current();

        let signed = sign_transfer(
            &self.signer,
            Transfer {
                chain_id: self.chain_id,
                nonce,
                to,
                value: self.drip_amount,
                gas_price,
                gas_limit,
            },
        )?;

        let drip = Drip {
            deposit_id: deposit.id,
            tx_hash: signed.hash,
            from,
            to,
            amount: self.drip_amount,
            nonce,
            raw_tx: signed.raw,
        };

        // The drip and its nonce are durable before anything reaches the network.
        match self.ledger.record_outcome(deposit.id, Some(&drip)).await {
            Ok(()) => self.nonce.advance(),
            Err(LedgerError::NonceConflict(conflict)) => {
                tracing::warn!(
                    deposit_id = deposit.id,
                    error = %conflict,
                    "Persisted nonce moved, reloading the nonce sequence"
                );
                self.nonce =
                    NonceSequence::reconcile(from, self.chain.as_ref(), self.ledger.as_ref())
                        .await?;
                return Err(conflict.into());
            }
            Err(e) => return Err(e.into()),
        }
        dedup.insert(to);

        match self.chain.send_raw_transaction(&drip.raw_tx).await {
            Ok(_) => tracing::info!(
                deposit_id = deposit.id,
                %to,
                tx_hash = %drip.tx_hash,
                nonce,
                "Drip sent"
            ),
            Err(e) => tracing::warn!(
                deposit_id = deposit.id,
                %to,
                tx_hash = %drip.tx_hash,
                nonce,
                error = %e,
                "Drip broadcast failed, it will be resent by the confirmation pass"
            ),
        }

        Ok(Some(drip))
    }
}
