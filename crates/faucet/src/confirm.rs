// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail};

use crate::{
    chain::ChainClient,
    ledger::{DepositLedger, Drip},
    transaction::decode_raw,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckSummary {
    pub confirmed: usize,
    pub resent: usize,
    /// Drips left for the next pass after an error.
    pub failed: usize,
}

/// Settles `Sent` drips once they are mined and resends the ones the
/// network does not know about.
pub struct ConfirmationMonitor {
    chain: Arc<dyn ChainClient>,
    ledger: Arc<dyn DepositLedger>,
    receipt_timeout: Duration,
}

impl ConfirmationMonitor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        ledger: Arc<dyn DepositLedger>,
        receipt_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            ledger,
            receipt_timeout,
        }
    }

    /// One pass over the `Sent` drips. A failing drip is logged and skipped
    /// so it cannot hold back the others.
    pub async fn check_drips(&self) -> anyhow::Result<CheckSummary> {
        let pending = self.ledger.pending_drips().await?;
        let mut summary = CheckSummary::default();

        for drip in &pending {
            match self.reconcile(drip).await {
                Ok(true) => summary.confirmed += 1,
                Ok(false) => summary.resent += 1,
                Err(e) => {
                    tracing::error!(
                        deposit_id = drip.deposit_id,
                        tx_hash = %drip.tx_hash,
                        error = ?e,
                        "Failed to check drip"
                    );
                    summary.failed += 1;
                }
            }
        }

        if !pending.is_empty() {
            tracing::info!(
                confirmed = summary.confirmed,
                resent = summary.resent,
                failed = summary.failed,
                "Check pass finished"
            );
        }
        Ok(summary)
    }

    /// Returns `true` once the drip is mined and its deposit is `Done`.
    ///
    /// Any receipt settles the drip, successful or not, so a reverted
    /// transfer is never signed again.
    pub async fn reconcile(&self, drip: &Drip) -> anyhow::Result<bool> {
        let receipt = tokio::time::timeout(
            self.receipt_timeout,
            self.chain.transaction_receipt(drip.tx_hash),
        )
        .await
        .map_err(|_| anyhow!("Receipt lookup for {} timed out", drip.tx_hash))??;

        if let Some(receipt) = receipt {
            self.ledger.confirm_drip(drip.deposit_id).await?;
            if receipt.success {
                tracing::info!(
                    deposit_id = drip.deposit_id,
                    tx_hash = %drip.tx_hash,
                    block = ?receipt.block_number,
                    "Drip confirmed"
                );
            } else {
                tracing::warn!(
                    deposit_id = drip.deposit_id,
                    tx_hash = %drip.tx_hash,
                    block = ?receipt.block_number,
                    "Drip was mined but reverted"
                );
            }
            return Ok(true);
        }

        let hash = decode_raw(&drip.raw_tx)?;
        if hash != drip.tx_hash {
            bail!(
                "Stored transaction for deposit {} hashes to {hash}, expected {}",
                drip.deposit_id,
                drip.tx_hash
            );
        }

        // "already known" and "nonce too low" are expected here.
        if let Err(e) = self.chain.send_raw_transaction(&drip.raw_tx).await {
            tracing::debug!(tx_hash = %drip.tx_hash, error = %e, "Rebroadcast rejected");
        } else {
            tracing::debug!(tx_hash = %drip.tx_hash, nonce = drip.nonce, "Drip rebroadcast");
        }
        Ok(false)
    }
}
