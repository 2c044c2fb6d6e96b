// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, time::Duration};

use alloy::primitives::Address;
use anyhow::anyhow;
use faucet_config::MIN_SYNC_RANGE;
use sqlx::types::chrono::{DateTime, Utc};

use crate::{
    chain::{ChainClient, DepositEvent},
    ledger::{Checkpoint, DepositLedger, DepositStatus, NewDeposit},
};

/// How the syncer walks the chain and classifies what it finds.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Checkpoint row this syncer owns.
    pub cursor: String,
    /// First height to scan when no checkpoint exists.
    pub start_height: u64,
    /// Blocks per sub-range. Values below [`MIN_SYNC_RANGE`] are raised.
    pub range: u64,
    pub range_timeout: Duration,
    pub drip_height: u64,
    pub wrapped_native_token: Address,
}

/// Copies bridge deposit events into the ledger, sub-range by sub-range.
pub struct ChainSyncer {
    chain: Arc<dyn ChainClient>,
    ledger: Arc<dyn DepositLedger>,
    settings: SyncSettings,
    checkpoint: Option<Checkpoint>,
}

impl ChainSyncer {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        ledger: Arc<dyn DepositLedger>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            chain,
            ledger,
            settings,
            checkpoint: None,
        }
    }

    /// Loads the stored checkpoint. Must run before [`Self::synchronize`].
    pub async fn prepare(&mut self) -> anyhow::Result<()> {
        self.checkpoint = self.ledger.checkpoint(&self.settings.cursor).await?;
        match self.checkpoint {
            Some(checkpoint) => tracing::info!(
                cursor = %self.settings.cursor,
                height = checkpoint.height,
                block_hash = %checkpoint.block_hash,
                "Resuming deposit sync"
            ),
            None => tracing::info!(
                cursor = %self.settings.cursor,
                start_height = self.settings.start_height,
                "No checkpoint found, starting deposit sync from the configured height"
            ),
        }
        Ok(())
    }

    /// Height of the last durably recorded block, if any.
    pub fn height(&self) -> Option<u64> {
        self.checkpoint.map(|checkpoint| checkpoint.height)
    }

    fn next_height(&self) -> u64 {
        self.height()
            .map_or(self.settings.start_height, |height| height + 1)
    }

    fn range(&self) -> u64 {
        self.settings.range.max(MIN_SYNC_RANGE)
    }

    /// Catches up with the chain tip and returns the new checkpoint height.
    ///
    /// Sub-ranges committed before an error stay committed; the next call
    /// resumes after them.
    pub async fn synchronize(&mut self) -> anyhow::Result<Option<u64>> {
        let tip = self.chain.block_number().await?;
        let mut from = self.next_height();

        while from <= tip {
            let to = from.saturating_add(self.range() - 1).min(tip);
            let checkpoint = tokio::time::timeout(
                self.settings.range_timeout,
                self.sync_range(from, to),
            )
            .await
            .map_err(|_| anyhow!("Syncing blocks {from} to {to} timed out"))??;
            self.checkpoint = Some(checkpoint);
            from = to + 1;
        }

        Ok(self.height())
    }

    async fn sync_range(&self, from: u64, to: u64) -> anyhow::Result<Checkpoint> {
        let header = self.chain.header(to).await?;
        let events = self.chain.deposit_events(from, to).await?;
        let deposits: Vec<NewDeposit> = events
            .into_iter()
            .map(|event| NewDeposit {
                status: self.classify(&event),
                event,
            })
            .collect();

        let checkpoint = Checkpoint {
            height: to,
            block_hash: header.hash,
        };
        let stored = self
            .ledger
            .save_synced(&self.settings.cursor, &deposits, checkpoint)
            .await?;

        let block_time = i64::try_from(header.timestamp)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        if stored {
            tracing::info!(
                from,
                to,
                deposits = deposits.len(),
                block_time = ?block_time,
                "Synced deposits"
            );
        } else {
            tracing::debug!(from, to, "Blocks were already synced");
        }
        Ok(checkpoint)
    }

    fn classify(&self, event: &DepositEvent) -> DepositStatus {
        if event.height < self.settings.drip_height
            || event.l2_token == self.settings.wrapped_native_token
        {
            DepositStatus::Ignore
        } else {
            DepositStatus::Unprocessed
        }
    }
}
