// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! Durable state shared by the sync and faucet loops.

mod postgres;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

pub use self::postgres::PgLedger;
use crate::chain::DepositEvent;

/// Highest block whose deposit events are durably recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub height: u64,
    pub block_hash: B256,
}

/// Lifecycle of a recorded deposit.
///
/// `Ignore` is only assigned when the deposit is recorded. Afterwards a
/// deposit moves `Unprocessed -> Sent -> Done` or `Unprocessed -> Done` and
/// never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "deposit_status", rename_all = "lowercase")]
pub enum DepositStatus {
    Unprocessed,
    Ignore,
    /// A drip was signed and persisted but is not confirmed yet.
    Sent,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub id: i64,
    pub status: DepositStatus,
    pub event: DepositEvent,
}

/// A deposit as classified by the syncer, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeposit {
    pub status: DepositStatus,
    pub event: DepositEvent,
}

/// A signed transfer from the funding account to a deposit's recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drip {
    pub deposit_id: i64,
    pub tx_hash: B256,
    pub from: Address,
    pub to: Address,
    /// Wei.
    pub amount: U256,
    pub nonce: u64,
    /// EIP-2718 encoding of the signed transaction, resent verbatim.
    pub raw_tx: Bytes,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Deposit {deposit_id} is not in the expected state for this transition")]
    StatusConflict { deposit_id: i64 },
    #[error(transparent)]
    NonceConflict(#[from] NonceConflict),
    #[error("Invalid `{field}` value `{value}` in the ledger")]
    InvalidValue { field: &'static str, value: String },
}

/// Lost compare-and-swap on the persisted nonce: someone else moved it.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Nonce of {account} is no longer {expected}")]
pub struct NonceConflict {
    pub account: Address,
    pub expected: u64,
}

#[async_trait]
pub trait DepositLedger: Send + Sync {
    async fn checkpoint(&self, cursor: &str) -> Result<Option<Checkpoint>, LedgerError>;

    /// Stores the deposits of one sub-range and moves the checkpoint in a
    /// single transaction.
    ///
    /// Returns `false` without writing anything when the stored checkpoint is
    /// already at or past `checkpoint.height`. Deposits already recorded under
    /// the same `(tx_hash, log_index)` are skipped.
    async fn save_synced(
        &self,
        cursor: &str,
        deposits: &[NewDeposit],
        checkpoint: Checkpoint,
    ) -> Result<bool, LedgerError>;

    /// `Unprocessed` deposits in id order.
    async fn unprocessed_deposits(&self) -> Result<Vec<Deposit>, LedgerError>;

    async fn has_received_drip(&self, to: Address) -> Result<bool, LedgerError>;

    /// Settles an `Unprocessed` deposit.
    ///
    /// Without a drip the deposit becomes `Done`. With one, a single
    /// transaction stores the drip, marks the deposit `Sent` and moves the
    /// next nonce of `drip.from` from `drip.nonce` to `drip.nonce + 1`. A
    /// [`NonceConflict`] leaves nothing written.
    async fn record_outcome(&self, deposit_id: i64, drip: Option<&Drip>)
        -> Result<(), LedgerError>;

    /// Drips whose deposit is still `Sent`, in deposit id order.
    async fn pending_drips(&self) -> Result<Vec<Drip>, LedgerError>;

    /// `Sent -> Done` once a receipt was seen.
    async fn confirm_drip(&self, deposit_id: i64) -> Result<(), LedgerError>;

    /// Stores `max(stored, on_chain)` as the next nonce of `account` and
    /// returns it.
    async fn reconcile_nonce(&self, account: Address, on_chain: u64)
        -> Result<u64, LedgerError>;
}
