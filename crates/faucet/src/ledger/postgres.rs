// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use alloy::{
    hex::ToHexExt,
    primitives::{Address, Bytes, B256, U256},
};
use async_trait::async_trait;
use bigdecimal::num_bigint::BigInt;
use sqlx::{types::BigDecimal, PgPool};

use super::{
    Checkpoint, Deposit, DepositLedger, DepositStatus, Drip, LedgerError, NewDeposit,
    NonceConflict,
};
use crate::chain::DepositEvent;

/// [`DepositLedger`] backed by the tables in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pgpool: PgPool,
}

impl PgLedger {
    pub fn new(pgpool: PgPool) -> Self {
        Self { pgpool }
    }
}

fn to_i64(value: u64, field: &'static str) -> Result<i64, LedgerError> {
    i64::try_from(value).map_err(|_| LedgerError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn to_u64(value: i64, field: &'static str) -> Result<u64, LedgerError> {
    u64::try_from(value).map_err(|_| LedgerError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn to_numeric(value: U256) -> BigDecimal {
    // U256's Display is plain base 10, always a valid BigInt.
    BigDecimal::from(BigInt::from_str(&value.to_string()).unwrap_or_default())
}

fn from_numeric(value: &BigDecimal, field: &'static str) -> Result<U256, LedgerError> {
    let invalid = || LedgerError::InvalidValue {
        field,
        value: value.to_string(),
    };
    if !value.is_integer() {
        return Err(invalid());
    }
    let integer = value.with_scale(0).into_bigint_and_exponent().0;
    U256::from_str(&integer.to_string()).map_err(|_| invalid())
}

fn parse_address(value: &str, field: &'static str) -> Result<Address, LedgerError> {
    Address::from_str(value).map_err(|_| LedgerError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn parse_hash(value: &str, field: &'static str) -> Result<B256, LedgerError> {
    B256::from_str(value).map_err(|_| LedgerError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

#[derive(sqlx::FromRow)]
struct DepositRow {
    id: i64,
    height: i64,
    tx_hash: String,
    log_index: i64,
    l1_token: String,
    l2_token: String,
    from_address: String,
    to_address: String,
    amount: BigDecimal,
    status: DepositStatus,
}

impl TryFrom<DepositRow> for Deposit {
    type Error = LedgerError;

    fn try_from(row: DepositRow) -> Result<Self, Self::Error> {
        Ok(Deposit {
            id: row.id,
            status: row.status,
            event: DepositEvent {
                height: to_u64(row.height, "height")?,
                tx_hash: parse_hash(&row.tx_hash, "tx_hash")?,
                log_index: to_u64(row.log_index, "log_index")?,
                l1_token: parse_address(&row.l1_token, "l1_token")?,
                l2_token: parse_address(&row.l2_token, "l2_token")?,
                from: parse_address(&row.from_address, "from_address")?,
                to: parse_address(&row.to_address, "to_address")?,
                amount: from_numeric(&row.amount, "amount")?,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct DripRow {
    deposit_id: i64,
    tx_hash: String,
    from_address: String,
    to_address: String,
    amount: BigDecimal,
    nonce: i64,
    raw_tx: Vec<u8>,
}

impl TryFrom<DripRow> for Drip {
    type Error = LedgerError;

    fn try_from(row: DripRow) -> Result<Self, Self::Error> {
        Ok(Drip {
            deposit_id: row.deposit_id,
            tx_hash: parse_hash(&row.tx_hash, "tx_hash")?,
            from: parse_address(&row.from_address, "from_address")?,
            to: parse_address(&row.to_address, "to_address")?,
            amount: from_numeric(&row.amount, "amount")?,
            nonce: to_u64(row.nonce, "nonce")?,
            raw_tx: Bytes::from(row.raw_tx),
        })
    }
}

#[async_trait]
impl DepositLedger for PgLedger {
    async fn checkpoint(&self, cursor: &str) -> Result<Option<Checkpoint>, LedgerError> {
        let row: Option<(i64, String)> = sqlx::query_as(
            r#"
                SELECT height, block_hash
                FROM sync_checkpoints
                WHERE cursor_name = $1
            "#,
        )
        .bind(cursor)
        .fetch_optional(&self.pgpool)
        .await?;

        row.map(|(height, block_hash)| {
            Ok(Checkpoint {
                height: to_u64(height, "height")?,
                block_hash: parse_hash(&block_hash, "block_hash")?,
            })
        })
        .transpose()
    }

    async fn save_synced(
        &self,
        cursor: &str,
        deposits: &[NewDeposit],
        checkpoint: Checkpoint,
    ) -> Result<bool, LedgerError> {
        let height = to_i64(checkpoint.height, "height")?;
        let mut tx = self.pgpool.begin().await?;

        let stored: Option<i64> = sqlx::query_scalar(
            r#"
                SELECT height
                FROM sync_checkpoints
                WHERE cursor_name = $1
                FOR UPDATE
            "#,
        )
        .bind(cursor)
        .fetch_optional(&mut *tx)
        .await?;

        if stored.is_some_and(|stored| stored >= height) {
            tx.rollback().await?;
            return Ok(false);
        }

        for deposit in deposits {
            let event = &deposit.event;
            sqlx::query(
                r#"
                    INSERT INTO bridge_deposits (
                        height,
                        tx_hash,
                        log_index,
                        l1_token,
                        l2_token,
                        from_address,
                        to_address,
                        amount,
                        status
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    ON CONFLICT (tx_hash, log_index) DO NOTHING
                "#,
            )
            .bind(to_i64(event.height, "height")?)
            .bind(event.tx_hash.encode_hex())
            .bind(to_i64(event.log_index, "log_index")?)
            .bind(event.l1_token.encode_hex())
            .bind(event.l2_token.encode_hex())
            .bind(event.from.encode_hex())
            .bind(event.to.encode_hex())
            .bind(to_numeric(event.amount))
            .bind(deposit.status)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
                INSERT INTO sync_checkpoints (cursor_name, height, block_hash)
                VALUES ($1, $2, $3)
                ON CONFLICT (cursor_name)
                DO UPDATE SET
                    height = EXCLUDED.height,
                    block_hash = EXCLUDED.block_hash,
                    updated_at = NOW()
            "#,
        )
        .bind(cursor)
        .bind(height)
        .bind(checkpoint.block_hash.encode_hex())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn unprocessed_deposits(&self) -> Result<Vec<Deposit>, LedgerError> {
        let rows: Vec<DepositRow> = sqlx::query_as(
            r#"
                SELECT
                    id,
                    height,
                    tx_hash,
                    log_index,
                    l1_token,
                    l2_token,
                    from_address,
                    to_address,
                    amount,
                    status
                FROM bridge_deposits
                WHERE status = 'unprocessed'
                ORDER BY id
            "#,
        )
        .fetch_all(&self.pgpool)
        .await?;

        rows.into_iter().map(Deposit::try_from).collect()
    }

    async fn has_received_drip(&self, to: Address) -> Result<bool, LedgerError> {
        let exists: bool = sqlx::query_scalar(
            r#"
                SELECT EXISTS (
                    SELECT 1
                    FROM faucet_drips
                    WHERE to_address = $1
                )
            "#,
        )
        .bind(to.encode_hex())
        .fetch_one(&self.pgpool)
        .await?;
        Ok(exists)
    }

    async fn record_outcome(
        &self,
        deposit_id: i64,
        drip: Option<&Drip>,
    ) -> Result<(), LedgerError> {
        let status = if drip.is_some() {
            DepositStatus::Sent
        } else {
            DepositStatus::Done
        };
        let mut tx = self.pgpool.begin().await?;

        let updated = sqlx::query(
            r#"
                UPDATE bridge_deposits
                SET status = $1, updated_at = NOW()
                WHERE id = $2 AND status = 'unprocessed'
            "#,
        )
        .bind(status)
        .bind(deposit_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated != 1 {
            return Err(LedgerError::StatusConflict { deposit_id });
        }

        if let Some(drip) = drip {
            let nonce = to_i64(drip.nonce, "nonce")?;
            let advanced = sqlx::query(
                r#"
                    UPDATE faucet_nonces
                    SET next_nonce = next_nonce + 1, updated_at = NOW()
                    WHERE account = $1 AND next_nonce = $2
                "#,
            )
            .bind(drip.from.encode_hex())
            .bind(nonce)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if advanced != 1 {
                return Err(NonceConflict {
                    account: drip.from,
                    expected: drip.nonce,
                }
                .into());
            }

            sqlx::query(
                r#"
                    INSERT INTO faucet_drips (
                        deposit_id,
                        tx_hash,
                        from_address,
                        to_address,
                        amount,
                        nonce,
                        raw_tx
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(deposit_id)
            .bind(drip.tx_hash.encode_hex())
            .bind(drip.from.encode_hex())
            .bind(drip.to.encode_hex())
            .bind(to_numeric(drip.amount))
            .bind(nonce)
            .bind(drip.raw_tx.to_vec())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn pending_drips(&self) -> Result<Vec<Drip>, LedgerError> {
        let rows: Vec<DripRow> = sqlx::query_as(
            r#"
                SELECT
                    d.deposit_id,
                    d.tx_hash,
                    d.from_address,
                    d.to_address,
                    d.amount,
                    d.nonce,
                    d.raw_tx
                FROM faucet_drips d
                JOIN bridge_deposits b ON b.id = d.deposit_id
                WHERE b.status = 'sent'
                ORDER BY d.deposit_id
            "#,
        )
        .fetch_all(&self.pgpool)
        .await?;

        rows.into_iter().map(Drip::try_from).collect()
    }

    async fn confirm_drip(&self, deposit_id: i64) -> Result<(), LedgerError> {
        let updated = sqlx::query(
            r#"
                UPDATE bridge_deposits
                SET status = 'done', updated_at = NOW()
                WHERE id = $1 AND status = 'sent'
            "#,
        )
        .bind(deposit_id)
        .execute(&self.pgpool)
        .await?
        .rows_affected();

        if updated != 1 {
            return Err(LedgerError::StatusConflict { deposit_id });
        }
        Ok(())
    }

    async fn reconcile_nonce(
        &self,
        account: Address,
        on_chain: u64,
    ) -> Result<u64, LedgerError> {
        let next: i64 = sqlx::query_scalar(
            r#"
                INSERT INTO faucet_nonces (account, next_nonce)
                VALUES ($1, $2)
                ON CONFLICT (account)
                DO UPDATE SET
                    next_nonce = GREATEST(faucet_nonces.next_nonce, EXCLUDED.next_nonce),
                    updated_at = NOW()
                RETURNING next_nonce
            "#,
        )
        .bind(account.encode_hex())
        .bind(to_i64(on_chain, "next_nonce")?)
        .fetch_one(&self.pgpool)
        .await?;
        to_u64(next, "next_nonce")
    }
}
