// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use anyhow::Context;
use faucet_config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Connects to Postgres and brings the schema up to date.
pub async fn connect(config: DatabaseConfig) -> anyhow::Result<PgPool> {
    let url = config
        .get_formated_postgres_url()
        .map_err(|e| anyhow::anyhow!(e))?;
    tracing::debug!(
        postgres_host = tracing::field::debug(&url.host()),
        postgres_port = tracing::field::debug(&url.port()),
        postgres_database = tracing::field::debug(&url.path()),
        "Connecting to database"
    );
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(url.as_str())
        .await
        .context("Could not connect to the database")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}
