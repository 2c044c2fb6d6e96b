// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! The two long running loops. Each one is sequential inside and stops at
//! the next await point once the token is cancelled.

use std::{future::Future, time::Duration};

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{confirm::ConfirmationMonitor, disburse::Disburser, syncer::ChainSyncer};

#[derive(Debug, Clone, Copy)]
pub struct FaucetTiming {
    pub send_interval: Duration,
    /// Pause between the send pass and the check pass.
    pub check_delay: Duration,
    pub pass_timeout: Duration,
}

/// Runs `fut` unless the token is cancelled first. `None` means cancelled.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

pub async fn run_sync_loop(
    mut syncer: ChainSyncer,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if until_cancelled(&cancel, ticker.tick()).await.is_none() {
            break;
        }
        match until_cancelled(&cancel, syncer.synchronize()).await {
            None => break,
            Some(Ok(height)) => tracing::trace!(?height, "Deposit sync up to date"),
            Some(Err(e)) => tracing::error!(error = ?e, "Deposit sync failed, retrying next tick"),
        }
    }
    tracing::info!("Deposit sync stopped");
}

pub async fn run_faucet_loop(
    mut disburser: Disburser,
    monitor: ConfirmationMonitor,
    timing: FaucetTiming,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(timing.send_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if until_cancelled(&cancel, ticker.tick()).await.is_none() {
            break;
        }

        let send = time::timeout(timing.pass_timeout, disburser.send_drips());
        match until_cancelled(&cancel, send).await {
            None => break,
            Some(Ok(Ok(_))) => {}
            Some(Ok(Err(e))) => tracing::error!(error = ?e, "Send pass failed"),
            Some(Err(_)) => tracing::error!(timeout = ?timing.pass_timeout, "Send pass timed out"),
        }

        if until_cancelled(&cancel, time::sleep(timing.check_delay))
            .await
            .is_none()
        {
            break;
        }

        let check = time::timeout(timing.pass_timeout, monitor.check_drips());
        match until_cancelled(&cancel, check).await {
            None => break,
            Some(Ok(Ok(_))) => {}
            Some(Ok(Err(e))) => tracing::error!(error = ?e, "Check pass failed"),
            Some(Err(_)) => tracing::error!(timeout = ?timing.pass_timeout, "Check pass timed out"),
        }
    }
    tracing::info!("Faucet stopped");
}
