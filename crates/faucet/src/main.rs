// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use anyhow::{bail, Context};
use bridge_faucet::{
    chain::{ChainClient, RpcChainClient},
    cli,
    confirm::ConfirmationMonitor,
    database,
    disburse::Disburser,
    eligibility::{EligibilityPolicy, Evaluator},
    keys,
    ledger::{DepositLedger, PgLedger},
    nonce::NonceSequence,
    service::{self, FaucetTiming},
    syncer::{ChainSyncer, SyncSettings},
};
use faucet_config::{Config, ANDROMEDA_CHAIN_ID, STARDUST_CHAIN_ID};
use faucet_oracle::{SubgraphClient, UniswapOracle};
use tokio::{
    signal::unix::{signal, SignalKind},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

fn network_name(chain_id: u64) -> &'static str {
    match chain_id {
        ANDROMEDA_CHAIN_ID => "andromeda",
        STARDUST_CHAIN_ID => "stardust",
        _ => "custom",
    }
}

async fn start_faucet(
    config: &Config,
    chain: Arc<dyn ChainClient>,
    ledger: Arc<dyn DepositLedger>,
    chain_id: u64,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let Some(key_path) = config.faucet.key_path.as_ref() else {
        bail!("`faucet.key_path` is required when the faucet is enabled");
    };
    let signer = keys::load_signer(key_path)?;
    tracing::info!(funding_account = %signer.address(), "Loaded funding account");

    let http_client = reqwest::Client::builder()
        .timeout(config.oracle.timeout_secs)
        .build()
        .context("Failed to build the oracle HTTP client")?;
    let oracle = UniswapOracle::new(SubgraphClient::new(
        http_client,
        config.oracle.query_url.clone(),
        config.oracle.query_auth_token.clone(),
    ));

    let evaluator = Evaluator::new(
        chain.clone(),
        ledger.clone(),
        Arc::new(oracle),
        EligibilityPolicy {
            drip_height: config.faucet.drip_height,
            min_usd: config.faucet.min_usd.clone(),
            stablecoins: config.chain.stablecoins.clone(),
        },
    );
    let nonce = NonceSequence::reconcile(signer.address(), chain.as_ref(), ledger.as_ref())
        .await
        .context("Failed to reconcile the funding account nonce")?;
    let disburser = Disburser::builder()
        .chain(chain.clone())
        .ledger(ledger.clone())
        .evaluator(evaluator)
        .signer(signer)
        .chain_id(chain_id)
        .drip_amount(config.faucet.drip_amount.as_u256())
        .nonce(nonce)
        .build()?;
    let monitor = ConfirmationMonitor::new(chain, ledger, config.faucet.receipt_timeout_secs);

    tracing::info!(
        drip_amount = %config.faucet.drip_amount.ether(),
        min_usd = %config.faucet.min_usd,
        drip_height = config.faucet.drip_height,
        "Faucet enabled"
    );
    Ok(tokio::spawn(service::run_faucet_loop(
        disburser,
        monitor,
        FaucetTiming {
            send_interval: config.faucet.send_interval_secs,
            check_delay: config.faucet.check_delay_secs,
            pass_timeout: config.faucet.pass_timeout_secs,
        },
        cancel,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = cli::get_config()?;

    let chain: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(
        config.chain.rpc_url.clone(),
        config.chain.bridge_address,
        config.chain.rpc_timeout_secs,
    ));
    let chain_id = chain
        .chain_id()
        .await
        .context("Failed to read the chain id")?;
    if !config.chain.allowed_chain_ids.contains(&chain_id) {
        bail!(
            "Chain id {chain_id} is not one of the allowed chain ids {:?}",
            config.chain.allowed_chain_ids
        );
    }
    tracing::info!(chain_id, network = network_name(chain_id), "Connected to chain");

    let pgpool = database::connect(config.database.clone()).await?;
    let ledger: Arc<dyn DepositLedger> = Arc::new(PgLedger::new(pgpool));

    let mut syncer = ChainSyncer::new(
        chain.clone(),
        ledger.clone(),
        SyncSettings {
            cursor: config.sync.cursor.clone(),
            start_height: config.sync.start_height,
            range: config.sync.effective_range(),
            range_timeout: config.sync.range_timeout_secs,
            drip_height: config.faucet.drip_height,
            wrapped_native_token: config.chain.wrapped_native_token,
        },
    );
    syncer
        .prepare()
        .await
        .context("Failed to load the sync checkpoint")?;

    let cancel = CancellationToken::new();
    let mut tasks = vec![tokio::spawn(service::run_sync_loop(
        syncer,
        config.sync.interval_secs,
        cancel.clone(),
    ))];

    if config.faucet.enabled {
        tasks.push(start_faucet(&config, chain, ledger, chain_id, cancel.clone()).await?);
    } else {
        tracing::info!("Faucet disabled, only syncing deposits");
    }

    // Have tokio wait for SIGTERM or SIGINT.
    let mut signal_sigint = signal(SignalKind::interrupt())?;
    let mut signal_sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = signal_sigint.recv() => tracing::debug!("Received SIGINT."),
        _ = signal_sigterm.recv() => tracing::debug!("Received SIGTERM."),
    }
    tracing::info!("Shutting down...");

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Task panicked during shutdown");
        }
    }

    tracing::debug!("Goodbye!");
    Ok(())
}
