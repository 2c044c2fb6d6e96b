// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashSet, sync::Arc, time::Duration};

use alloy::primitives::{address, Address, U256};
use bigdecimal::BigDecimal;
use bridge_faucet::{
    confirm::{CheckSummary, ConfirmationMonitor},
    disburse::Disburser,
    eligibility::{EligibilityPolicy, Evaluator},
    ledger::DepositStatus,
    nonce::NonceSequence,
    syncer::{ChainSyncer, SyncSettings},
    test::{
        deposit_event, funding_signer, MemoryLedger, MockChain, StaticOracle, TEST_CHAIN_ID,
        TEST_L1_TOKEN,
    },
    transaction::decode_raw,
};

const ALICE: Address = address!("a11ce00000000000000000000000000000000000");
const BOB: Address = address!("b0b0000000000000000000000000000000000000");
const CAROL: Address = address!("ca20100000000000000000000000000000000000");
const DRIP_WEI: u64 = 10_000_000_000_000_000;

struct Faucet {
    chain: Arc<MockChain>,
    ledger: Arc<MemoryLedger>,
    oracle: Arc<StaticOracle>,
}

impl Faucet {
    fn new() -> Self {
        let oracle = Arc::new(StaticOracle::default());
        oracle.set_price(TEST_L1_TOKEN, "1");
        Self {
            chain: Arc::new(MockChain::default()),
            ledger: Arc::new(MemoryLedger::default()),
            oracle,
        }
    }

    /// Bridges `whole` tokens worth one USD each to `to` at `height`.
    fn bridge(&self, height: u64, log_index: u64, to: Address, whole: u64) {
        let mut event = deposit_event(height, log_index, to);
        event.amount = U256::from(whole) * U256::from(10).pow(U256::from(18));
        self.chain.add_event(event);
    }

    async fn syncer(&self) -> ChainSyncer {
        let mut syncer = ChainSyncer::new(
            self.chain.clone(),
            self.ledger.clone(),
            SyncSettings {
                cursor: "bridge_deposits".to_string(),
                start_height: 100,
                range: 20,
                range_timeout: Duration::from_secs(5),
                drip_height: 100,
                wrapped_native_token: address!("deaddeaddeaddeaddeaddeaddeaddeaddead0000"),
            },
        );
        syncer.prepare().await.unwrap();
        syncer
    }

    /// A freshly started engine, as after a process restart.
    async fn disburser(&self) -> Disburser {
        let signer = funding_signer();
        let nonce = NonceSequence::reconcile(
            signer.address(),
            self.chain.as_ref(),
            self.ledger.as_ref(),
        )
        .await
        .unwrap();
        let evaluator = Evaluator::new(
            self.chain.clone(),
            self.ledger.clone(),
            self.oracle.clone(),
            EligibilityPolicy {
                drip_height: 100,
                min_usd: BigDecimal::from(500),
                stablecoins: HashSet::new(),
            },
        );
        Disburser::builder()
            .chain(self.chain.clone())
            .ledger(self.ledger.clone())
            .evaluator(evaluator)
            .signer(signer)
            .chain_id(TEST_CHAIN_ID)
            .drip_amount(U256::from(DRIP_WEI))
            .nonce(nonce)
            .build()
            .unwrap()
    }

    fn monitor(&self) -> ConfirmationMonitor {
        ConfirmationMonitor::new(
            self.chain.clone(),
            self.ledger.clone(),
            Duration::from_secs(1),
        )
    }

    fn status_of(&self, to: Address) -> Vec<DepositStatus> {
        self.ledger
            .deposits()
            .into_iter()
            .filter(|d| d.event.to == to)
            .map(|d| d.status)
            .collect()
    }
}

#[test_log::test(tokio::test)]
async fn test_deposits_flow_from_chain_to_confirmed_drips() {
    let faucet = Faucet::new();
    faucet.chain.set_tip(179);
    faucet.bridge(110, 0, ALICE, 600);
    faucet.bridge(130, 0, BOB, 400);
    faucet.bridge(150, 0, CAROL, 5_000);
    faucet.bridge(170, 1, ALICE, 900);

    let mut syncer = faucet.syncer().await;
    assert_eq!(syncer.synchronize().await.unwrap(), Some(179));
    assert_eq!(faucet.ledger.deposits().len(), 4);

    let mut disburser = faucet.disburser().await;
    let summary = disburser.send_drips().await.unwrap();
    assert_eq!(summary.considered, 4);
    assert_eq!(summary.dripped, 2);

    // ALICE gets one drip for two deposits, BOB is below the minimum value
    assert_eq!(
        faucet.status_of(ALICE),
        vec![DepositStatus::Sent, DepositStatus::Done]
    );
    assert_eq!(faucet.status_of(BOB), vec![DepositStatus::Done]);
    assert_eq!(faucet.status_of(CAROL), vec![DepositStatus::Sent]);

    let drips = faucet.ledger.drips();
    assert_eq!(drips.iter().map(|d| d.nonce).collect::<Vec<_>>(), vec![0, 1]);
    for drip in &drips {
        assert_eq!(drip.amount, U256::from(DRIP_WEI));
        assert_eq!(decode_raw(&drip.raw_tx).unwrap(), drip.tx_hash);
    }

    // only ALICE's drip is mined by the time of the check pass
    faucet.chain.add_receipt(drips[0].tx_hash, true);
    let monitor = faucet.monitor();
    assert_eq!(
        monitor.check_drips().await.unwrap(),
        CheckSummary {
            confirmed: 1,
            resent: 1,
            failed: 0
        }
    );
    assert_eq!(faucet.status_of(CAROL), vec![DepositStatus::Sent]);
    assert_eq!(
        faucet.chain.broadcasts().last(),
        Some(&drips[1].raw_tx),
        "the unconfirmed drip is resent byte for byte"
    );

    faucet.chain.add_receipt(drips[1].tx_hash, true);
    monitor.check_drips().await.unwrap();
    assert_eq!(faucet.status_of(CAROL), vec![DepositStatus::Done]);
}

#[test_log::test(tokio::test)]
async fn test_restart_continues_the_nonce_sequence() {
    let faucet = Faucet::new();
    faucet.chain.set_tip(139);
    faucet.bridge(110, 0, ALICE, 600);
    faucet.syncer().await.synchronize().await.unwrap();

    // the first drip never reaches the chain
    faucet.chain.fail_broadcasts(true);
    faucet.disburser().await.send_drips().await.unwrap();
    faucet.chain.fail_broadcasts(false);

    faucet.chain.set_tip(159);
    faucet.bridge(150, 0, BOB, 800);
    faucet.syncer().await.synchronize().await.unwrap();

    // the chain still reports nonce 0, the ledger knows better
    faucet.disburser().await.send_drips().await.unwrap();

    let drips = faucet.ledger.drips();
    assert_eq!(drips.iter().map(|d| d.nonce).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(faucet.status_of(ALICE), vec![DepositStatus::Sent]);

    // the lost drip is recovered by the check pass
    faucet.monitor().check_drips().await.unwrap();
    assert!(faucet.chain.broadcasts().contains(&drips[0].raw_tx));
}

#[test_log::test(tokio::test)]
async fn test_synced_twice_dripped_once() {
    let faucet = Faucet::new();
    faucet.chain.set_tip(139);
    faucet.bridge(110, 0, ALICE, 600);

    faucet.syncer().await.synchronize().await.unwrap();
    // a second process replays the same blocks
    let mut replay = ChainSyncer::new(
        faucet.chain.clone(),
        faucet.ledger.clone(),
        SyncSettings {
            cursor: "bridge_deposits".to_string(),
            start_height: 100,
            range: 20,
            range_timeout: Duration::from_secs(5),
            drip_height: 100,
            wrapped_native_token: Address::ZERO,
        },
    );
    replay.synchronize().await.unwrap();

    faucet.disburser().await.send_drips().await.unwrap();
    faucet.disburser().await.send_drips().await.unwrap();

    assert_eq!(faucet.ledger.deposits().len(), 1);
    assert_eq!(faucet.ledger.drips().len(), 1);
}
