// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use alloy::primitives::Address;

use crate::{chain::ChainClient, ledger::DepositLedger};

/// Next nonce of the funding account.
///
/// The ledger holds the durable copy and moves it together with each stored
/// drip. The in-memory value follows only after that commit succeeded.
#[derive(Debug)]
pub struct NonceSequence {
    account: Address,
    next: u64,
}

impl NonceSequence {
    /// Seeds the sequence from the larger of the persisted nonce and the
    /// chain's pending transaction count.
    pub async fn reconcile(
        account: Address,
        chain: &dyn ChainClient,
        ledger: &dyn DepositLedger,
    ) -> anyhow::Result<Self> {
        let on_chain = chain.transaction_count(account).await?;
        let next = ledger.reconcile_nonce(account, on_chain).await?;
        if next != on_chain {
            tracing::warn!(
                %account,
                on_chain,
                persisted = next,
                "Chain has not seen every persisted drip yet, continuing from the ledger"
            );
        }
        tracing::info!(%account, nonce = next, "Nonce sequence ready");
        Ok(Self { account, next })
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn current(&self) -> u64 {
        self.next
    }

    /// Follows a drip the ledger stored with [`Self::current`].
    pub fn advance(&mut self) {
        self.next += 1;
    }
}
