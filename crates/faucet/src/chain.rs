// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::{
    future::{Future, IntoFuture},
    time::Duration,
};

use alloy::{
    eips::BlockNumberOrTag,
    network::ReceiptResponse,
    primitives::{Address, Bytes, B256, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{Filter, TransactionInput, TransactionRequest},
    sol,
    sol_types::{SolCall, SolEvent},
};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::Url;

sol! {
    /// Emitted by the L2 standard bridge once a deposit from L1 is credited.
    event DepositFinalized(
        address indexed l1Token,
        address indexed l2Token,
        address indexed from,
        address to,
        uint256 amount,
        bytes data
    );

    function decimals() external view returns (uint8);
}

/// The parts of a block header the syncer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
}

/// A decoded `DepositFinalized` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub height: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub l1_token: Address,
    pub l2_token: Address,
    pub from: Address,
    pub to: Address,
    /// Raw token units.
    pub amount: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Read and write access to the L2 chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> anyhow::Result<u64>;

    async fn block_number(&self) -> anyhow::Result<u64>;

    async fn header(&self, number: u64) -> anyhow::Result<BlockHeader>;

    /// Bridge deposit events in the inclusive range `[from, to]`.
    async fn deposit_events(&self, from: u64, to: u64) -> anyhow::Result<Vec<DepositEvent>>;

    async fn balance(&self, address: Address) -> anyhow::Result<U256>;

    async fn code(&self, address: Address) -> anyhow::Result<Bytes>;

    /// Pending transaction count, which is also the next usable nonce.
    async fn transaction_count(&self, address: Address) -> anyhow::Result<u64>;

    /// ERC-20 `decimals()` of a token contract.
    async fn token_decimals(&self, token: Address) -> anyhow::Result<u8>;

    async fn gas_price(&self) -> anyhow::Result<u128>;

    async fn estimate_transfer_gas(
        &self,
        from: Address,
        to: Address,
        value: U256,
    ) -> anyhow::Result<u64>;

    /// `None` while the transaction is unknown or still pending.
    async fn transaction_receipt(&self, hash: B256) -> anyhow::Result<Option<ReceiptSummary>>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> anyhow::Result<B256>;
}

/// [`ChainClient`] over a JSON-RPC endpoint. Every call is bounded by the
/// configured timeout.
#[derive(Clone)]
pub struct RpcChainClient {
    provider: DynProvider,
    bridge: Address,
    timeout: Duration,
}

impl RpcChainClient {
    pub fn new(rpc_url: Url, bridge: Address, timeout: Duration) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        Self {
            provider,
            bridge,
            timeout,
        }
    }

    async fn call<T, E, F>(&self, method: &'static str, fut: F) -> anyhow::Result<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                let e: anyhow::Error = e.into();
                e.context(format!("`{method}` failed"))
            }),
            Err(_) => Err(anyhow!("`{method}` timed out after {:?}", self.timeout)),
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        self.call("eth_chainId", self.provider.get_chain_id()).await
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        self.call("eth_blockNumber", self.provider.get_block_number())
            .await
    }

    async fn header(&self, number: u64) -> anyhow::Result<BlockHeader> {
        let block = self
            .call(
                "eth_getBlockByNumber",
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .into_future(),
            )
            .await?
            .ok_or_else(|| anyhow!("Block {number} not found"))?;

        Ok(BlockHeader {
            number,
            hash: block.header.hash,
            timestamp: block.header.timestamp,
        })
    }

    async fn deposit_events(&self, from: u64, to: u64) -> anyhow::Result<Vec<DepositEvent>> {
        let filter = Filter::new()
            .address(self.bridge)
            .event_signature(DepositFinalized::SIGNATURE_HASH)
            .from_block(from)
            .to_block(to);
        let logs = self
            .call("eth_getLogs", self.provider.get_logs(&filter))
            .await?;

        logs.into_iter()
            .map(|log| {
                let decoded = log
                    .log_decode::<DepositFinalized>()
                    .context("Malformed DepositFinalized log")?;
                let event = &decoded.inner.data;
                Ok(DepositEvent {
                    height: decoded
                        .block_number
                        .ok_or_else(|| anyhow!("Log without block number"))?,
                    tx_hash: decoded
                        .transaction_hash
                        .ok_or_else(|| anyhow!("Log without transaction hash"))?,
                    log_index: decoded
                        .log_index
                        .ok_or_else(|| anyhow!("Log without log index"))?,
                    l1_token: event.l1Token,
                    l2_token: event.l2Token,
                    from: event.from,
                    to: event.to,
                    amount: event.amount,
                })
            })
            .collect()
    }

    async fn balance(&self, address: Address) -> anyhow::Result<U256> {
        self.call("eth_getBalance", self.provider.get_balance(address).into_future())
            .await
    }

    async fn code(&self, address: Address) -> anyhow::Result<Bytes> {
        self.call("eth_getCode", self.provider.get_code_at(address).into_future())
            .await
    }

    async fn transaction_count(&self, address: Address) -> anyhow::Result<u64> {
        self.call(
            "eth_getTransactionCount",
            self.provider
                .get_transaction_count(address)
                .pending()
                .into_future(),
        )
        .await
    }

    async fn token_decimals(&self, token: Address) -> anyhow::Result<u8> {
        let request = TransactionRequest::default()
            .to(token)
            .input(TransactionInput::new(decimalsCall {}.abi_encode().into()));
        let output = self
            .call("eth_call", self.provider.call(request).into_future())
            .await?;

        if output.len() < 32 {
            bail!("Token {token} returned {} bytes for decimals()", output.len());
        }
        let value = U256::from_be_slice(&output[..32]);
        if value > U256::from(u8::MAX) {
            bail!("Token {token} reports {value} decimals");
        }
        Ok(value.to::<u8>())
    }

    async fn gas_price(&self) -> anyhow::Result<u128> {
        self.call("eth_gasPrice", self.provider.get_gas_price()).await
    }

    async fn estimate_transfer_gas(
        &self,
        from: Address,
        to: Address,
        value: U256,
    ) -> anyhow::Result<u64> {
        let request = TransactionRequest::default().from(from).to(to).value(value);
        self.call(
            "eth_estimateGas",
            self.provider.estimate_gas(request).into_future(),
        )
        .await
    }

    async fn transaction_receipt(&self, hash: B256) -> anyhow::Result<Option<ReceiptSummary>> {
        let receipt = self
            .call(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(hash),
            )
            .await?;
        Ok(receipt.map(|receipt| ReceiptSummary {
            block_number: receipt.block_number,
            success: ReceiptResponse::status(&receipt),
        }))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> anyhow::Result<B256> {
        let pending = self
            .call(
                "eth_sendRawTransaction",
                self.provider.send_raw_transaction(raw),
            )
            .await?;
        Ok(*pending.tx_hash())
    }
}
