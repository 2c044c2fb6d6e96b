// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use alloy::{
    consensus::{SignableTransaction, TxEnvelope, TxLegacy},
    eips::eip2718::{Decodable2718, Encodable2718},
    network::TxSignerSync,
    primitives::{Address, Bytes, TxKind, B256, U256},
    signers::local::PrivateKeySigner,
};
use anyhow::Context;

/// Everything needed to build a native transfer.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub chain_id: u64,
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub gas_price: u128,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransfer {
    pub hash: B256,
    pub raw: Bytes,
}

/// Signs a legacy (EIP-155) transfer and returns its EIP-2718 encoding.
pub fn sign_transfer(
    signer: &PrivateKeySigner,
    transfer: Transfer,
) -> anyhow::Result<SignedTransfer> {
    let mut tx = TxLegacy {
        chain_id: Some(transfer.chain_id),
        nonce: transfer.nonce,
        gas_price: transfer.gas_price,
        gas_limit: transfer.gas_limit,
        to: TxKind::Call(transfer.to),
        value: transfer.value,
        input: Bytes::new(),
    };
    let signature = signer
        .sign_transaction_sync(&mut tx)
        .context("Failed to sign transfer")?;
    let envelope = TxEnvelope::Legacy(tx.into_signed(signature));

    Ok(SignedTransfer {
        hash: *envelope.tx_hash(),
        raw: envelope.encoded_2718().into(),
    })
}

/// Decodes a persisted transaction and returns its hash.
pub fn decode_raw(raw: &[u8]) -> anyhow::Result<B256> {
    let mut buf = raw;
    let envelope = TxEnvelope::decode_2718(&mut buf).context("Invalid raw transaction")?;
    Ok(*envelope.tx_hash())
}
