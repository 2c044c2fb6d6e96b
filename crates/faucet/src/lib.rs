// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

//! # Bridge faucet
//!
//! Watches the L2 standard bridge for finalized deposits and sends a small
//! amount of native currency to fresh addresses that bridged enough value,
//! so they can pay for their first transactions.
//!
//! Two loops share a Postgres ledger: the [syncer] records deposit events
//! behind a checkpoint, and the faucet loop runs the [disburse] engine and the
//! [confirm] monitor over the recorded deposits.

pub mod chain;
pub mod cli;
pub mod confirm;
pub mod database;
pub mod disburse;
pub mod eligibility;
pub mod keys;
pub mod ledger;
pub mod nonce;
pub mod service;
pub mod syncer;
pub mod transaction;
