// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

mod config;
mod ether;

pub use config::*;
pub use ether::*;
