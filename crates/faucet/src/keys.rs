// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use std::{fs, path::Path, str::FromStr};

use alloy::signers::local::PrivateKeySigner;
use anyhow::Context;

/// Reads the funding account from a file holding a hex encoded private key,
/// with or without `0x` and surrounding whitespace.
pub fn load_signer(path: &Path) -> anyhow::Result<PrivateKeySigner> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file `{}`", path.display()))?;
    let key = contents.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    // the parse error is not forwarded so key material never reaches the logs
    PrivateKeySigner::from_str(key)
        .map_err(|_| anyhow::anyhow!("Key file `{}` is not a valid private key", path.display()))
}
