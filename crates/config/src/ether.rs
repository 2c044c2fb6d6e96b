// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use alloy::primitives::U256;
use bigdecimal::{num_bigint::BigInt, BigDecimal, ToPrimitive, Zero};
use serde::{de::Error, Deserialize};

const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

/// Native currency amount stored as wei (10^-18). Never zero.
///
/// Deserializes from human-readable strings like "0.01" or "1.5".
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct NonZeroEther(u128);

impl NonZeroEther {
    pub fn new(wei: u128) -> Result<Self, String> {
        if wei == 0 {
            Err("Native amount must be greater than 0".into())
        } else {
            Ok(NonZeroEther(wei))
        }
    }

    /// Convert an ether string to wei for test construction.
    /// Panics on invalid input - only use in tests.
    #[cfg(test)]
    pub fn from_ether(ether: &str) -> Self {
        use std::str::FromStr;
        let v = BigDecimal::from_str(ether).expect("invalid ether value");
        let wei = (v * BigDecimal::from(WEI_PER_ETHER))
            .to_u128()
            .expect("ether value too large");
        NonZeroEther::new(wei).expect("ether value is zero")
    }

    pub fn wei(&self) -> u128 {
        self.0
    }

    pub fn as_u256(&self) -> U256 {
        U256::from(self.0)
    }

    /// Human-readable value, used in logs.
    pub fn ether(&self) -> BigDecimal {
        BigDecimal::from(BigInt::from(self.0)) / BigDecimal::from(WEI_PER_ETHER)
    }
}

impl<'de> Deserialize<'de> for NonZeroEther {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = BigDecimal::deserialize(deserializer)?;
        if v <= BigDecimal::zero() {
            return Err(Error::custom("Native amount must be greater than 0"));
        }
        let v = v * BigDecimal::from(WEI_PER_ETHER);
        let wei = v
            .to_u128()
            .ok_or_else(|| Error::custom("Native amount cannot be represented as u128 wei"))?;
        if wei == 0 {
            return Err(Error::custom("Native amount must be greater than 0"));
        }

        Ok(Self(wei))
    }
}
