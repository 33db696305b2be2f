use std::fmt::Display;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::amount::{self, DecimalAmount};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(String);

impl Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AssetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AssetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A fungible asset as reported by the ledger.
///
/// `decimals` is fixed for an asset id within a session. An asset that comes back with a
/// different `decimals` is a different asset, so identity compares both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: AssetId,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_ref: Option<String>,
}

impl AssetRef {
    pub fn new(id: impl Into<AssetId>, symbol: &str, decimals: u8) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.to_string(),
            decimals,
            icon_ref: None,
        }
    }

    pub fn with_icon(mut self, icon_ref: &str) -> Self {
        self.icon_ref = Some(icon_ref.to_string());
        self
    }

    pub fn same_asset(&self, other: &AssetRef) -> bool {
        self.id == other.id && self.decimals == other.decimals
    }
}

impl Display for AssetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.symbol, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: AssetRef,
    #[serde(with = "raw_amount")]
    pub raw_amount: BigUint,
}

impl AssetBalance {
    pub fn new(asset: AssetRef, raw_amount: BigUint) -> Self {
        Self { asset, raw_amount }
    }

    /// Display amount in whole units, computed on demand.
    pub fn display_amount(&self) -> DecimalAmount {
        amount::to_decimal(&self.raw_amount, self.asset.decimals)
    }
}

impl Display for AssetBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.display_amount(), self.asset.symbol)
    }
}

/// Serializes raw ledger amounts as base-10 strings so fixtures and JSON stay readable.
pub mod raw_amount {
    use num_bigint::BigUint;
    use serde::{Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BigUint::parse_bytes(raw.trim().as_bytes(), 10)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid raw amount {raw:?}")))
    }
}
