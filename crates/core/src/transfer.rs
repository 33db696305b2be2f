use std::fmt::Display;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::{
    amount::DecimalAmount,
    asset::{AssetRef, raw_amount},
    error::{FailureReason, ValidationError},
};

/// Ledger transaction reference returned by the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxRef(String);

impl TxRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TxRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TxRef {
    fn from(tx_ref: String) -> Self {
        Self(tx_ref)
    }
}

impl From<&str> for TxRef {
    fn from(tx_ref: &str) -> Self {
        Self(tx_ref.to_string())
    }
}

/// A single transfer attempt. Built per submission and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub recipient: String,
    pub amount: DecimalAmount,
    pub asset: AssetRef,
}

impl TransferRequest {
    pub fn new(recipient: impl Into<String>, amount: DecimalAmount, asset: AssetRef) -> Self {
        Self {
            recipient: recipient.into(),
            amount,
            asset,
        }
    }

    /// Builds a request from user input, attributing a malformed amount to the amount field.
    pub fn parse(
        recipient: impl Into<String>,
        amount: &str,
        asset: AssetRef,
    ) -> Result<Self, ValidationError> {
        let amount = amount.parse::<DecimalAmount>()?;
        Ok(Self::new(recipient, amount, asset))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success { tx_ref: TxRef },
    Failure { reason: FailureReason },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success { .. })
    }

    pub fn tx_ref(&self) -> Option<&TxRef> {
        match self {
            TransferOutcome::Success { tx_ref } => Some(tx_ref),
            TransferOutcome::Failure { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<TxRef, FailureReason> {
        match self {
            TransferOutcome::Success { tx_ref } => Ok(tx_ref),
            TransferOutcome::Failure { reason } => Err(reason),
        }
    }
}

impl Display for TransferOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferOutcome::Success { tx_ref } => write!(f, "succeeded ({tx_ref})"),
            TransferOutcome::Failure { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
}

impl Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::Confirmed => write!(f, "confirmed"),
            TransferStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHistoryEntry {
    pub tx_ref: TxRef,
    pub recipient: String,
    pub asset: AssetRef,
    #[serde(with = "raw_amount")]
    pub raw_amount: BigUint,
    /// Unix seconds.
    pub timestamp: u64,
    pub status: TransferStatus,
}
