//! Boundary contracts for the ledger services this crate orchestrates.
//!
//! Implementations live outside this crate: they own transport, signing and broadcast.
use std::fmt::Display;

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::{
    asset::{AssetBalance, AssetRef},
    error::{FetchError, SubmitError},
    transfer::{TransferHistoryEntry, TxRef},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// What the submitter receives: the amount is already in raw ledger units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub recipient: String,
    pub raw_amount: BigUint,
    pub asset: AssetRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_ref: TxRef,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn fetch_balances(&self, account: &AccountId) -> Result<Vec<AssetBalance>, FetchError>;

    async fn fetch_history(
        &self,
        account: &AccountId,
    ) -> Result<Vec<TransferHistoryEntry>, FetchError>;
}

/// Signs and broadcasts transfers for the active account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferSubmitter: Send + Sync {
    /// Address-format check applied while validating a request.
    fn is_valid_address(&self, recipient: &str) -> bool {
        !recipient.trim().is_empty()
    }

    async fn submit(&self, request: SubmitRequest) -> Result<Receipt, SubmitError>;
}
