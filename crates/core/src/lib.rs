pub mod amount;
pub mod asset;
pub mod config;
pub mod error;
pub mod ledger;
pub mod presenter;
pub mod session;
pub mod store;
pub mod transfer;
pub mod workflow;

pub use amount::{DecimalAmount, IntoAmount, to_decimal, to_raw};
pub use asset::{AssetBalance, AssetId, AssetRef};
pub use config::{Config, PolicyConfig};
pub use error::{
    AmountError, FailureReason, FetchError, Field, InvalidAmount, SubmitError, ValidationError,
};
pub use ledger::{AccountId, LedgerClient, Receipt, SubmitRequest, TransferSubmitter};
pub use presenter::{BalanceListView, DisplayMode, present};
pub use session::AccountSession;
pub use store::{BalanceStore, Snapshot, TransferHistoryStore};
pub use transfer::{TransferHistoryEntry, TransferOutcome, TransferRequest, TransferStatus, TxRef};
pub use workflow::{TransferPolicy, TransferWorkflow, WorkflowState};
