use std::{ops::Deref, sync::Arc};

use futures::FutureExt as _;
use tokio_util::sync::CancellationToken;

use super::ReadModel;
use crate::{
    ledger::{AccountId, LedgerClient},
    transfer::TransferHistoryEntry,
};

/// Recent transfers of the active account, most recent first.
#[derive(Clone)]
pub struct TransferHistoryStore {
    account: AccountId,
    model: ReadModel<TransferHistoryEntry>,
}

impl TransferHistoryStore {
    pub fn new(
        account: AccountId,
        ledger: Arc<dyn LedgerClient>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let fetch_account = account.clone();
        let model = ReadModel::new(
            "history",
            Arc::new(move || {
                let ledger = Arc::clone(&ledger);
                let account = fetch_account.clone();
                async move { ledger.fetch_history(&account).await }.boxed()
            }),
            sort_history,
            shutdown_token,
        );

        Self { account, model }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }
}

impl Deref for TransferHistoryStore {
    type Target = ReadModel<TransferHistoryEntry>;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}

/// Timestamp descending, ties by tx ref so the order is deterministic.
fn sort_history(entries: &mut Vec<TransferHistoryEntry>) {
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.tx_ref.cmp(&b.tx_ref))
    });
}
