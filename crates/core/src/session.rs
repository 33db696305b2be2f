//! The surface a wallet front end talks to for one active account.
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    asset::AssetBalance,
    error::FetchError,
    ledger::{AccountId, LedgerClient, TransferSubmitter},
    presenter::{self, BalanceListView, DisplayMode},
    store::{BalanceStore, Snapshot, TransferHistoryStore},
    transfer::{TransferHistoryEntry, TransferOutcome, TransferRequest},
    workflow::{TransferPolicy, TransferWorkflow},
};

/// Owns the read-models of one account.
///
/// Created on account activation and torn down on switch or drop. Tearing down stops the
/// background tasks driving this session's refreshes.
pub struct AccountSession {
    account: AccountId,
    ledger: Arc<dyn LedgerClient>,
    submitter: Arc<dyn TransferSubmitter>,
    policy: TransferPolicy,
    balances: BalanceStore,
    history: TransferHistoryStore,
    shutdown_token: CancellationToken,
}

impl AccountSession {
    pub fn activate(
        account: AccountId,
        ledger: Arc<dyn LedgerClient>,
        submitter: Arc<dyn TransferSubmitter>,
        policy: TransferPolicy,
    ) -> Self {
        let shutdown_token = CancellationToken::new();
        let balances = BalanceStore::new(
            account.clone(),
            Arc::clone(&ledger),
            shutdown_token.child_token(),
        );
        let history = TransferHistoryStore::new(
            account.clone(),
            Arc::clone(&ledger),
            shutdown_token.child_token(),
        );

        info!(%account, "activated account session");

        Self {
            account,
            ledger,
            submitter,
            policy,
            balances,
            history,
            shutdown_token,
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn policy(&self) -> &TransferPolicy {
        &self.policy
    }

    pub fn balances(&self) -> &BalanceStore {
        &self.balances
    }

    pub fn history(&self) -> &TransferHistoryStore {
        &self.history
    }

    pub fn get_balances(&self) -> Snapshot<AssetBalance> {
        self.balances.snapshot()
    }

    pub fn get_history(&self) -> Snapshot<TransferHistoryEntry> {
        self.history.snapshot()
    }

    pub fn subscribe_balances(&self) -> watch::Receiver<Snapshot<AssetBalance>> {
        self.balances.subscribe()
    }

    pub fn subscribe_history(&self) -> watch::Receiver<Snapshot<TransferHistoryEntry>> {
        self.history.subscribe()
    }

    /// Refreshes both read-models concurrently.
    pub async fn refresh_all(&self) -> (Result<(), FetchError>, Result<(), FetchError>) {
        futures::join!(self.balances.refresh(), self.history.refresh())
    }

    /// A fresh workflow for one transfer attempt.
    pub fn workflow(&self) -> TransferWorkflow {
        TransferWorkflow::new(
            self.balances.clone(),
            self.history.clone(),
            Arc::clone(&self.submitter),
            self.policy.clone(),
        )
    }

    pub async fn submit_transfer(&self, request: TransferRequest) -> TransferOutcome {
        self.workflow().submit(request).await
    }

    pub fn present_list(&self, mode: DisplayMode) -> BalanceListView {
        presenter::present(&self.balances.items(), mode)
    }

    /// Tears this session down and activates `account` against the same collaborators.
    pub fn switch_account(self, account: AccountId) -> Self {
        info!(from = %self.account, to = %account, "switching account");
        Self::activate(
            account,
            Arc::clone(&self.ledger),
            Arc::clone(&self.submitter),
            self.policy.clone(),
        )
    }

    /// Tears the session down, stopping any refresh still running in the background.
    pub fn close(self) {
        self.shut_down();
    }

    fn shut_down(&self) {
        if !self.shutdown_token.is_cancelled() {
            info!(account = %self.account, "closing account session");
            self.shutdown_token.cancel();
        }
    }
}

impl Drop for AccountSession {
    fn drop(&mut self) {
        self.shut_down();
    }
}
