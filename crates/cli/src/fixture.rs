//! File-backed ledger so the CLI can run without a network.
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use color_eyre::eyre::{self, Context as _, bail};
use figment::{
    Figment,
    providers::{Format as _, Yaml},
};
use satchel_core::{
    AccountId, AssetBalance, FetchError, LedgerClient, Receipt, SubmitError, SubmitRequest,
    TransferHistoryEntry, TransferStatus, TransferSubmitter, TxRef,
};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Fixture {
    #[serde(default)]
    pub accounts: HashMap<String, AccountFixture>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AccountFixture {
    #[serde(default)]
    pub balances: Vec<AssetBalance>,

    #[serde(default)]
    pub history: Vec<TransferHistoryEntry>,

    /// When set, every fetch for this account fails with this network error
    #[serde(default)]
    pub unavailable: Option<String>,
}

pub(crate) struct FixtureLedger {
    accounts: Mutex<HashMap<AccountId, AccountFixture>>,
    next_tx: AtomicU64,
}

impl FixtureLedger {
    pub(crate) fn load(path: &Path) -> eyre::Result<Self> {
        if !path.exists() {
            bail!("fixture ledger {} not found", path.display());
        }

        let fixture: Fixture = Figment::new()
            .merge(Yaml::file(path))
            .extract()
            .wrap_err_with(|| format!("failed to parse fixture ledger {}", path.display()))?;

        info!(accounts = fixture.accounts.len(), "loaded fixture ledger");
        Ok(Self::from_fixture(fixture))
    }

    pub(crate) fn from_fixture(fixture: Fixture) -> Self {
        let accounts = fixture
            .accounts
            .into_iter()
            .map(|(id, account)| (AccountId::from(id), account))
            .collect();

        Self {
            accounts: Mutex::new(accounts),
            next_tx: AtomicU64::new(1),
        }
    }

    /// Submitter that books transfers out of `account`.
    pub(crate) fn submitter(self: &Arc<Self>, account: AccountId) -> FixtureSubmitter {
        FixtureSubmitter {
            ledger: Arc::clone(self),
            account,
        }
    }

    fn with_account<R>(
        &self,
        account: &AccountId,
        f: impl FnOnce(&mut AccountFixture) -> R,
    ) -> Option<R> {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        accounts.get_mut(account).map(f)
    }

    fn read<T>(
        &self,
        account: &AccountId,
        f: impl FnOnce(&AccountFixture) -> T,
    ) -> Result<T, FetchError> {
        self.with_account(account, |fixture| match &fixture.unavailable {
            Some(reason) => Err(FetchError::Network(reason.clone())),
            None => Ok(f(fixture)),
        })
        .unwrap_or_else(|| Err(FetchError::Account(format!("unknown account {account}"))))
    }
}

#[async_trait]
impl LedgerClient for FixtureLedger {
    async fn fetch_balances(&self, account: &AccountId) -> Result<Vec<AssetBalance>, FetchError> {
        self.read(account, |fixture| fixture.balances.clone())
    }

    async fn fetch_history(
        &self,
        account: &AccountId,
    ) -> Result<Vec<TransferHistoryEntry>, FetchError> {
        self.read(account, |fixture| fixture.history.clone())
    }
}

pub(crate) struct FixtureSubmitter {
    ledger: Arc<FixtureLedger>,
    account: AccountId,
}

#[async_trait]
impl TransferSubmitter for FixtureSubmitter {
    /// `0x` followed by at least one hex digit.
    fn is_valid_address(&self, recipient: &str) -> bool {
        recipient
            .strip_prefix("0x")
            .is_some_and(|hex| !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()))
    }

    async fn submit(&self, request: SubmitRequest) -> Result<Receipt, SubmitError> {
        let tx_ref = TxRef::from(format!(
            "0x{:08x}",
            self.ledger.next_tx.fetch_add(1, Ordering::SeqCst)
        ));
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        let booked = self
            .ledger
            .with_account(&self.account, |fixture| -> Result<(), SubmitError> {
                let balance = fixture
                    .balances
                    .iter_mut()
                    .find(|balance| balance.asset.same_asset(&request.asset))
                    .filter(|balance| balance.raw_amount >= request.raw_amount)
                    .ok_or_else(|| {
                        SubmitError::RejectedByNetwork(Some("insufficient funds".into()))
                    })?;
                balance.raw_amount -= &request.raw_amount;

                fixture.history.push(TransferHistoryEntry {
                    tx_ref: tx_ref.clone(),
                    recipient: request.recipient.clone(),
                    asset: request.asset.clone(),
                    raw_amount: request.raw_amount.clone(),
                    timestamp,
                    status: TransferStatus::Pending,
                });
                Ok(())
            });

        match booked {
            Some(Ok(())) => {
                debug!(%tx_ref, account = %self.account, "booked fixture transfer");
                Ok(Receipt { tx_ref })
            }
            Some(Err(err)) => Err(err),
            None => Err(SubmitError::InvalidSignature(Some(format!(
                "no signing key for {}",
                self.account
            )))),
        }
    }
}
