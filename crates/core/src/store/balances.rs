use std::{ops::Deref, sync::Arc};

use futures::FutureExt as _;
use num_bigint::BigUint;
use tokio_util::sync::CancellationToken;

use super::ReadModel;
use crate::{
    asset::{AssetBalance, AssetRef},
    ledger::{AccountId, LedgerClient},
};

/// Balances of the active account, in the order the ledger reports them.
#[derive(Clone)]
pub struct BalanceStore {
    account: AccountId,
    model: ReadModel<AssetBalance>,
}

impl BalanceStore {
    pub fn new(
        account: AccountId,
        ledger: Arc<dyn LedgerClient>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let fetch_account = account.clone();
        let model = ReadModel::new(
            "balances",
            Arc::new(move || {
                let ledger = Arc::clone(&ledger);
                let account = fetch_account.clone();
                async move { ledger.fetch_balances(&account).await }.boxed()
            }),
            |_| {},
            shutdown_token,
        );

        Self { account, model }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Raw balance for `asset` in the latest snapshot. Does not fetch.
    pub fn balance_of(&self, asset: &AssetRef) -> Option<BigUint> {
        self.model
            .items()
            .iter()
            .find(|balance| balance.asset.same_asset(asset))
            .map(|balance| balance.raw_amount.clone())
    }
}

impl Deref for BalanceStore {
    type Target = ReadModel<AssetBalance>;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}
