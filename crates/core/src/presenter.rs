use serde::Serialize;

use crate::{amount, asset::AssetBalance};

/// Entries shown by the compact balance list.
pub const COMPACT_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayMode {
    #[default]
    Compact,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceListView {
    pub visible: Vec<AssetBalance>,
    pub truncated: bool,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceRow {
    pub asset_id: String,
    pub symbol: String,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_ref: Option<String>,
}

impl BalanceListView {
    pub fn rows(&self, max_fraction_digits: u32) -> Vec<BalanceRow> {
        self.visible
            .iter()
            .map(|balance| BalanceRow {
                asset_id: balance.asset.id.to_string(),
                symbol: balance.asset.symbol.clone(),
                amount: amount::format_display(
                    &balance.raw_amount,
                    balance.asset.decimals,
                    max_fraction_digits,
                ),
                icon_ref: balance.asset.icon_ref.clone(),
            })
            .collect()
    }
}

/// Builds the balance list view model, keeping the store's order.
///
/// In compact mode the list counts as truncated as soon as it holds more than one entry, even
/// when all of them fit in [`COMPACT_LIMIT`].
pub fn present(balances: &[AssetBalance], mode: DisplayMode) -> BalanceListView {
    let total_count = balances.len();
    match mode {
        DisplayMode::Compact => BalanceListView {
            visible: balances.iter().take(COMPACT_LIMIT).cloned().collect(),
            truncated: total_count > 1,
            total_count,
        },
        DisplayMode::Full => BalanceListView {
            visible: balances.to_vec(),
            truncated: false,
            total_count,
        },
    }
}
