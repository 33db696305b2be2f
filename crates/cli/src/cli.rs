use std::{
    sync::Arc,
    time::{Duration, UNIX_EPOCH},
};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{self, Context as _, OptionExt as _, eyre};
use satchel_core::{
    AccountId, AccountSession, AssetRef, DisplayMode, FailureReason, Field, TransferHistoryEntry,
    TransferOutcome, TransferRequest, amount,
    presenter::{BalanceListView, BalanceRow},
};
use serde::Serialize;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{config::CliConfig, fixture::FixtureLedger};

#[derive(Parser)]
#[command(name = "satchel", about)]
pub(crate) struct Cli {
    /// Account to act as, overriding the configured one
    #[arg(long, global = true)]
    account: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the account's balances
    Balances(BalancesArgs),

    /// Show recent transfers, newest first
    History(HistoryArgs),

    /// Send an amount of an asset to a recipient
    Send(SendArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct BalancesArgs {
    /// List every asset instead of the compact view
    #[arg(long)]
    full: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Fraction digits shown per amount
    #[arg(long, default_value_t = 6)]
    digits: u32,
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct HistoryArgs {
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub(crate) struct SendArgs {
    /// Recipient address
    #[arg(long)]
    to: String,

    /// Amount in whole units, e.g. 12.5
    #[arg(long)]
    amount: String,

    /// Asset symbol or id, as listed by `balances`
    #[arg(long)]
    asset: String,
}

impl Cli {
    pub(crate) async fn run(
        self,
        config: CliConfig,
        shutdown_token: CancellationToken,
    ) -> eyre::Result<()> {
        let policy = config
            .core
            .transfer_policy()
            .wrap_err("invalid transfer policy")?;
        let account = self
            .account
            .map(AccountId::from)
            .unwrap_or_else(|| config.core.account_id());

        let ledger = Arc::new(FixtureLedger::load(&config.fixture)?);
        let submitter = Arc::new(ledger.submitter(account.clone()));
        let session = AccountSession::activate(account, ledger, submitter, policy);

        match self.command {
            Commands::Balances(args) => args.run(&session).await,
            Commands::History(args) => args.run(&session).await,
            Commands::Send(args) => args.run(&session, shutdown_token).await,
        }
    }
}

#[derive(Debug, Serialize)]
struct BalanceListOutput {
    account: String,
    balances: Vec<BalanceRow>,
    truncated: bool,
    total_count: usize,
}

impl BalancesArgs {
    async fn run(&self, session: &AccountSession) -> eyre::Result<()> {
        session
            .balances()
            .refresh()
            .await
            .wrap_err("failed to load balances")?;

        let mode = if self.full {
            DisplayMode::Full
        } else {
            DisplayMode::Compact
        };
        let view = session.present_list(mode);

        if self.json {
            let output = BalanceListOutput {
                account: session.account().to_string(),
                balances: view.rows(self.digits),
                truncated: view.truncated,
                total_count: view.total_count,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&output).expect("implements serde::Serialize")
            );
        } else {
            print!("{}", render_balances(&view, self.digits));
        }

        Ok(())
    }
}

fn render_balances(view: &BalanceListView, digits: u32) -> String {
    if view.total_count == 0 {
        return "no balances\n".to_string();
    }

    let mut out = String::new();
    for row in view.rows(digits) {
        out.push_str(&format!("{:<8} {:>24}\n", row.symbol, row.amount));
    }
    if view.truncated {
        let hidden = view.total_count - view.visible.len();
        if hidden > 0 {
            out.push_str(&format!("... {hidden} more, "));
        }
        out.push_str(&format!("--full to show all {}\n", view.total_count));
    }
    out
}

impl HistoryArgs {
    async fn run(&self, session: &AccountSession) -> eyre::Result<()> {
        session
            .history()
            .refresh()
            .await
            .wrap_err("failed to load transfer history")?;
        let entries = session.get_history().items;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&*entries).expect("implements serde::Serialize")
            );
            return Ok(());
        }

        if entries.is_empty() {
            println!("no transfers");
        }
        for entry in entries.iter() {
            println!("{}", render_history_entry(entry));
        }

        Ok(())
    }
}

fn render_history_entry(entry: &TransferHistoryEntry) -> String {
    let when =
        humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(entry.timestamp));
    let amount = amount::to_decimal(&entry.raw_amount, entry.asset.decimals);
    format!(
        "{when}  {:<10} {:<9} {amount} {} -> {}",
        entry.tx_ref.to_string(),
        entry.status.to_string(),
        entry.asset.symbol,
        entry.recipient
    )
}

impl SendArgs {
    async fn run(
        &self,
        session: &AccountSession,
        shutdown_token: CancellationToken,
    ) -> eyre::Result<()> {
        session
            .balances()
            .refresh()
            .await
            .wrap_err("failed to load balances")?;

        let asset = self.resolve_asset(session)?;
        let request = TransferRequest::parse(self.to.clone(), &self.amount, asset)
            .map_err(|err| eyre!("{}: {err}", field_name(err.field())))?;

        let workflow = session.workflow();
        let outcome = select! {
            biased;
            () = shutdown_token.cancelled() => {
                warn!("interrupted, the transfer may still be submitted");
                return Err(eyre!("interrupted before the transfer outcome was known"));
            }
            outcome = workflow.submit(request) => outcome,
        };

        let tx_ref = match outcome {
            TransferOutcome::Success { tx_ref } => tx_ref,
            TransferOutcome::Failure {
                reason: FailureReason::Validation(err),
            } => return Err(eyre!("{}: {err}", field_name(err.field()))),
            TransferOutcome::Failure { reason } => return Err(eyre!("transfer failed: {reason}")),
        };
        println!("submitted {tx_ref}");

        let mut balances = session.subscribe_balances();
        let settled = async {
            balances
                .wait_for(|state| !state.is_loading)
                .await
                .map(|state| state.last_error.clone())
        };
        select! {
            biased;
            () = shutdown_token.cancelled() => {
                info!(%tx_ref, "interrupted before balances settled");
                return Err(eyre!("interrupted before balances settled after {tx_ref}"));
            }
            settled = settled => {
                if let Some(err) = settled.wrap_err("balance store closed")? {
                    warn!(error = %err, "balances could not be refreshed after transfer");
                }
                let view = session.present_list(DisplayMode::Full);
                print!("{}", render_balances(&view, 6));
            }
        }

        Ok(())
    }

    /// Looks the asset up by symbol (case-insensitive) or id in the latest balances.
    fn resolve_asset(&self, session: &AccountSession) -> eyre::Result<AssetRef> {
        session
            .get_balances()
            .items
            .iter()
            .map(|balance| &balance.asset)
            .find(|asset| {
                asset.symbol.eq_ignore_ascii_case(&self.asset) || asset.id.to_string() == self.asset
            })
            .cloned()
            .ok_or_eyre("unknown asset, see `satchel balances --full`")
    }
}

fn field_name(field: Field) -> &'static str {
    match field {
        Field::Recipient => "recipient",
        Field::Amount => "amount",
    }
}

#[cfg(test)]
mod tests {
    use figment::{
        Figment,
        providers::{Format as _, Yaml},
    };
    use num_bigint::BigUint;
    use satchel_core::{AssetBalance, LedgerClient as _, TransferPolicy, TransferStatus, present};

    use super::*;
    use crate::fixture::Fixture;

    fn balance(symbol: &str, raw: u64) -> AssetBalance {
        AssetBalance::new(
            AssetRef::new(symbol.to_lowercase(), symbol, 6),
            BigUint::from(raw),
        )
    }

    #[test]
    fn compact_rendering_points_at_full_view() {
        let list = [
            balance("USDC", 500_000_000),
            balance("DAI", 1_250_000),
            balance("WETH", 3),
            balance("WBTC", 10),
        ];

        let text = render_balances(&present(&list, DisplayMode::Compact), 2);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("USDC"));
        assert!(lines[0].ends_with("500"));
        assert!(lines[1].ends_with("1.25"));
        assert_eq!(lines[3], "... 1 more, --full to show all 4");

        let text = render_balances(&present(&list[..2], DisplayMode::Compact), 2);
        assert!(text.ends_with("--full to show all 2\n"));

        let text = render_balances(&present(&list, DisplayMode::Full), 2);
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn history_line() {
        let entry = TransferHistoryEntry {
            tx_ref: "0x01".into(),
            recipient: "0xfeed".into(),
            asset: AssetRef::new("usdc", "USDC", 6),
            raw_amount: BigUint::from(1_500_000u64),
            timestamp: 0,
            status: TransferStatus::Confirmed,
        };
        assert_eq!(
            render_history_entry(&entry),
            "1970-01-01T00:00:00Z  0x01       confirmed 1.5 USDC -> 0xfeed"
        );
    }

    #[test]
    fn parses_send() {
        let cli = Cli::try_parse_from([
            "satchel", "send", "--to", "0xfeed", "--amount", "12.5", "--asset", "usdc",
        ])
        .unwrap();
        match cli.command {
            Commands::Send(args) => {
                assert_eq!(args.amount, "12.5");
                assert_eq!(args.asset, "usdc");
            }
            _ => panic!("expected send"),
        }
    }

    #[tokio::test]
    async fn interrupted_send_fails_without_submitting() {
        let fixture: Fixture = Figment::new()
            .merge(Yaml::string(
                r#"
accounts:
  acct-1:
    balances:
      - asset: { id: usdc, symbol: USDC, decimals: 6 }
        raw_amount: "500000000"
"#,
            ))
            .extract()
            .unwrap();
        let ledger = Arc::new(FixtureLedger::from_fixture(fixture));
        let session = AccountSession::activate(
            "acct-1".into(),
            ledger.clone(),
            Arc::new(ledger.submitter("acct-1".into())),
            TransferPolicy::default(),
        );

        let shutdown_token = CancellationToken::new();
        shutdown_token.cancel();
        let args = SendArgs {
            to: "0xfeed".into(),
            amount: "1".into(),
            asset: "usdc".into(),
        };

        let err = args.run(&session, shutdown_token).await.unwrap_err();
        assert!(err.to_string().contains("interrupted"));

        let balances = ledger.fetch_balances(&"acct-1".into()).await.unwrap();
        assert_eq!(balances[0].raw_amount, BigUint::from(500_000_000u64));
    }
}
