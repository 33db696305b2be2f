//! Transfer submission state machine.
//!
//! `Idle → Validating → Submitting → Settling → Succeeded`, with `Failed` reachable from
//! Validating and Submitting. One [`TransferWorkflow`] handles exactly one attempt.
use std::{fmt::Display, sync::Arc, time::Duration};

use num_bigint::BigUint;
use tokio::sync::watch;
use tracing::{Instrument as _, debug, error, info, instrument, warn};

use crate::{
    amount::{self, DecimalAmount},
    error::{FailureReason, InvalidAmount, SubmitError, ValidationError},
    ledger::{Receipt, SubmitRequest, TransferSubmitter},
    store::{BalanceStore, TransferHistoryStore},
    transfer::{TransferOutcome, TransferRequest},
};

const DEFAULT_MAX_TRANSFER_AMOUNT: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    Idle,
    Validating,
    Submitting,
    Settling,
    Succeeded,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Succeeded | WorkflowState::Failed)
    }
}

impl Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Validating => "validating",
            WorkflowState::Submitting => "submitting",
            WorkflowState::Settling => "settling",
            WorkflowState::Succeeded => "succeeded",
            WorkflowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Largest amount, in whole units of the asset, a single transfer may move.
    pub max_transfer_amount: DecimalAmount,
    /// `None` waits on the submitter for as long as it takes.
    pub submission_timeout: Option<Duration>,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            max_transfer_amount: DecimalAmount::from(DEFAULT_MAX_TRANSFER_AMOUNT),
            submission_timeout: None,
        }
    }
}

pub struct TransferWorkflow {
    balances: BalanceStore,
    history: TransferHistoryStore,
    submitter: Arc<dyn TransferSubmitter>,
    policy: TransferPolicy,
    state_tx: watch::Sender<WorkflowState>,
}

impl TransferWorkflow {
    pub fn new(
        balances: BalanceStore,
        history: TransferHistoryStore,
        submitter: Arc<dyn TransferSubmitter>,
        policy: TransferPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(WorkflowState::Idle);
        Self {
            balances,
            history,
            submitter,
            policy,
            state_tx,
        }
    }

    pub fn state(&self) -> WorkflowState {
        *self.state_tx.borrow()
    }

    /// Observe transitions. The receiver outlives the workflow consumed by [`Self::submit`].
    pub fn watch_state(&self) -> watch::Receiver<WorkflowState> {
        self.state_tx.subscribe()
    }

    /// Checks a request against local state and returns its amount in raw units.
    ///
    /// Local checks run before the submitter's address-format check, so a bad amount is
    /// reported without touching any collaborator. The balance check reads the latest
    /// [`BalanceStore`] snapshot; an asset missing from it has a balance of zero.
    pub fn validate(&self, request: &TransferRequest) -> Result<BigUint, ValidationError> {
        if request.recipient.trim().is_empty() {
            return Err(ValidationError::InvalidRecipient(
                "recipient must not be empty".to_string(),
            ));
        }

        if request.amount.is_zero() {
            return Err(InvalidAmount::NotPositive.into());
        }
        if request.amount > self.policy.max_transfer_amount {
            return Err(InvalidAmount::AboveMaximum {
                maximum: self.policy.max_transfer_amount.clone(),
            }
            .into());
        }
        let raw_amount = amount::to_raw(&request.amount, request.asset.decimals)?;

        if !self.submitter.is_valid_address(&request.recipient) {
            return Err(ValidationError::InvalidRecipient(format!(
                "{:?} is not a valid address",
                request.recipient
            )));
        }

        let available = self.balances.balance_of(&request.asset).unwrap_or_default();
        if raw_amount > available {
            return Err(ValidationError::InsufficientBalance {
                requested: request.amount.clone(),
                available: amount::to_decimal(&available, request.asset.decimals),
            });
        }

        Ok(raw_amount)
    }

    /// Runs the attempt to completion and reports exactly one outcome.
    ///
    /// Once validation passes, submission and settling run on their own task: dropping the
    /// returned future does not withdraw the transfer, and a successful transfer still
    /// refreshes balances and history.
    #[instrument(
        name = "transfer",
        skip_all,
        fields(
            account = %self.balances.account(),
            asset.symbol = %request.asset.symbol,
            amount = %request.amount,
        )
    )]
    pub async fn submit(self, request: TransferRequest) -> TransferOutcome {
        self.transition(WorkflowState::Validating);
        let raw_amount = match self.validate(&request) {
            Ok(raw_amount) => raw_amount,
            Err(err) => {
                warn!(field = ?err.field(), error = %err, "transfer request rejected");
                self.transition(WorkflowState::Failed);
                return TransferOutcome::Failure {
                    reason: FailureReason::Validation(err),
                };
            }
        };

        self.transition(WorkflowState::Submitting);
        let state_tx = self.state_tx.clone();
        let task = tokio::spawn(
            self.submit_and_settle(request, raw_amount)
                .instrument(tracing::Span::current()),
        );

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "transfer task died before reporting an outcome");
                state_tx.send_replace(WorkflowState::Failed);
                TransferOutcome::Failure {
                    reason: FailureReason::Aborted(e.to_string()),
                }
            }
        }
    }

    async fn submit_and_settle(
        self,
        request: TransferRequest,
        raw_amount: BigUint,
    ) -> TransferOutcome {
        let submit_request = SubmitRequest {
            recipient: request.recipient,
            raw_amount,
            asset: request.asset,
        };

        let submission = self.submitter.submit(submit_request);
        let result = match self.policy.submission_timeout {
            Some(limit) => tokio::time::timeout(limit, submission)
                .await
                .unwrap_or_else(|_| {
                    Err(SubmitError::Timeout(Some(format!(
                        "no response from submitter within {}",
                        humantime::format_duration(limit)
                    ))))
                }),
            None => submission.await,
        };

        match result {
            Ok(Receipt { tx_ref }) => {
                self.transition(WorkflowState::Settling);
                // fire-and-forget; both are in flight before success is reported
                let _ = self.balances.begin_refresh();
                let _ = self.history.begin_refresh();

                info!(%tx_ref, "transfer submitted");
                self.transition(WorkflowState::Succeeded);
                TransferOutcome::Success { tx_ref }
            }
            Err(err) => {
                warn!(code = err.code(), error = %err, "transfer submission failed");
                self.transition(WorkflowState::Failed);
                TransferOutcome::Failure {
                    reason: FailureReason::Submission(err),
                }
            }
        }
    }

    fn transition(&self, next: WorkflowState) {
        let prev = self.state_tx.send_replace(next);
        debug_assert!(!prev.is_terminal(), "transition out of terminal state {prev}");
        debug!(from = %prev, to = %next, "transfer state changed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use mockall::predicate::always;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        asset::{AssetBalance, AssetRef},
        error::{AmountError, Field},
        ledger::{MockLedgerClient, MockTransferSubmitter},
    };

    fn usdc() -> AssetRef {
        AssetRef::new("usdc", "USDC", 6)
    }

    fn ledger_with_usdc(raw: u64) -> MockLedgerClient {
        let mut ledger = MockLedgerClient::new();
        ledger
            .expect_fetch_balances()
            .returning(move |_| Ok(vec![AssetBalance::new(usdc(), BigUint::from(raw))]));
        ledger.expect_fetch_history().returning(|_| Ok(vec![]));
        ledger
    }

    async fn stores(ledger: MockLedgerClient) -> (BalanceStore, TransferHistoryStore) {
        let ledger: Arc<MockLedgerClient> = Arc::new(ledger);
        let token = CancellationToken::new();
        let balances = BalanceStore::new("acct-1".into(), ledger.clone(), token.clone());
        let history = TransferHistoryStore::new("acct-1".into(), ledger, token);
        balances.refresh().await.unwrap();
        (balances, history)
    }

    fn request(amount: &str) -> TransferRequest {
        TransferRequest::parse("0xfeed", amount, usdc()).unwrap()
    }

    #[tokio::test]
    async fn zero_amount_is_rejected_before_any_collaborator_call() {
        let (balances, history) = stores(ledger_with_usdc(500_000_000)).await;
        // strict mock: any call to the submitter panics
        let submitter = MockTransferSubmitter::new();

        let workflow =
            TransferWorkflow::new(balances, history, Arc::new(submitter), TransferPolicy::default());
        let states = workflow.watch_state();
        let outcome = workflow.submit(request("0")).await;

        let err = match outcome {
            TransferOutcome::Failure {
                reason: FailureReason::Validation(err),
            } => err,
            other => panic!("expected validation failure, got {other:?}"),
        };
        assert_eq!(err, ValidationError::InvalidAmount(InvalidAmount::NotPositive));
        assert_eq!(err.field(), Field::Amount);
        assert_eq!(*states.borrow(), WorkflowState::Failed);
    }

    #[tokio::test]
    async fn amount_checks() {
        let (balances, history) = stores(ledger_with_usdc(500_000_000)).await;
        let mut submitter = MockTransferSubmitter::new();
        submitter.expect_is_valid_address().return_const(true);
        let workflow = TransferWorkflow::new(
            balances,
            history,
            Arc::new(submitter),
            TransferPolicy {
                max_transfer_amount: DecimalAmount::from(400),
                submission_timeout: None,
            },
        );

        assert_eq!(
            workflow.validate(&request("400.000001")),
            Err(InvalidAmount::AboveMaximum {
                maximum: DecimalAmount::from(400)
            }
            .into())
        );
        assert_eq!(
            workflow.validate(&request("1.0000001")),
            Err(AmountError::TooPrecise {
                found: 7,
                allowed: 6
            }
            .into())
        );
        assert_eq!(
            workflow.validate(&request("400")),
            Ok(BigUint::from(400_000_000u64))
        );
        // validation alone does not move the state machine
        assert_eq!(workflow.state(), WorkflowState::Idle);
    }

    #[tokio::test]
    async fn recipient_checks_are_attributed_to_recipient() {
        let (balances, history) = stores(ledger_with_usdc(500_000_000)).await;
        let mut submitter = MockTransferSubmitter::new();
        submitter
            .expect_is_valid_address()
            .returning(|recipient| recipient.starts_with("0x"));
        let workflow =
            TransferWorkflow::new(balances, history, Arc::new(submitter), TransferPolicy::default());

        let blank = TransferRequest::parse("   ", "1", usdc()).unwrap();
        let err = workflow.validate(&blank).unwrap_err();
        assert_eq!(err.field(), Field::Recipient);

        let malformed = TransferRequest::parse("alice", "1", usdc()).unwrap();
        let err = workflow.validate(&malformed).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn unknown_asset_counts_as_zero_balance() {
        let (balances, history) = stores(ledger_with_usdc(500_000_000)).await;
        let mut submitter = MockTransferSubmitter::new();
        submitter.expect_is_valid_address().return_const(true);
        let workflow =
            TransferWorkflow::new(balances, history, Arc::new(submitter), TransferPolicy::default());

        let dai = TransferRequest::parse("0xfeed", "1", AssetRef::new("dai", "DAI", 18)).unwrap();
        assert_eq!(
            workflow.validate(&dai),
            Err(ValidationError::InsufficientBalance {
                requested: DecimalAmount::from(1),
                available: DecimalAmount::zero(),
            })
        );
    }

    #[tokio::test]
    async fn submission_failure_is_terminal_and_skips_settling() {
        let mut ledger = MockLedgerClient::new();
        ledger
            .expect_fetch_balances()
            .times(1)
            .returning(|_| Ok(vec![AssetBalance::new(usdc(), BigUint::from(500_000_000u64))]));
        ledger.expect_fetch_history().never();
        let (balances, history) = stores(ledger).await;

        let mut submitter = MockTransferSubmitter::new();
        submitter.expect_is_valid_address().return_const(true);
        submitter
            .expect_submit()
            .with(always())
            .times(1)
            .returning(|_| Err(SubmitError::InvalidSignature(Some("bad key".into()))));

        let workflow = TransferWorkflow::new(
            balances.clone(),
            history.clone(),
            Arc::new(submitter),
            TransferPolicy::default(),
        );
        let outcome = workflow.submit(request("100")).await;

        assert_eq!(
            outcome,
            TransferOutcome::Failure {
                reason: FailureReason::Submission(SubmitError::InvalidSignature(Some(
                    "bad key".into()
                ))),
            }
        );
        assert!(!balances.is_loading());
        assert!(!history.is_loading());
    }

    #[tokio::test]
    async fn success_submits_raw_units_and_reports_tx_ref() {
        let (balances, history) = stores(ledger_with_usdc(500_000_000)).await;
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&submitted);

        let mut submitter = MockTransferSubmitter::new();
        submitter.expect_is_valid_address().return_const(true);
        submitter.expect_submit().times(1).returning(move |request| {
            seen.lock().unwrap().push(request);
            Ok(Receipt {
                tx_ref: "0xabc".into(),
            })
        });

        let workflow =
            TransferWorkflow::new(balances, history, Arc::new(submitter), TransferPolicy::default());
        let states = workflow.watch_state();
        assert_eq!(*states.borrow(), WorkflowState::Idle);

        let outcome = workflow.submit(request("100")).await;
        assert_eq!(
            outcome,
            TransferOutcome::Success {
                tx_ref: "0xabc".into()
            }
        );
        assert_eq!(*states.borrow(), WorkflowState::Succeeded);
        assert!(states.borrow().is_terminal());

        let submitted = submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].raw_amount, BigUint::from(100_000_000u64));
        assert_eq!(submitted[0].recipient, "0xfeed");
    }
}
