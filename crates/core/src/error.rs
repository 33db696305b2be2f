use thiserror::Error;

use crate::amount::DecimalAmount;

/// Why an amount could not be turned into raw ledger units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount must not be negative")]
    Negative,

    #[error("amount is not a finite number")]
    NotFinite,

    #[error("amount has {found} fractional digits but the asset only allows {allowed}")]
    TooPrecise { found: u32, allowed: u8 },

    #[error("malformed amount {0:?}")]
    Malformed(String),
}

/// The request field a validation error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Recipient,
    Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidAmount {
    #[error("amount must be greater than zero")]
    NotPositive,

    #[error("amount exceeds the transfer maximum of {maximum}")]
    AboveMaximum { maximum: DecimalAmount },

    #[error(transparent)]
    Conversion(#[from] AmountError),
}

/// Local validation failures. Never retried, always attributable to a field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] InvalidAmount),

    #[error("insufficient balance (requested {requested}, available {available})")]
    InsufficientBalance {
        requested: DecimalAmount,
        available: DecimalAmount,
    },
}

impl ValidationError {
    pub fn field(&self) -> Field {
        match self {
            ValidationError::InvalidRecipient(_) => Field::Recipient,
            ValidationError::InvalidAmount(_) | ValidationError::InsufficientBalance { .. } => {
                Field::Amount
            }
        }
    }
}

impl From<AmountError> for ValidationError {
    fn from(err: AmountError) -> Self {
        ValidationError::InvalidAmount(InvalidAmount::Conversion(err))
    }
}

/// Read-model fetch failures, kept on the store as `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("account error: {0}")]
    Account(String),
}

/// Submission failures reported by the transfer submitter. Terminal for the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("rejected by network{}", detail(.0))]
    RejectedByNetwork(Option<String>),

    #[error("invalid signature{}", detail(.0))]
    InvalidSignature(Option<String>),

    #[error("timed out{}", detail(.0))]
    Timeout(Option<String>),
}

impl SubmitError {
    /// Opaque reason code for callers that render their own copy.
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::RejectedByNetwork(_) => "rejected_by_network",
            SubmitError::InvalidSignature(_) => "invalid_signature",
            SubmitError::Timeout(_) => "timeout",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            SubmitError::RejectedByNetwork(message)
            | SubmitError::InvalidSignature(message)
            | SubmitError::Timeout(message) => message.as_deref(),
        }
    }
}

fn detail(message: &Option<String>) -> String {
    message
        .as_ref()
        .map(|message| format!(": {message}"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Submission(#[from] SubmitError),

    /// The task driving the submission died before producing a result.
    #[error("submission task aborted: {0}")]
    Aborted(String),
}
