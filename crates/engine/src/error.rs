//! Error taxonomy of a purchase attempt

use std::fmt;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use arena_core::NumberSpace;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::ledger::LedgerError;
use crate::pipeline::AttemptState;
use crate::registry::RegistryError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Number {number} is outside round {round_id}'s number space ({space})")]
    OutOfNumberSpace {
        round_id: u64,
        number: u64,
        space: NumberSpace,
    },

    #[error("Round {0} has already been drawn")]
    RoundDrawn(u64),

    #[error("Round {0} no longer accepts tickets")]
    RoundClosed(u64),
}

/// Write dispatched but not seen final in time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnconfirmedWrite {
    pub round_id: u64,
    pub submitter: Address,
    pub tx_hash: B256,
    pub waited: Duration,
    /// Submitter's ticket indices before dispatch, `None` if that read failed
    pub tickets_before: Option<Vec<u64>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Round lookup failed: {0}")]
    Round(#[from] RegistryError),

    #[error("Encryption failed: {0}")]
    Encryption(#[from] GatewayError),

    #[error("Submission rejected: {0}")]
    SubmissionRejected(LedgerError),

    #[error("Ledger rejected transaction {tx_hash}: {reason}")]
    LedgerRejected { tx_hash: B256, reason: String },

    #[error("No finality for transaction {} within {:?}", .0.tx_hash, .0.waited)]
    FinalityTimeout(UnconfirmedWrite),

    #[error("Attempt {attempt_id} for round {round_id} is still in progress")]
    AttemptInProgress { round_id: u64, attempt_id: u64 },

    /// The caller stopped waiting. `unconfirmed` is set once a write was
    /// dispatched; that write may still land.
    #[error("Attempt abandoned in {state}")]
    Abandoned {
        state: AttemptState,
        unconfirmed: Option<UnconfirmedWrite>,
    },
}

/// Failure classes callers branch on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Range,
    EncryptionBackend,
    SubmissionRejected,
    LedgerRejected,
    FinalityTimeout,
    AttemptInProgress,
    NotFound,
    LedgerRead,
    Abandoned,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Range => "range",
            Self::EncryptionBackend => "encryption-backend",
            Self::SubmissionRejected => "submission-rejected",
            Self::LedgerRejected => "ledger-rejected",
            Self::FinalityTimeout => "finality-timeout",
            Self::AttemptInProgress => "attempt-in-progress",
            Self::NotFound => "not-found",
            Self::LedgerRead => "ledger-read",
            Self::Abandoned => "abandoned",
        }
    }

    /// A fresh attempt may succeed without the user changing anything
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EncryptionBackend | Self::LedgerRejected | Self::LedgerRead
        )
    }

    /// Outcome is ambiguous; tickets must be re-read before assuming loss
    pub fn requires_reconciliation(&self) -> bool {
        matches!(self, Self::FinalityTimeout | Self::Abandoned)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl SubmissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Round(RegistryError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Round(RegistryError::Ledger(_)) => ErrorKind::LedgerRead,
            Self::Encryption(GatewayError::Range { .. }) => ErrorKind::Range,
            Self::Encryption(GatewayError::Address(_)) => ErrorKind::Validation,
            Self::Encryption(_) => ErrorKind::EncryptionBackend,
            Self::SubmissionRejected(_) => ErrorKind::SubmissionRejected,
            Self::LedgerRejected { .. } => ErrorKind::LedgerRejected,
            Self::FinalityTimeout(_) => ErrorKind::FinalityTimeout,
            Self::AttemptInProgress { .. } => ErrorKind::AttemptInProgress,
            Self::Abandoned { .. } => ErrorKind::Abandoned,
        }
    }

    /// The dispatched write whose outcome is unknown, if any
    pub fn unconfirmed(&self) -> Option<&UnconfirmedWrite> {
        match self {
            Self::FinalityTimeout(unconfirmed) => Some(unconfirmed),
            Self::Abandoned { unconfirmed, .. } => unconfirmed.as_ref(),
            _ => None,
        }
    }
}
