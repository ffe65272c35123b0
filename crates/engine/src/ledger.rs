//! Ledger collaborator interfaces
//!
//! The engine never talks to a node directly. Reads and writes go through these
//! traits so the JSON-RPC client in [`crate::rpc`] can be swapped for an
//! in-memory ledger in tests or for a wallet-provider bridge in an embedding app.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decoding failed: {0}")]
    Decode(String),

    #[error("Call reverted: {0}")]
    Reverted(String),

    #[error("Request rejected by signer: {0}")]
    Rejected(String),
}

/// Round metadata exactly as `getRound` returns it, after ABI decoding.
///
/// Fields are not yet interpreted: before the draw `winning_number` and
/// `winner_count` are placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundRecord {
    pub name: String,
    pub winning_number: u32,
    pub draw_time: u64,
    pub drawn: bool,
    pub ticket_count: u64,
    pub winner_count: u64,
}

/// A write accepted into the pending-transaction pool
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTx {
    /// Transaction hash
    pub hash: B256,
    /// Contract the write targeted
    pub contract: Address,
}

/// Inclusion status reported by the finality observer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinalityStatus {
    /// Not included yet
    Pending,
    /// Included and executed successfully
    Success { block_number: u64 },
    /// Included but reverted, or dropped by the ledger
    Failed { reason: String },
}

/// Read side of the lottery contract
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// `roundsCount()`
    async fn rounds_count(&self) -> Result<u64, LedgerError>;

    /// `getRound(id)`
    async fn get_round(&self, round_id: u64) -> Result<RoundRecord, LedgerError>;

    /// `getUserTickets(id, user)`
    async fn get_user_tickets(&self, round_id: u64, user: Address)
        -> Result<Vec<u64>, LedgerError>;

    /// `isWinner(id, user)`
    async fn is_winner(&self, round_id: u64, user: Address) -> Result<bool, LedgerError>;

    /// `getWinners(id)`
    async fn get_winners(&self, round_id: u64) -> Result<Vec<Address>, LedgerError>;
}

/// Write side of the lottery contract plus the finality observer
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Dispatch ABI-encoded calldata from `from` to `contract`.
    ///
    /// Returns once the write is accepted into the pending pool. Once this
    /// returns `Ok` the write is irrevocable from the engine's point of view.
    async fn write(
        &self,
        from: Address,
        contract: Address,
        calldata: Bytes,
    ) -> Result<PendingTx, LedgerError>;

    /// Current inclusion status of a pending write
    async fn finality(&self, pending: &PendingTx) -> Result<FinalityStatus, LedgerError>;
}
