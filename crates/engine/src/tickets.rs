//! Ticket membership reconstructed from ledger reads
//!
//! Each query is an independent read. A ticket list and a winner flag fetched
//! at different moments are both valid but may disagree about the round's
//! state; [`crate::settlement`] combines them.

use std::sync::Arc;

use alloy_primitives::Address;
use thiserror::Error;

use crate::ledger::{LedgerError, LedgerReader};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TicketViewError {
    #[error("Ledger read failed: {0}")]
    Ledger(#[from] LedgerError),
}

pub struct TicketLedgerView {
    reader: Arc<dyn LedgerReader>,
}

impl TicketLedgerView {
    pub fn new(reader: Arc<dyn LedgerReader>) -> Self {
        Self { reader }
    }

    /// Ticket indices held by `owner` in a round, in ledger order
    pub async fn tickets_of(&self, round_id: u64, owner: Address) -> Result<Vec<u64>, TicketViewError> {
        let tickets = self.reader.get_user_tickets(round_id, owner).await?;
        tracing::debug!("{} holds {} tickets in round {}", owner, tickets.len(), round_id);
        Ok(tickets)
    }

    pub async fn is_winner(&self, round_id: u64, owner: Address) -> Result<bool, TicketViewError> {
        Ok(self.reader.is_winner(round_id, owner).await?)
    }

    pub async fn winners(&self, round_id: u64) -> Result<Vec<Address>, TicketViewError> {
        Ok(self.reader.get_winners(round_id).await?)
    }

    /// Indices held now that were not in `baseline`
    pub async fn new_tickets_since(
        &self,
        round_id: u64,
        owner: Address,
        baseline: &[u64],
    ) -> Result<Vec<u64>, TicketViewError> {
        let current = self.tickets_of(round_id, owner).await?;
        Ok(current
            .into_iter()
            .filter(|index| !baseline.contains(index))
            .collect())
    }
}
