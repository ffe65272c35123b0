//! Settlement view of a user's tickets
//!
//! Status comes only from the round's `drawn` flag and the ledger's `isWinner`
//! answer; no winner computation happens here.

use std::sync::Arc;

use alloy_primitives::Address;
use arena_core::{TicketStatus, TicketView};
use futures::future::try_join_all;
use thiserror::Error;

use crate::registry::{RegistryError, RoundRegistry};
use crate::tickets::{TicketLedgerView, TicketViewError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Tickets(#[from] TicketViewError),
}

pub struct SettlementReconciler {
    registry: Arc<RoundRegistry>,
    tickets: Arc<TicketLedgerView>,
}

impl SettlementReconciler {
    pub fn new(registry: Arc<RoundRegistry>, tickets: Arc<TicketLedgerView>) -> Self {
        Self { registry, tickets }
    }

    /// Every ticket `owner` holds across all rounds, ordered by round then index
    pub async fn tickets_for(&self, owner: Address) -> Result<Vec<TicketView>, SettlementError> {
        let total = self.registry.total_rounds().await?;

        let per_round =
            try_join_all((0..total).map(|round_id| self.tickets_in(round_id, owner, total))).await?;

        Ok(per_round.into_iter().flatten().collect())
    }

    /// Tickets `owner` holds in a single round
    pub async fn round_tickets(
        &self,
        round_id: u64,
        owner: Address,
    ) -> Result<Vec<TicketView>, SettlementError> {
        let total = self.registry.total_rounds().await?;
        self.tickets_in(round_id, owner, total).await
    }

    async fn tickets_in(
        &self,
        round_id: u64,
        owner: Address,
        total: u64,
    ) -> Result<Vec<TicketView>, SettlementError> {
        let indices = self.tickets.tickets_of(round_id, owner).await?;
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let (round, is_winner) = tokio::try_join!(
            async {
                self.registry
                    .round_within(round_id, total)
                    .await
                    .map_err(SettlementError::from)
            },
            async {
                self.tickets
                    .is_winner(round_id, owner)
                    .await
                    .map_err(SettlementError::from)
            },
        )?;

        let status = TicketStatus::classify(round.drawn, is_winner);
        if is_winner && !round.drawn {
            tracing::warn!(
                "Ledger reports {} as winner of undrawn round {}; keeping tickets pending",
                owner,
                round_id
            );
        }

        let round_name = round.display_name();
        Ok(indices
            .into_iter()
            .map(|ticket_index| TicketView {
                round_id,
                ticket_index,
                round_name: round_name.clone(),
                status,
            })
            .collect())
    }
}
