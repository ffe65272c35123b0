//! Read-only view over round metadata
//!
//! Nothing is cached: `drawn` and `ticket_count` change underneath us, so every
//! call reflects the ledger at call time.

use std::sync::Arc;

use arena_core::Round;
use futures::future::try_join_all;
use thiserror::Error;

use crate::config::NumberSpacePolicy;
use crate::ledger::{LedgerError, LedgerReader, RoundRecord};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Round {round_id} not found ({total} rounds exist)")]
    NotFound { round_id: u64, total: u64 },

    #[error("Ledger read failed: {0}")]
    Ledger(#[from] LedgerError),
}

pub struct RoundRegistry {
    reader: Arc<dyn LedgerReader>,
    number_spaces: NumberSpacePolicy,
}

impl RoundRegistry {
    pub fn new(reader: Arc<dyn LedgerReader>, number_spaces: NumberSpacePolicy) -> Self {
        Self {
            reader,
            number_spaces,
        }
    }

    pub async fn total_rounds(&self) -> Result<u64, RegistryError> {
        Ok(self.reader.rounds_count().await?)
    }

    /// Fetch one round, `NotFound` when `round_id` is past the last round
    pub async fn round(&self, round_id: u64) -> Result<Round, RegistryError> {
        let total = self.total_rounds().await?;
        self.round_within(round_id, total).await
    }

    /// Same as [`Self::round`] against a round count the caller already read
    pub(crate) async fn round_within(
        &self,
        round_id: u64,
        total: u64,
    ) -> Result<Round, RegistryError> {
        if round_id >= total {
            return Err(RegistryError::NotFound { round_id, total });
        }

        let record = self.reader.get_round(round_id).await?;
        Ok(self.interpret(round_id, record))
    }

    /// Fetch every round; reads are issued concurrently
    pub async fn rounds(&self) -> Result<Vec<Round>, RegistryError> {
        let total = self.total_rounds().await?;
        tracing::debug!("Fetching {} rounds", total);

        let records = try_join_all((0..total).map(|id| self.reader.get_round(id))).await?;

        Ok(records
            .into_iter()
            .zip(0..total)
            .map(|(record, id)| self.interpret(id, record))
            .collect())
    }

    /// Rounds still accepting tickets at `now`
    pub async fn open_rounds(&self, now: u64) -> Result<Vec<Round>, RegistryError> {
        Ok(self
            .rounds()
            .await?
            .into_iter()
            .filter(|round| round.is_open(now))
            .collect())
    }

    fn interpret(&self, round_id: u64, record: RoundRecord) -> Round {
        if !record.drawn && (record.winning_number != 0 || record.winner_count != 0) {
            tracing::warn!(
                "Round {} reports draw results before being drawn; ignoring them",
                round_id
            );
        }

        Round {
            id: round_id,
            name: record.name,
            winning_number: record.drawn.then_some(record.winning_number),
            draw_time: record.draw_time,
            drawn: record.drawn,
            ticket_count: record.ticket_count,
            winner_count: record.drawn.then_some(record.winner_count),
            number_space: self.number_spaces.for_round(round_id),
        }
    }
}
