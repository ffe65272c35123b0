use std::fmt;

use alloy_primitives::Address;
use serde::Serialize;

/// A purchase the user has started but the ledger has not confirmed yet.
///
/// Intents are never persisted; confirmed tickets are recovered from the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketIntent {
    /// Plaintext number chosen by the user
    pub number: u64,
    /// Target round
    pub round_id: u64,
    /// Connected wallet, `None` when no wallet is connected
    pub submitter: Option<Address>,
}

impl TicketIntent {
    pub fn new(round_id: u64, number: u64, submitter: Address) -> Self {
        Self {
            number,
            round_id,
            submitter: Some(submitter),
        }
    }
}

/// A ticket as observed on the ledger. The plaintext number is never known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub round_id: u64,
    pub index: u64,
    pub owner: Address,
}

/// Settlement classification of a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Round not drawn yet
    Pending,
    /// Round drawn, owner did not win
    Drawn,
    /// Round drawn, owner is a winner
    Winner,
}

impl TicketStatus {
    /// Winner flags reported for an undrawn round are ignored.
    pub fn classify(drawn: bool, is_winner: bool) -> Self {
        match (drawn, is_winner) {
            (false, _) => Self::Pending,
            (true, true) => Self::Winner,
            (true, false) => Self::Drawn,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Drawn => "drawn",
            Self::Winner => "winner",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ticket record handed to presentation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TicketView {
    pub round_id: u64,
    pub ticket_index: u64,
    pub round_name: String,
    pub status: TicketStatus,
}

impl TicketView {
    /// e.g. `TKT-2-14`
    pub fn display_id(&self) -> String {
        format!("TKT-{}-{}", self.round_id, self.ticket_index)
    }
}
