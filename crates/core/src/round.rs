use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoundError {
    #[error("Invalid number space: min {min} is greater than max {max}")]
    InvalidNumberSpace { min: u64, max: u64 },
}

/// Inclusive range of numbers a ticket may carry in a given round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct NumberSpace {
    pub min: u64,
    pub max: u64,
}

impl NumberSpace {
    pub fn new(min: u64, max: u64) -> Result<Self, RoundError> {
        if min > max {
            return Err(RoundError::InvalidNumberSpace { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: u64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl Default for NumberSpace {
    fn default() -> Self {
        Self {
            min: 0,
            max: 999_999,
        }
    }
}

impl fmt::Display for NumberSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Where a round is in its lifecycle at a given instant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Accepting tickets
    Open,
    /// Deadline passed, winning number not published yet
    AwaitingDraw,
    /// Winning number and winner count are final
    Drawn,
}

impl RoundStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::AwaitingDraw => "awaiting-draw",
            Self::Drawn => "drawn",
        }
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One lottery round as reported by the ledger
///
/// `winning_number` and `winner_count` are only populated once `drawn` is set;
/// before that the ledger values are placeholders and must not be shown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Round {
    /// Sequential index assigned by the ledger
    pub id: u64,
    /// Display name
    pub name: String,
    /// Winning number (final once drawn)
    pub winning_number: Option<u32>,
    /// Draw deadline, unix seconds
    pub draw_time: u64,
    /// Monotonic false -> true
    pub drawn: bool,
    /// Tickets sold so far
    pub ticket_count: u64,
    /// Number of winners (final once drawn)
    pub winner_count: Option<u64>,
    /// Numbers accepted for this round's tickets
    pub number_space: NumberSpace,
}

impl Round {
    pub fn status(&self, now: u64) -> RoundStatus {
        if self.drawn {
            RoundStatus::Drawn
        } else if now >= self.draw_time {
            RoundStatus::AwaitingDraw
        } else {
            RoundStatus::Open
        }
    }

    pub fn is_open(&self, now: u64) -> bool {
        self.status(now) == RoundStatus::Open
    }

    /// Time left before the draw deadline, `None` once it has passed
    pub fn time_remaining(&self, now: u64) -> Option<Duration> {
        if self.drawn || now >= self.draw_time {
            return None;
        }
        Some(Duration::from_secs(self.draw_time - now))
    }

    /// Name to show when the ledger returned an empty one
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("Round #{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

/// Current wall-clock time in unix seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
