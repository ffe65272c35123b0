//! Ticket purchase pipeline
//!
//! Drives one purchase attempt through a fixed state machine:
//!
//! ```text
//! Idle ─► Validating ─► Encrypting ─► Submitting ─► AwaitingFinality ─► Confirmed
//!             │              │             │                │
//!             └──────────────┴─────────────┴────────────────┴──────────► Failed
//! ```
//!
//! Every transition is logged and broadcast as a [`StatusEvent`]. At most one
//! attempt per round is in flight; a second one fails fast with
//! [`SubmissionError::AttemptInProgress`] and leaves the first untouched.
//!
//! Nothing about an attempt survives its terminal transition. Tickets that
//! landed are recovered from the ledger, never from pipeline state. The one
//! exception is a round whose attempt was abandoned after its write was
//! dispatched: the round stays held until that write resolves or the finality
//! window runs out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolCall;
use arena_contracts::IFHELottery;
use arena_core::{checksummed, unix_now, Ticket, TicketIntent};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::ArenaConfig;
use crate::error::{SubmissionError, UnconfirmedWrite, ValidationError};
use crate::gateway::{check_range, EncryptionGateway};
use crate::ledger::{FinalityStatus, LedgerWriter, PendingTx};
use crate::registry::RoundRegistry;
use crate::tickets::{TicketLedgerView, TicketViewError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Idle,
    Validating,
    Encrypting,
    Submitting,
    AwaitingFinality,
    Confirmed,
    Failed,
}

impl AttemptState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Encrypting => "encrypting",
            Self::Submitting => "submitting",
            Self::AwaitingFinality => "awaiting_finality",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;

        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Encrypting)
                | (Encrypting, Submitting)
                | (Submitting, AwaitingFinality)
                | (AwaitingFinality, Confirmed)
                | (Validating | Encrypting | Submitting | AwaitingFinality, Failed)
        )
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One transition of one attempt
#[derive(Clone, Debug)]
pub struct StatusEvent {
    pub attempt_id: u64,
    pub round_id: u64,
    pub state: AttemptState,
    /// Set once the write has been accepted
    pub tx_hash: Option<B256>,
    /// Set on the `Failed` transition
    pub error: Option<SubmissionError>,
}

/// A purchase that reached `Confirmed`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub attempt_id: u64,
    pub round_id: u64,
    pub submitter: Address,
    pub tx_hash: B256,
    pub block_number: u64,
}

/// Outcome of an unconfirmed write, as far as the ledger can tell now
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    /// The finality observer reports the write included
    Landed { block_number: u64 },
    /// The finality observer reports the write reverted or dropped
    Rejected { reason: String },
    /// The write is not included yet and may still land
    NotObserved,
    /// Observer unavailable; tickets that appeared since dispatch.
    ///
    /// Best effort only: other writes by the same owner in the same round
    /// show up here too.
    Inferred(Vec<Ticket>),
    /// Observer unavailable and no baseline was captured; these are all
    /// tickets the submitter holds
    Unverifiable(Vec<u64>),
}

#[derive(Debug)]
struct SubmissionAttempt {
    id: u64,
    round_id: u64,
    state: AttemptState,
    history: Vec<AttemptState>,
    submitter: Option<Address>,
    tx_hash: Option<B256>,
    tickets_before: Option<Vec<u64>>,
    awaiting_since: Option<Instant>,
}

impl SubmissionAttempt {
    fn new(id: u64, round_id: u64) -> Self {
        Self {
            id,
            round_id,
            state: AttemptState::Idle,
            history: vec![AttemptState::Idle],
            submitter: None,
            tx_hash: None,
            tickets_before: None,
            awaiting_since: None,
        }
    }

    fn advance(&mut self, next: AttemptState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.history.push(next);
        if next == AttemptState::AwaitingFinality {
            self.awaiting_since = Some(Instant::now());
        }
    }

    /// The dispatched write, once there is one
    fn unconfirmed(&self) -> Option<UnconfirmedWrite> {
        Some(UnconfirmedWrite {
            round_id: self.round_id,
            submitter: self.submitter?,
            tx_hash: self.tx_hash?,
            waited: self
                .awaiting_since
                .map(|since| since.elapsed())
                .unwrap_or_default(),
            tickets_before: self.tickets_before.clone(),
        })
    }
}

/// Timing knobs of the finality observer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    pub finality_timeout: Duration,
    pub poll_interval: Duration,
    pub event_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            finality_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            event_capacity: 64,
        }
    }
}

impl From<&ArenaConfig> for PipelineSettings {
    fn from(config: &ArenaConfig) -> Self {
        Self {
            finality_timeout: config.finality_timeout,
            poll_interval: config.poll_interval,
            event_capacity: config.event_capacity,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
    attempt_id: u64,
    state: AttemptState,
}

type InFlightMap = Arc<DashMap<u64, InFlight>>;

fn release(in_flight: &DashMap<u64, InFlight>, round_id: u64, attempt_id: u64) {
    in_flight.remove_if(&round_id, |_, slot| slot.attempt_id == attempt_id);
}

/// Owns an attempt and its round slot for the lifetime of a `purchase` call.
///
/// If the call is dropped before the attempt is terminal, the attempt fails
/// with [`SubmissionError::Abandoned`]. A dispatched write keeps the round
/// held until it resolves.
struct AttemptGuard<'a> {
    pipeline: &'a SubmissionPipeline,
    attempt: SubmissionAttempt,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let (id, round_id) = (self.attempt.id, self.attempt.round_id);

        if self.attempt.state.is_terminal() || self.attempt.state == AttemptState::Idle {
            release(&self.pipeline.in_flight, round_id, id);
            return;
        }

        let unconfirmed = self.attempt.unconfirmed();
        let err = SubmissionError::Abandoned {
            state: self.attempt.state,
            unconfirmed: unconfirmed.clone(),
        };
        tracing::warn!(
            "Attempt {} for round {} abandoned in {} (visited {:?})",
            id,
            round_id,
            self.attempt.state,
            self.attempt.history
        );
        self.pipeline
            .transition(&mut self.attempt, AttemptState::Failed, Some(err));

        let held = match unconfirmed {
            Some(unconfirmed) => self.pipeline.hold_until_resolved(id, unconfirmed),
            None => false,
        };
        if !held {
            release(&self.pipeline.in_flight, round_id, id);
        }
    }
}

pub struct SubmissionPipeline {
    contract: Address,
    settings: PipelineSettings,
    gateway: Arc<EncryptionGateway>,
    registry: Arc<RoundRegistry>,
    tickets: Arc<TicketLedgerView>,
    writer: Arc<dyn LedgerWriter>,
    in_flight: InFlightMap,
    next_attempt: AtomicU64,
    events: broadcast::Sender<StatusEvent>,
}

impl SubmissionPipeline {
    pub fn new(
        contract: Address,
        settings: PipelineSettings,
        gateway: Arc<EncryptionGateway>,
        registry: Arc<RoundRegistry>,
        tickets: Arc<TicketLedgerView>,
        writer: Arc<dyn LedgerWriter>,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));

        Self {
            contract,
            settings,
            gateway,
            registry,
            tickets,
            writer,
            in_flight: Arc::new(DashMap::new()),
            next_attempt: AtomicU64::new(1),
            events,
        }
    }

    /// Receive every state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// State of the attempt holding a round, if any.
    ///
    /// A round held by an abandoned write reports `AwaitingFinality`.
    pub fn attempt_state(&self, round_id: u64) -> Option<AttemptState> {
        self.in_flight.get(&round_id).map(|slot| slot.state)
    }

    /// Buy one ticket.
    ///
    /// Returns once the write is final or the attempt has failed. Dropping the
    /// returned future does not cancel a write that was already dispatched:
    /// subscribers see the attempt fail with [`SubmissionError::Abandoned`],
    /// and the round stays held until the write is included, rejected, or the
    /// finality window elapses. Pass the carried [`UnconfirmedWrite`] to
    /// [`Self::reconcile`] to learn what became of it.
    pub async fn purchase(&self, intent: TicketIntent) -> Result<Confirmation, SubmissionError> {
        let attempt_id = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.claim(intent.round_id, attempt_id)?;

        tracing::info!(
            "Attempt {} started for round {}",
            attempt_id,
            intent.round_id
        );

        match self.drive(&mut guard.attempt, &intent).await {
            Ok(confirmation) => Ok(confirmation),
            Err(err) => {
                tracing::warn!(
                    "Attempt {} for round {} failed in {} ({}): {}",
                    attempt_id,
                    intent.round_id,
                    guard.attempt.state,
                    err.kind(),
                    err
                );
                self.transition(&mut guard.attempt, AttemptState::Failed, Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Find out what became of a write whose finality was never observed.
    ///
    /// The finality observer is authoritative. Only when it cannot answer
    /// does this fall back to diffing the submitter's tickets against the
    /// pre-dispatch baseline.
    pub async fn reconcile(
        &self,
        unconfirmed: &UnconfirmedWrite,
    ) -> Result<Reconciliation, TicketViewError> {
        let pending = PendingTx {
            hash: unconfirmed.tx_hash,
            contract: self.contract,
        };

        let outcome = match self.writer.finality(&pending).await {
            Ok(FinalityStatus::Success { block_number }) => Reconciliation::Landed { block_number },
            Ok(FinalityStatus::Failed { reason }) => Reconciliation::Rejected { reason },
            // Not included, so no ticket can stem from this write yet
            Ok(FinalityStatus::Pending) => Reconciliation::NotObserved,
            Err(e) => {
                tracing::warn!(
                    "Finality observer unavailable for {}, diffing tickets: {}",
                    unconfirmed.tx_hash,
                    e
                );
                self.infer_from_tickets(unconfirmed).await?
            }
        };

        tracing::info!(
            "Reconciled {} for round {}: {:?}",
            unconfirmed.tx_hash,
            unconfirmed.round_id,
            outcome
        );

        Ok(outcome)
    }

    async fn infer_from_tickets(
        &self,
        unconfirmed: &UnconfirmedWrite,
    ) -> Result<Reconciliation, TicketViewError> {
        let Some(baseline) = &unconfirmed.tickets_before else {
            let current = self
                .tickets
                .tickets_of(unconfirmed.round_id, unconfirmed.submitter)
                .await?;
            return Ok(Reconciliation::Unverifiable(current));
        };

        let appeared = self
            .tickets
            .new_tickets_since(unconfirmed.round_id, unconfirmed.submitter, baseline)
            .await?;

        Ok(if appeared.is_empty() {
            Reconciliation::NotObserved
        } else {
            Reconciliation::Inferred(
                appeared
                    .into_iter()
                    .map(|index| Ticket {
                        round_id: unconfirmed.round_id,
                        index,
                        owner: unconfirmed.submitter,
                    })
                    .collect(),
            )
        })
    }

    fn claim(&self, round_id: u64, attempt_id: u64) -> Result<AttemptGuard<'_>, SubmissionError> {
        match self.in_flight.entry(round_id) {
            Entry::Occupied(slot) => {
                let existing = slot.get().attempt_id;
                tracing::debug!(
                    "Round {} busy with attempt {}, refusing attempt {}",
                    round_id,
                    existing,
                    attempt_id
                );
                Err(SubmissionError::AttemptInProgress {
                    round_id,
                    attempt_id: existing,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(InFlight {
                    attempt_id,
                    state: AttemptState::Idle,
                });
                Ok(AttemptGuard {
                    pipeline: self,
                    attempt: SubmissionAttempt::new(attempt_id, round_id),
                })
            }
        }
    }

    /// Keep an abandoned attempt's round held while its write is unresolved.
    /// Returns `false` when no runtime is available to watch it.
    fn hold_until_resolved(&self, attempt_id: u64, unconfirmed: UnconfirmedWrite) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        if let Some(mut slot) = self.in_flight.get_mut(&unconfirmed.round_id) {
            if slot.attempt_id == attempt_id {
                slot.state = AttemptState::AwaitingFinality;
            }
        }

        let writer = self.writer.clone();
        let in_flight = self.in_flight.clone();
        let settings = PipelineSettings {
            finality_timeout: self
                .settings
                .finality_timeout
                .saturating_sub(unconfirmed.waited),
            ..self.settings
        };
        let pending = PendingTx {
            hash: unconfirmed.tx_hash,
            contract: self.contract,
        };

        runtime.spawn(async move {
            let outcome = await_finality(writer.as_ref(), &pending, &settings).await;
            match outcome {
                Ok(block_number) => tracing::info!(
                    "Abandoned write {} included in block {}",
                    pending.hash,
                    block_number
                ),
                Err(Some(reason)) => {
                    tracing::info!("Abandoned write {} rejected: {}", pending.hash, reason)
                }
                Err(None) => tracing::warn!(
                    "Abandoned write {} still unresolved, releasing round {}",
                    pending.hash,
                    unconfirmed.round_id
                ),
            }
            release(&in_flight, unconfirmed.round_id, attempt_id);
        });

        true
    }

    async fn drive(
        &self,
        attempt: &mut SubmissionAttempt,
        intent: &TicketIntent,
    ) -> Result<Confirmation, SubmissionError> {
        self.transition(attempt, AttemptState::Validating, None);
        let submitter = self.validate(intent).await?;
        attempt.submitter = Some(submitter);

        attempt.tickets_before = match self.tickets.tickets_of(intent.round_id, submitter).await {
            Ok(tickets) => Some(tickets),
            Err(e) => {
                tracing::warn!("Could not read ticket baseline: {}", e);
                None
            }
        };

        self.transition(attempt, AttemptState::Encrypting, None);
        let context = self.gateway.ensure_context(submitter).await?;
        let payload = self
            .gateway
            .encrypt_bounded_u32(
                &context,
                intent.number,
                &checksummed(&self.contract),
                &checksummed(&submitter),
            )
            .await?;

        self.transition(attempt, AttemptState::Submitting, None);
        let (handle, proof) = payload.into_parts();
        let calldata = IFHELottery::buyTicketCall {
            roundId: U256::from(intent.round_id),
            encryptedNumber: handle,
            inputProof: proof,
        }
        .abi_encode();

        let pending = self
            .writer
            .write(submitter, self.contract, calldata.into())
            .await
            .map_err(SubmissionError::SubmissionRejected)?;

        attempt.tx_hash = Some(pending.hash);
        self.transition(attempt, AttemptState::AwaitingFinality, None);

        let block_number = match await_finality(self.writer.as_ref(), &pending, &self.settings).await
        {
            Ok(block_number) => block_number,
            Err(None) => {
                return Err(SubmissionError::FinalityTimeout(UnconfirmedWrite {
                    round_id: intent.round_id,
                    submitter,
                    tx_hash: pending.hash,
                    waited: self.settings.finality_timeout,
                    tickets_before: attempt.tickets_before.take(),
                }))
            }
            Err(Some(reason)) => {
                return Err(SubmissionError::LedgerRejected {
                    tx_hash: pending.hash,
                    reason,
                })
            }
        };

        self.transition(attempt, AttemptState::Confirmed, None);

        Ok(Confirmation {
            attempt_id: attempt.id,
            round_id: intent.round_id,
            submitter,
            tx_hash: pending.hash,
            block_number,
        })
    }

    /// Local checks, cheapest first. Nothing here touches the encryption
    /// backend or the write path.
    async fn validate(&self, intent: &TicketIntent) -> Result<Address, SubmissionError> {
        let submitter = intent
            .submitter
            .ok_or(ValidationError::WalletNotConnected)?;

        check_range(intent.number)?;

        let round = self.registry.round(intent.round_id).await?;
        if round.drawn {
            return Err(ValidationError::RoundDrawn(round.id).into());
        }
        if !round.is_open(unix_now()) {
            return Err(ValidationError::RoundClosed(round.id).into());
        }
        if !round.number_space.contains(intent.number) {
            return Err(ValidationError::OutOfNumberSpace {
                round_id: round.id,
                number: intent.number,
                space: round.number_space,
            }
            .into());
        }

        Ok(submitter)
    }

    fn transition(
        &self,
        attempt: &mut SubmissionAttempt,
        next: AttemptState,
        error: Option<SubmissionError>,
    ) {
        let previous = attempt.state;
        attempt.advance(next);

        if let Some(mut slot) = self.in_flight.get_mut(&attempt.round_id) {
            if slot.attempt_id == attempt.id {
                slot.state = next;
            }
        }

        tracing::info!(
            "Attempt {} (round {}): {} -> {}",
            attempt.id,
            attempt.round_id,
            previous,
            next
        );

        // Err only means nobody is subscribed
        let _ = self.events.send(StatusEvent {
            attempt_id: attempt.id,
            round_id: attempt.round_id,
            state: next,
            tx_hash: attempt.tx_hash,
            error,
        });
    }
}

/// Poll until the write is final. `Err(None)` is a timeout, `Err(Some(_))`
/// a terminal rejection.
async fn await_finality(
    writer: &dyn LedgerWriter,
    pending: &PendingTx,
    settings: &PipelineSettings,
) -> Result<u64, Option<String>> {
    let poll = async {
        loop {
            match writer.finality(pending).await {
                Ok(FinalityStatus::Success { block_number }) => return Ok(block_number),
                Ok(FinalityStatus::Failed { reason }) => return Err(Some(reason)),
                Ok(FinalityStatus::Pending) => {}
                Err(e) => tracing::warn!("Finality check for {} failed: {}", pending.hash, e),
            }
            tokio::time::sleep(settings.poll_interval).await;
        }
    };

    match tokio::time::timeout(settings.finality_timeout, poll).await {
        Ok(outcome) => outcome,
        Err(_) => Err(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use AttemptState::*;

        let happy = [Idle, Validating, Encrypting, Submitting, AwaitingFinality, Confirmed];
        for pair in happy.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }

        for state in [Validating, Encrypting, Submitting, AwaitingFinality] {
            assert!(state.can_advance_to(Failed));
        }

        assert!(!Idle.can_advance_to(Failed));
        assert!(!Idle.can_advance_to(Encrypting));
        assert!(!Encrypting.can_advance_to(Validating));
        assert!(!Submitting.can_advance_to(Confirmed));
        assert!(!Confirmed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Validating));
    }

    #[test]
    fn test_attempt_history() {
        let mut attempt = SubmissionAttempt::new(7, 2);
        attempt.advance(AttemptState::Validating);
        attempt.advance(AttemptState::Failed);

        assert!(attempt.state.is_terminal());
        assert_eq!(
            attempt.history,
            vec![AttemptState::Idle, AttemptState::Validating, AttemptState::Failed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_needs_dispatched_write() {
        let mut attempt = SubmissionAttempt::new(1, 0);
        attempt.advance(AttemptState::Validating);
        attempt.submitter = Some(Address::repeat_byte(0x10));
        attempt.tickets_before = Some(vec![3]);
        attempt.advance(AttemptState::Encrypting);
        attempt.advance(AttemptState::Submitting);
        assert_eq!(attempt.unconfirmed(), None);

        attempt.tx_hash = Some(B256::repeat_byte(0x01));
        attempt.advance(AttemptState::AwaitingFinality);
        tokio::time::advance(Duration::from_secs(3)).await;

        let unconfirmed = attempt.unconfirmed().unwrap();
        assert_eq!(unconfirmed.tx_hash, B256::repeat_byte(0x01));
        assert_eq!(unconfirmed.tickets_before, Some(vec![3]));
        assert_eq!(unconfirmed.waited, Duration::from_secs(3));
    }

    #[test]
    fn test_release_ignores_newer_slot() {
        let in_flight = DashMap::new();
        in_flight.insert(
            3,
            InFlight {
                attempt_id: 2,
                state: AttemptState::Validating,
            },
        );

        release(&in_flight, 3, 1);
        assert!(in_flight.contains_key(&3));

        release(&in_flight, 3, 2);
        assert!(in_flight.is_empty());
    }
}
