//! Shared test utilities for arena-engine tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{address, Address, Bytes, B256};
use alloy_sol_types::SolCall;
use arena_contracts::IFHELottery::buyTicketCall;
use arena_core::unix_now;
use arena_engine::{
    BackendError, EncryptedInput, EncryptionBackend, EncryptionGateway, FinalityStatus,
    LedgerError, LedgerReader, LedgerWriter, NumberSpacePolicy, PendingTx, PipelineSettings,
    RoundRecord, RoundRegistry, SchemeConfig, SchemeInstance, SettlementReconciler,
    SubmissionPipeline, TicketLedgerView,
};
use async_trait::async_trait;

pub const LOTTERY: Address = address!("0xeA9ac7b02551ae9C81E4E7070E2a2C4c17a9A487");
pub const ALICE: Address = address!("0x1000000000000000000000000000000000000001");
pub const BOB: Address = address!("0x2000000000000000000000000000000000000002");

/// How the ledger answers `write`
#[derive(Clone, Debug)]
pub enum WriteMode {
    Accept,
    Reject(String),
}

/// How the ledger answers finality polls for accepted writes
#[derive(Clone, Debug)]
pub enum FinalityMode {
    /// Included after `polls` pending answers
    Land { polls: usize },
    /// Included but reverted
    Revert(String),
    /// Never included
    Never,
    /// Ticket recorded at once, receipt lookups fail
    LandUnobserved,
}

#[derive(Clone, Debug)]
struct Dispatched {
    round_id: u64,
    from: Address,
    polls: usize,
    stuck: bool,
    settled: Option<FinalityStatus>,
}

struct LedgerState {
    rounds: Vec<RoundRecord>,
    tickets: HashMap<(u64, Address), Vec<u64>>,
    winners: HashMap<u64, Vec<Address>>,
    write_mode: WriteMode,
    finality_mode: FinalityMode,
    dispatched: HashMap<B256, Dispatched>,
    calldata: Vec<Bytes>,
    next_block: u64,
}

/// In-memory lottery contract implementing both ledger traits
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub polls: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                rounds: Vec::new(),
                tickets: HashMap::new(),
                winners: HashMap::new(),
                write_mode: WriteMode::Accept,
                finality_mode: FinalityMode::Land { polls: 0 },
                dispatched: HashMap::new(),
                calldata: Vec::new(),
                next_block: 100,
            }),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        }
    }

    /// Add an open round closing an hour from now, returns its id
    pub fn open_round(&self, name: &str) -> u64 {
        self.push_round(RoundRecord {
            name: name.into(),
            winning_number: 0,
            draw_time: unix_now() + 3600,
            drawn: false,
            ticket_count: 0,
            winner_count: 0,
        })
    }

    pub fn push_round(&self, record: RoundRecord) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.rounds.push(record);
        state.rounds.len() as u64 - 1
    }

    /// Mark a round drawn with the given winners
    pub fn draw(&self, round_id: u64, winning_number: u32, winners: &[Address]) {
        let mut state = self.state.lock().unwrap();
        let round = &mut state.rounds[round_id as usize];
        round.drawn = true;
        round.winning_number = winning_number;
        round.winner_count = winners.len() as u64;
        state.winners.insert(round_id, winners.to_vec());
    }

    /// Report winners without marking the round drawn
    pub fn set_winners(&self, round_id: u64, winners: &[Address]) {
        self.state
            .lock()
            .unwrap()
            .winners
            .insert(round_id, winners.to_vec());
    }

    /// Seed tickets without going through a purchase
    pub fn give_tickets(&self, round_id: u64, owner: Address, indices: &[u64]) {
        let mut state = self.state.lock().unwrap();
        state.rounds[round_id as usize].ticket_count += indices.len() as u64;
        state
            .tickets
            .entry((round_id, owner))
            .or_default()
            .extend_from_slice(indices);
    }

    pub fn set_write_mode(&self, mode: WriteMode) {
        self.state.lock().unwrap().write_mode = mode;
    }

    pub fn set_finality_mode(&self, mode: FinalityMode) {
        self.state.lock().unwrap().finality_mode = mode;
    }

    /// Keep every unsettled write pending forever, whatever the finality mode
    pub fn strand_dispatched(&self) {
        let mut state = self.state.lock().unwrap();
        for tx in state.dispatched.values_mut() {
            if tx.settled.is_none() {
                tx.stuck = true;
            }
        }
    }

    /// Decoded `buyTicket` calls in dispatch order
    pub fn buy_calls(&self) -> Vec<buyTicketCall> {
        self.state
            .lock()
            .unwrap()
            .calldata
            .iter()
            .map(|data| buyTicketCall::abi_decode(data).unwrap())
            .collect()
    }

    fn record_ticket(state: &mut LedgerState, round_id: u64, owner: Address) {
        let round = &mut state.rounds[round_id as usize];
        let index = round.ticket_count;
        round.ticket_count += 1;
        state.tickets.entry((round_id, owner)).or_default().push(index);
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn rounds_count(&self) -> Result<u64, LedgerError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().rounds.len() as u64)
    }

    async fn get_round(&self, round_id: u64) -> Result<RoundRecord, LedgerError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .rounds
            .get(round_id as usize)
            .cloned()
            .ok_or_else(|| LedgerError::Reverted("invalid round".into()))
    }

    async fn get_user_tickets(&self, round_id: u64, user: Address) -> Result<Vec<u64>, LedgerError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .unwrap()
            .tickets
            .get(&(round_id, user))
            .cloned()
            .unwrap_or_default())
    }

    async fn is_winner(&self, round_id: u64, user: Address) -> Result<bool, LedgerError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .unwrap()
            .winners
            .get(&round_id)
            .is_some_and(|winners| winners.contains(&user)))
    }

    async fn get_winners(&self, round_id: u64) -> Result<Vec<Address>, LedgerError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .unwrap()
            .winners
            .get(&round_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl LedgerWriter for MemoryLedger {
    async fn write(
        &self,
        from: Address,
        contract: Address,
        calldata: Bytes,
    ) -> Result<PendingTx, LedgerError> {
        let count = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().unwrap();

        if let WriteMode::Reject(reason) = &state.write_mode {
            return Err(LedgerError::Rejected(reason.clone()));
        }

        let call = buyTicketCall::abi_decode(&calldata)
            .map_err(|e| LedgerError::Reverted(e.to_string()))?;
        let round_id: u64 = call.roundId.to::<u64>();

        let hash = B256::with_last_byte(count as u8);
        state.calldata.push(calldata);
        state.dispatched.insert(
            hash,
            Dispatched {
                round_id,
                from,
                polls: 0,
                stuck: false,
                settled: None,
            },
        );

        if matches!(state.finality_mode, FinalityMode::LandUnobserved) {
            Self::record_ticket(&mut state, round_id, from);
        }

        Ok(PendingTx { hash, contract })
    }

    async fn finality(&self, pending: &PendingTx) -> Result<FinalityStatus, LedgerError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        let mode = state.finality_mode.clone();
        let Some(tx) = state.dispatched.get_mut(&pending.hash) else {
            return Err(LedgerError::Transport("unknown transaction".into()));
        };
        if let Some(settled) = &tx.settled {
            return Ok(settled.clone());
        }
        if tx.stuck {
            return Ok(FinalityStatus::Pending);
        }

        let status = match mode {
            FinalityMode::Land { polls } if tx.polls >= polls => {
                let block_number = state.next_block;
                state.next_block += 1;
                FinalityStatus::Success { block_number }
            }
            FinalityMode::Revert(reason) => FinalityStatus::Failed { reason },
            FinalityMode::LandUnobserved => {
                return Err(LedgerError::Transport("receipt unavailable".into()))
            }
            _ => {
                tx.polls += 1;
                return Ok(FinalityStatus::Pending);
            }
        };

        let (round_id, from) = (tx.round_id, tx.from);
        tx.settled = Some(status.clone());
        if matches!(status, FinalityStatus::Success { .. }) {
            Self::record_ticket(state, round_id, from);
        }
        Ok(status)
    }
}

/// Scheme backend that counts bootstraps and encryptions
#[derive(Default)]
pub struct CountingBackend {
    pub inits: AtomicUsize,
    pub fail_init: AtomicBool,
    pub encryptions: Arc<AtomicUsize>,
    pub bindings: Arc<Mutex<Vec<(String, String, u32)>>>,
    /// Encryptions never complete while set
    pub stall_encrypt: Arc<AtomicBool>,
}

struct CountingInstance {
    encryptions: Arc<AtomicUsize>,
    bindings: Arc<Mutex<Vec<(String, String, u32)>>>,
    stall: Arc<AtomicBool>,
}

#[async_trait]
impl EncryptionBackend for CountingBackend {
    async fn init(&self) -> Result<(), BackendError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(BackendError::Init("parameters unavailable".into()));
        }
        Ok(())
    }

    async fn create_instance(
        &self,
        _config: &SchemeConfig,
    ) -> Result<Arc<dyn SchemeInstance>, BackendError> {
        Ok(Arc::new(CountingInstance {
            encryptions: self.encryptions.clone(),
            bindings: self.bindings.clone(),
            stall: self.stall_encrypt.clone(),
        }))
    }
}

#[async_trait]
impl SchemeInstance for CountingInstance {
    async fn encrypt_u32(
        &self,
        contract: &str,
        user: &str,
        value: u32,
    ) -> Result<EncryptedInput, BackendError> {
        self.encryptions.fetch_add(1, Ordering::SeqCst);
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.bindings
            .lock()
            .unwrap()
            .push((contract.to_string(), user.to_string(), value));

        let mut handle = vec![0xcc; 32];
        handle[28..].copy_from_slice(&value.to_be_bytes());

        Ok(EncryptedInput {
            handles: vec![handle],
            input_proof: vec![0x01, 0x02, 0x03, 0x04],
        })
    }
}

pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        finality_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(100),
        event_capacity: 32,
    }
}

/// Everything wired against one in-memory ledger
pub struct Harness {
    pub ledger: Arc<MemoryLedger>,
    pub backend: Arc<CountingBackend>,
    pub gateway: Arc<EncryptionGateway>,
    pub registry: Arc<RoundRegistry>,
    pub tickets: Arc<TicketLedgerView>,
    pub settlement: SettlementReconciler,
    pub pipeline: Arc<SubmissionPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(NumberSpacePolicy::default())
    }

    pub fn with_policy(policy: NumberSpacePolicy) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let backend = Arc::new(CountingBackend::default());
        let gateway = Arc::new(EncryptionGateway::new(
            backend.clone(),
            SchemeConfig::sepolia(),
        ));
        let registry = Arc::new(RoundRegistry::new(ledger.clone(), policy));
        let tickets = Arc::new(TicketLedgerView::new(ledger.clone()));
        let settlement = SettlementReconciler::new(registry.clone(), tickets.clone());
        let pipeline = Arc::new(SubmissionPipeline::new(
            LOTTERY,
            test_settings(),
            gateway.clone(),
            registry.clone(),
            tickets.clone(),
            ledger.clone(),
        ));

        Self {
            ledger,
            backend,
            gateway,
            registry,
            tickets,
            settlement,
            pipeline,
        }
    }
}
