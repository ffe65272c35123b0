//! Arena engine - encrypted ticket submission and settlement
//!
//! Users pick a number, the number is encrypted client-side, and only the
//! ciphertext handle plus an input proof ever reach the lottery contract.
//! After the draw, ticket status is read back from the ledger.
//!
//! # Architecture
//!
//! ```text
//!              TicketIntent
//!                   │
//!                   ▼
//! ┌───────────────────────────────┐     ┌───────────────────┐
//! │ SubmissionPipeline            │────►│ RoundRegistry     │──┐
//! │ validate → encrypt → submit   │     └───────────────────┘  │
//! │ → await finality              │     ┌───────────────────┐  │
//! │                               │────►│ EncryptionGateway │  │ LedgerReader
//! └───────────────────────────────┘     └───────────────────┘  │
//!                   │ LedgerWriter                             │
//!                   ▼                                          ▼
//!             lottery contract ◄──────────── TicketLedgerView ◄┘
//!                                                   │
//!                                                   ▼
//!                                          SettlementReconciler
//! ```
//!
//! # Key Components
//!
//! - [`gateway`] - Scheme context cache and bounded `u32` encryption
//! - [`pipeline`] - Purchase state machine and status events
//! - [`registry`] - Round metadata and open/drawn interpretation
//! - [`tickets`] - Per-owner ticket reads
//! - [`settlement`] - Ticket status after the draw
//! - [`rpc`] - JSON-RPC implementation of the ledger traits

pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod pipeline;
pub mod registry;
pub mod rpc;
pub mod settlement;
pub mod tickets;

pub use config::{ArenaConfig, ConfigError, NumberSpacePolicy};
pub use error::{ErrorKind, SubmissionError, UnconfirmedWrite, ValidationError};
pub use gateway::{
    check_range, BackendError, EncryptedInput, EncryptionBackend, EncryptionGateway,
    GatewayError, SchemeConfig, SchemeContext, SchemeInstance,
};
pub use ledger::{FinalityStatus, LedgerError, LedgerReader, LedgerWriter, PendingTx, RoundRecord};
pub use pipeline::{
    AttemptState, Confirmation, PipelineSettings, Reconciliation, StatusEvent, SubmissionPipeline,
};
pub use registry::{RegistryError, RoundRegistry};
pub use rpc::{LotteryRpcClient, RpcError};
pub use settlement::{SettlementError, SettlementReconciler};
pub use tickets::{TicketLedgerView, TicketViewError};
