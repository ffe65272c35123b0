//! Encryption gateway
//!
//! Owns the scheme context for one network and turns a plaintext `u32` into an
//! (handle, input proof) pair bound to a contract and a submitter.
//!
//! ```text
//! ensure_context ──► OnceCell ──(first caller only)──► backend.init()
//!                       │                               backend.create_instance()
//!                       ▼
//!                 SchemeContext (shared, read-only)
//!                       │
//! encrypt_bounded_u32 ──┴──► instance.encrypt_u32(checksum(contract), checksum(user), v)
//! ```
//!
//! The scheme math lives behind [`EncryptionBackend`]; this module only enforces
//! the contract around it.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{address, Address, Bytes, B256};
use arena_core::{checksum_normalize, AddressError, EncryptedPayload, ENCRYPTED_U32_MAX};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("SDK initialization failed: {0}")]
    Init(String),

    #[error("Instance creation failed: {0}")]
    Instance(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Value {value} out of range for uint32 encryption")]
    Range { value: u64 },

    #[error("Address binding failed: {0}")]
    Address(#[from] AddressError),

    #[error("Encryption backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Encryption did not return any handles")]
    NoHandles,

    #[error("Encryption returned {0} handles for a single value")]
    UnexpectedHandles(usize),

    #[error("Handle must be 32 bytes, got {0}")]
    MalformedHandle(usize),

    #[error("Encryption did not return an input proof")]
    EmptyProof,
}

/// Public parameters of the encryption network
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemeConfig {
    /// Chain the encrypted inputs are consumed on
    pub chain_id: u64,
    /// Chain id of the decryption/verification gateway
    pub gateway_chain_id: u64,
    /// Relayer endpoint that registers ciphertexts and issues input proofs
    pub relayer_url: String,
    /// Optional RPC endpoint of the host chain
    pub network_url: Option<String>,
    pub acl_contract: Address,
    pub kms_contract: Address,
    pub input_verifier_contract: Address,
    pub decryption_verifier: Address,
    pub input_verification_verifier: Address,
}

impl SchemeConfig {
    /// Sepolia testnet parameters
    pub fn sepolia() -> Self {
        Self {
            chain_id: 11_155_111,
            gateway_chain_id: 55_815,
            relayer_url: "https://relayer.testnet.zama.cloud".into(),
            network_url: None,
            acl_contract: address!("0x687820221192C5B662b25367F70076A37bc79b6c"),
            kms_contract: address!("0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC"),
            input_verifier_contract: address!("0xbc91f3daD1A5F19F8390c400196e58073B6a0BC4"),
            decryption_verifier: address!("0xb6E160B1ff80D67Bfe90A85eE06Ce0A2613607D1"),
            input_verification_verifier: address!("0x7048C39f048125eDa9d678AEbaDfB22F7900a29F"),
        }
    }
}

/// Raw encryption output before validation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handles: Vec<Vec<u8>>,
    pub input_proof: Vec<u8>,
}

/// Scheme SDK entry points
#[async_trait]
pub trait EncryptionBackend: Send + Sync {
    /// Load scheme parameters (`initSDK`)
    async fn init(&self) -> Result<(), BackendError>;

    /// Build an instance for the given network (`createInstance`)
    async fn create_instance(
        &self,
        config: &SchemeConfig,
    ) -> Result<Arc<dyn SchemeInstance>, BackendError>;
}

/// A bootstrapped scheme instance
#[async_trait]
pub trait SchemeInstance: Send + Sync {
    /// `createEncryptedInput(contract, user).add32(value).encrypt()`
    ///
    /// Both addresses arrive checksum-normalized.
    async fn encrypt_u32(
        &self,
        contract: &str,
        user: &str,
        value: u32,
    ) -> Result<EncryptedInput, BackendError>;
}

/// Cached scheme context, cheap to clone and never mutated after bootstrap
#[derive(Clone)]
pub struct SchemeContext {
    chain_id: u64,
    instance: Arc<dyn SchemeInstance>,
}

impl fmt::Debug for SchemeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeContext")
            .field("chain_id", &self.chain_id)
            .field("instance", &"<scheme instance>")
            .finish()
    }
}

/// Check a value against the scheme's declared integer width
pub fn check_range(value: u64) -> Result<u32, GatewayError> {
    if value > ENCRYPTED_U32_MAX {
        return Err(GatewayError::Range { value });
    }
    Ok(value as u32)
}

pub struct EncryptionGateway {
    backend: Arc<dyn EncryptionBackend>,
    config: SchemeConfig,
    // Swapped wholesale on reset; bootstraps in flight on the old cell finish
    // into a cell nobody reads any more.
    context: RwLock<Arc<OnceCell<SchemeContext>>>,
}

impl EncryptionGateway {
    pub fn new(backend: Arc<dyn EncryptionBackend>, config: SchemeConfig) -> Self {
        Self {
            backend,
            config,
            context: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    /// Return the cached context, bootstrapping it on first use.
    ///
    /// Concurrent callers share a single in-flight bootstrap. A failed
    /// bootstrap is not cached; the next call starts a fresh one.
    pub async fn ensure_context(&self, submitter: Address) -> Result<SchemeContext, GatewayError> {
        let cell = self.context.read().await.clone();

        if let Some(context) = cell.get() {
            return Ok(context.clone());
        }

        let context = cell
            .get_or_try_init(|| self.bootstrap(submitter))
            .await?;

        Ok(context.clone())
    }

    async fn bootstrap(&self, submitter: Address) -> Result<SchemeContext, GatewayError> {
        tracing::info!(
            "Bootstrapping encryption context for chain {} (submitter {})",
            self.config.chain_id,
            submitter
        );

        self.backend.init().await?;
        let instance = self.backend.create_instance(&self.config).await?;

        tracing::info!("Encryption context ready for chain {}", self.config.chain_id);

        Ok(SchemeContext {
            chain_id: self.config.chain_id,
            instance,
        })
    }

    /// Whether a context is cached
    pub async fn is_initialized(&self) -> bool {
        self.context.read().await.initialized()
    }

    /// Drop the cached context (e.g. after a network switch)
    pub async fn reset(&self) {
        *self.context.write().await = Arc::new(OnceCell::new());
        tracing::info!("Encryption context reset");
    }

    /// Encrypt `value` as a 32-bit integer bound to `contract` and `submitter`.
    ///
    /// The range check runs before anything touches the backend. Both
    /// addresses are checksum-normalized before binding.
    pub async fn encrypt_bounded_u32(
        &self,
        context: &SchemeContext,
        value: u64,
        contract: &str,
        submitter: &str,
    ) -> Result<EncryptedPayload, GatewayError> {
        let value = check_range(value)?;
        let contract = checksum_normalize(contract)?;
        let submitter = checksum_normalize(submitter)?;

        tracing::debug!(
            "Encrypting uint32 on chain {} for contract {} / user {}",
            context.chain_id,
            contract,
            submitter
        );

        let input = context
            .instance
            .encrypt_u32(&contract, &submitter, value)
            .await?;

        let payload = payload_from_input(input)?;

        tracing::debug!(
            "Encrypted uint32: handle {}, proof {} bytes",
            payload.handle,
            payload.proof.len()
        );

        Ok(payload)
    }
}

fn payload_from_input(input: EncryptedInput) -> Result<EncryptedPayload, GatewayError> {
    let EncryptedInput {
        mut handles,
        input_proof,
    } = input;

    let handle = match handles.len() {
        0 => return Err(GatewayError::NoHandles),
        1 => handles.remove(0),
        n => return Err(GatewayError::UnexpectedHandles(n)),
    };

    if handle.len() != 32 {
        return Err(GatewayError::MalformedHandle(handle.len()));
    }
    if input_proof.is_empty() {
        return Err(GatewayError::EmptyProof);
    }

    Ok(EncryptedPayload {
        handle: B256::from_slice(&handle),
        proof: Bytes::from(input_proof),
    })
}
