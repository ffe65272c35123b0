//! JSON-RPC ledger client
//!
//! Talks to an Ethereum node (or a wallet-backed RPC endpoint) over HTTP and
//! implements both ledger collaborators for the lottery contract.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use arena_contracts::{IFHELottery, LotteryDeployment};
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::ledger::{FinalityStatus, LedgerError, LedgerReader, LedgerWriter, PendingTx, RoundRecord};

/// EIP-1193 "user rejected request"
const USER_REJECTED_CODE: i64 = 4001;

/// Geth's code for `execution reverted` on eth_call / eth_estimateGas
const EXECUTION_REVERTED_CODE: i64 = 3;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Parse failed: {0}")]
    ParseFailed(String),

    #[error("No lottery deployment known for chain {0}")]
    UnsupportedChain(u64),
}

impl From<RpcError> for LedgerError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Rpc { code, message }
                if code == USER_REJECTED_CODE
                    || message.to_lowercase().contains("user rejected")
                    || message.to_lowercase().contains("user denied") =>
            {
                LedgerError::Rejected(message)
            }
            RpcError::Rpc { code, message }
                if code == EXECUTION_REVERTED_CODE || message.contains("execution reverted") =>
            {
                LedgerError::Reverted(message)
            }
            RpcError::ParseFailed(msg) => LedgerError::Decode(msg),
            other => LedgerError::Transport(other.to_string()),
        }
    }
}

/// JSON-RPC client bound to one lottery contract
pub struct LotteryRpcClient {
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Lottery contract address
    pub contract: Address,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl LotteryRpcClient {
    /// Create a client for an explicit contract address
    pub fn new(rpc_url: impl Into<String>, contract: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract,
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a client for the known deployment on `chain_id`
    pub fn for_chain(rpc_url: impl Into<String>, chain_id: u64) -> Result<Self, RpcError> {
        let deployment =
            LotteryDeployment::for_chain(chain_id).ok_or(RpcError::UnsupportedChain(chain_id))?;
        Ok(Self::new(rpc_url, deployment.lottery))
    }

    /// Chain id reported by the node via eth_chainId
    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let result = self.request("eth_chainId", json!([])).await?;
        parse_hex_u64(&result)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if let Some(error) = json.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(RpcError::Rpc { code, message });
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| RpcError::Transport("No result in response".into()))
    }

    /// eth_call against the lottery contract, decoded through the call's ABI
    async fn call<C: SolCall>(&self, call: C) -> Result<C::Return, LedgerError> {
        let tx = json!({
            "to": format!("{:?}", self.contract),
            "data": Bytes::from(call.abi_encode()),
        });

        let result = self.request("eth_call", json!([tx, "latest"])).await?;
        let data: Bytes = serde_json::from_value(result)
            .map_err(|e| LedgerError::Decode(format!("{}: {}", C::SIGNATURE, e)))?;

        tracing::debug!("eth_call {} returned {} bytes", C::SIGNATURE, data.len());

        C::abi_decode_returns(&data)
            .map_err(|e| LedgerError::Decode(format!("{}: {}", C::SIGNATURE, e)))
    }
}

#[async_trait]
impl LedgerReader for LotteryRpcClient {
    async fn rounds_count(&self) -> Result<u64, LedgerError> {
        let count = self.call(IFHELottery::roundsCountCall {}).await?;
        u256_to_u64(count, "roundsCount")
    }

    async fn get_round(&self, round_id: u64) -> Result<RoundRecord, LedgerError> {
        let round = self
            .call(IFHELottery::getRoundCall {
                roundId: U256::from(round_id),
            })
            .await?;

        Ok(RoundRecord {
            name: round.name,
            winning_number: round.winningNumber,
            draw_time: u256_to_u64(round.drawTime, "drawTime")?,
            drawn: round.drawn,
            ticket_count: u256_to_u64(round.ticketCount, "ticketCount")?,
            winner_count: u256_to_u64(round.winnerCount, "winnerCount")?,
        })
    }

    async fn get_user_tickets(
        &self,
        round_id: u64,
        user: Address,
    ) -> Result<Vec<u64>, LedgerError> {
        let indices = self
            .call(IFHELottery::getUserTicketsCall {
                roundId: U256::from(round_id),
                user,
            })
            .await?;

        indices
            .into_iter()
            .map(|index| u256_to_u64(index, "ticket index"))
            .collect()
    }

    async fn is_winner(&self, round_id: u64, user: Address) -> Result<bool, LedgerError> {
        self.call(IFHELottery::isWinnerCall {
            roundId: U256::from(round_id),
            user,
        })
        .await
    }

    async fn get_winners(&self, round_id: u64) -> Result<Vec<Address>, LedgerError> {
        self.call(IFHELottery::getWinnersCall {
            roundId: U256::from(round_id),
        })
        .await
    }
}

#[async_trait]
impl LedgerWriter for LotteryRpcClient {
    async fn write(
        &self,
        from: Address,
        contract: Address,
        calldata: Bytes,
    ) -> Result<PendingTx, LedgerError> {
        let tx = json!({
            "from": format!("{:?}", from),
            "to": format!("{:?}", contract),
            "data": calldata,
        });

        let result = self.request("eth_sendTransaction", json!([tx])).await?;
        let hash: B256 = serde_json::from_value(result)
            .map_err(|e| LedgerError::Decode(format!("transaction hash: {}", e)))?;

        tracing::info!("Transaction {} accepted into pending pool", hash);

        Ok(PendingTx { hash, contract })
    }

    async fn finality(&self, pending: &PendingTx) -> Result<FinalityStatus, LedgerError> {
        let receipt = self
            .request(
                "eth_getTransactionReceipt",
                json!([format!("{:?}", pending.hash)]),
            )
            .await?;

        if receipt.is_null() {
            return Ok(FinalityStatus::Pending);
        }

        let block_number = receipt
            .get("blockNumber")
            .filter(|v| !v.is_null())
            .map(parse_hex_u64)
            .transpose()?;

        match (receipt.get("status").and_then(Value::as_str), block_number) {
            (Some("0x1"), Some(block_number)) => Ok(FinalityStatus::Success { block_number }),
            // A receipt without a block is still pending on some providers
            (Some("0x1"), None) => Ok(FinalityStatus::Pending),
            (Some("0x0"), _) => Ok(FinalityStatus::Failed {
                reason: "transaction reverted".into(),
            }),
            (status, _) => Err(LedgerError::Decode(format!(
                "unexpected receipt status: {:?}",
                status
            ))),
        }
    }
}

fn u256_to_u64(value: U256, field: &str) -> Result<u64, LedgerError> {
    value
        .try_into()
        .map_err(|_| LedgerError::Decode(format!("{} does not fit in u64: {}", field, value)))
}

fn parse_hex_u64(value: &Value) -> Result<u64, RpcError> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::ParseFailed(format!("expected hex string, got {}", value)))?;

    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::ParseFailed(format!("Invalid quantity {}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_client_for_chain() {
        let client = LotteryRpcClient::for_chain("https://rpc.sepolia.org", 11_155_111);
        assert!(client.is_ok());

        let client = LotteryRpcClient::for_chain("https://example.com", 99999);
        assert!(matches!(client, Err(RpcError::UnsupportedChain(99999))));
    }

    #[test]
    fn test_rpc_error_mapping() {
        let rejected: LedgerError = RpcError::Rpc {
            code: 4001,
            message: "User rejected the request.".into(),
        }
        .into();
        assert!(matches!(rejected, LedgerError::Rejected(_)));

        let denied: LedgerError = RpcError::Rpc {
            code: -32603,
            message: "MetaMask Tx Signature: User denied transaction signature.".into(),
        }
        .into();
        assert!(matches!(denied, LedgerError::Rejected(_)));

        let reverted: LedgerError = RpcError::Rpc {
            code: 3,
            message: "execution reverted: round closed".into(),
        }
        .into();
        assert!(matches!(reverted, LedgerError::Reverted(_)));

        let transport: LedgerError = RpcError::Transport("connection refused".into()).into();
        assert!(matches!(transport, LedgerError::Transport(_)));
    }

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64(&json!("0x1a")).unwrap(), 26);
        assert_eq!(parse_hex_u64(&json!("0x0")).unwrap(), 0);
        assert!(parse_hex_u64(&json!(12)).is_err());
        assert!(parse_hex_u64(&json!("0xzz")).is_err());
    }
}
