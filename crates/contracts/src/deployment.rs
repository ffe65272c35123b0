use alloy_primitives::{address, Address};

/// Sepolia chain id
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Lottery deployment on a given chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LotteryDeployment {
    /// Chain ID
    pub chain_id: u64,
    /// FHELottery contract address
    pub lottery: Address,
}

impl LotteryDeployment {
    /// Sepolia testnet deployment
    pub fn sepolia() -> Self {
        Self {
            chain_id: SEPOLIA_CHAIN_ID,
            lottery: address!("0xeA9ac7b02551ae9C81E4E7070E2a2C4c17a9A487"),
        }
    }

    /// Get the deployment for a chain ID
    pub fn for_chain(chain_id: u64) -> Option<Self> {
        match chain_id {
            SEPOLIA_CHAIN_ID => Some(Self::sepolia()),
            _ => None,
        }
    }
}
