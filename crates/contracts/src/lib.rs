pub mod bindings;
pub mod deployment;

pub use bindings::IFHELottery;
pub use deployment::{LotteryDeployment, SEPOLIA_CHAIN_ID};

#[cfg(test)]
mod tests {
    use super::IFHELottery::{buyTicketCall, getRoundCall};
    use alloy_primitives::{Bytes, B256, U256};
    use alloy_sol_types::SolCall;

    #[test]
    fn test_buy_ticket_selector_and_layout() {
        assert_eq!(buyTicketCall::SIGNATURE, "buyTicket(uint256,bytes32,bytes)");

        let call = buyTicketCall {
            roundId: U256::from(2),
            encryptedNumber: B256::repeat_byte(0xab),
            inputProof: Bytes::from(vec![1, 2, 3]),
        };
        let encoded = call.abi_encode();

        // selector + roundId + handle + proof offset + proof length + padded proof
        assert_eq!(encoded.len(), 4 + 32 * 5);
        assert_eq!(&encoded[..4], buyTicketCall::SELECTOR.as_slice());
        assert_eq!(&encoded[36..68], B256::repeat_byte(0xab).as_slice());
    }

    #[test]
    fn test_get_round_signature() {
        assert_eq!(getRoundCall::SIGNATURE, "getRound(uint256)");
    }
}
