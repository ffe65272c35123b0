use alloy_sol_types::sol;

// Hand-written from the deployed FHELottery ABI. Encrypted inputs are
// `externalEuint32` in Solidity, which is `bytes32` at the ABI level.

sol! {
    /// FHELottery interface
    #[derive(Debug)]
    interface IFHELottery {
        /// Buy a ticket carrying an encrypted number
        function buyTicket(
            uint256 roundId,
            bytes32 encryptedNumber,
            bytes calldata inputProof
        ) external;

        /// Number of rounds created so far
        function roundsCount() external view returns (uint256);

        /// Round metadata
        function getRound(uint256 roundId) external view returns (
            string memory name,
            uint32 winningNumber,
            uint256 drawTime,
            bool drawn,
            uint256 ticketCount,
            uint256 winnerCount
        );

        /// Ticket indices owned by `user` in a round
        function getUserTickets(uint256 roundId, address user) external view returns (uint256[] memory);

        /// Whether `user` holds a winning ticket in a drawn round
        function isWinner(uint256 roundId, address user) external view returns (bool);

        /// Winning addresses of a drawn round
        function getWinners(uint256 roundId) external view returns (address[] memory);
    }
}
