use alloy_primitives::Address;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid address: {0}")]
    Invalid(String),

    #[error("Address must not be zero")]
    Zero,
}

/// Parse a 20-byte hex address regardless of letter case.
///
/// Wallets and config files hand us lowercase, uppercase and EIP-55 mixed-case
/// forms interchangeably; all of them resolve to the same [`Address`].
pub fn canonicalize(input: &str) -> Result<Address, AddressError> {
    let trimmed = input.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex.len() != 40 {
        return Err(AddressError::Invalid(input.to_string()));
    }

    hex.parse::<Address>()
        .map_err(|_| AddressError::Invalid(input.to_string()))
}

/// Same as [`canonicalize`] but rejects the zero address
pub fn canonicalize_nonzero(input: &str) -> Result<Address, AddressError> {
    let address = canonicalize(input)?;
    if address.is_zero() {
        return Err(AddressError::Zero);
    }
    Ok(address)
}

/// EIP-55 checksummed rendering used for every binding operation
pub fn checksummed(address: &Address) -> String {
    address.to_checksum(None)
}

/// Canonicalize and render in checksummed form in one step
pub fn checksum_normalize(input: &str) -> Result<String, AddressError> {
    canonicalize(input).map(|address| checksummed(&address))
}
