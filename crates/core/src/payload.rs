use alloy_primitives::{Bytes, B256};

/// Ciphertext handle plus input proof for one encrypted value.
///
/// The proof is bound to a single (contract, submitter, context) triple, so a
/// payload is consumed by exactly one submission and deliberately not `Clone`.
#[derive(Debug, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Reference to the ciphertext registered with the scheme context
    pub handle: B256,
    /// Input proof attesting the ciphertext is well-formed and bound
    pub proof: Bytes,
}

impl EncryptedPayload {
    pub fn into_parts(self) -> (B256, Bytes) {
        (self.handle, self.proof)
    }
}
