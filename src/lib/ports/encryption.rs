use alloy::primitives::Address;
use std::future::Future;

use super::EncryptedInput;

/// Port for client-side homomorphic encryption.
///
/// Implementations:
/// - `MockFheRuntime` (in-process stand-in, for tests and the demo)
pub trait EncryptionPort: Send + Sync {
    /// Encrypt `value` for the contract at `verifier`, authorizing `authorized`
    /// to use the ciphertext. Returns the external handle and its input proof.
    ///
    /// May suspend for a long external computation.
    fn encrypt(
        &self,
        verifier: Address,
        authorized: Address,
        value: u32,
    ) -> impl Future<Output = Result<EncryptedInput, EncryptionError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncryptionError {
    #[error("encryption service not initialized for this session")]
    Unavailable,

    #[error("encryption failed: {0}")]
    Failed(String),
}
