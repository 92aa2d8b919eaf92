use alloy::primitives::{Address, Bytes, U256};
use std::collections::HashMap;
use std::future::Future;

use super::ledger::LedgerError;
use super::{CiphertextHandle, TxReceipt};

/// Callback through which the decryption machinery commits its result.
///
/// Receives the ABI-encoded cleartext values and the decryption proof, submits
/// them on-chain and resolves once the transaction is final.
pub trait ProofSubmitter: Send + Sync {
    fn submit(
        &self,
        clear_values: Bytes,
        proof: Bytes,
    ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send;
}

/// Outcome of a decryption whose proof was accepted on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionResult {
    pub clear_values: HashMap<CiphertextHandle, u32>,
    pub receipt: TxReceipt,
}

/// Port for off-chain decryption with an on-chain verifiable proof.
///
/// Implementations:
/// - `MockFheRuntime` (in-process stand-in, for tests and the demo)
pub trait DecryptionPort: Send + Sync {
    /// Decrypt `handles` for the contract at `verifier` and hand the result plus
    /// proof to `submitter`. Ledger errors raised by the submitter (notably
    /// `AlreadyVerified`) come back as [`DecryptionError::Submission`].
    ///
    /// May suspend for tens of seconds: off-chain decryption, then on-chain
    /// confirmation.
    fn verify_decryption<S: ProofSubmitter>(
        &self,
        handles: &[CiphertextHandle],
        verifier: Address,
        submitter: &S,
    ) -> impl Future<Output = Result<DecryptionResult, DecryptionError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecryptionError {
    #[error("decryption service not initialized for this session")]
    Unavailable,

    #[error("no ciphertext behind handle {0}")]
    UnknownHandle(CiphertextHandle),

    #[error("decryption failed: {0}")]
    Failed(String),

    #[error("proof submission failed: {0}")]
    Submission(#[from] LedgerError),
}

impl DecryptionError {
    /// True when the ledger reported that another submission already won.
    pub fn is_already_verified(&self) -> bool {
        matches!(self, Self::Submission(LedgerError::AlreadyVerified(_)))
    }
}

/// ABI-encode cleartext values as consecutive 32-byte big-endian words.
pub fn encode_clear_values(values: &[u32]) -> Bytes {
    let mut out = Vec::with_capacity(values.len() * 32);
    for value in values {
        out.extend_from_slice(&U256::from(*value).to_be_bytes::<32>());
    }
    Bytes::from(out)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClearValueError {
    #[error("encoded length {0} is not a multiple of 32")]
    Length(usize),

    #[error("word {index} does not fit in 32 bits")]
    Overflow { index: usize },
}

/// Inverse of [`encode_clear_values`].
pub fn decode_clear_values(encoded: &[u8]) -> Result<Vec<u32>, ClearValueError> {
    if encoded.len() % 32 != 0 {
        return Err(ClearValueError::Length(encoded.len()));
    }
    encoded
        .chunks_exact(32)
        .enumerate()
        .map(|(index, word)| {
            let value = U256::from_be_slice(word);
            if value > U256::from(u32::MAX) {
                return Err(ClearValueError::Overflow { index });
            }
            Ok(value.to::<u32>())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_one_word_per_value() {
        let encoded = encode_clear_values(&[42, 7]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[31], 42);
        assert_eq!(encoded[63], 7);
        assert_eq!(decode_clear_values(&encoded).unwrap(), vec![42, 7]);
    }

    #[test]
    fn rejects_truncated_input() {
        assert_eq!(
            decode_clear_values(&[0u8; 33]),
            Err(ClearValueError::Length(33))
        );
    }

    #[test]
    fn rejects_wide_words() {
        let mut word = [0u8; 32];
        word[27] = 1; // 2^32
        assert_eq!(
            decode_clear_values(&word),
            Err(ClearValueError::Overflow { index: 0 })
        );
    }

    #[test]
    fn already_verified_is_detected_structurally() {
        let err = DecryptionError::from(LedgerError::AlreadyVerified("asset-1".into()));
        assert!(err.is_already_verified());
        assert!(!DecryptionError::Unavailable.is_already_verified());
        assert!(!DecryptionError::from(LedgerError::Rejected("declined".into()))
            .is_already_verified());
    }
}
