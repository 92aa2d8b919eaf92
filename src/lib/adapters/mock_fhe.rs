use alloy::primitives::{keccak256, Address, Bytes, B256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::ports::decryption::{
    encode_clear_values, DecryptionError, DecryptionPort, DecryptionResult, ProofSubmitter,
};
use crate::ports::encryption::{EncryptionError, EncryptionPort};
use crate::ports::{CiphertextHandle, EncryptedInput};

/// In-process stand-in for the homomorphic encryption runtime.
///
/// Handles are keccak digests and plaintexts are kept in a shared table, so
/// the same runtime can both encrypt and decrypt. Clones share state: hand one
/// clone to the coordinator as `EncryptionPort` and another as
/// `DecryptionPort`. In production this would be replaced by the relayer SDK
/// of the homomorphic scheme.
#[derive(Clone)]
pub struct MockFheRuntime {
    inner: Arc<Runtime>,
}

struct Runtime {
    initialized: AtomicBool,
    nonce: AtomicU64,
    plaintexts: Mutex<HashMap<CiphertextHandle, u32>>,
    fail_encrypt: Mutex<Option<String>>,
    fail_decrypt: Mutex<Option<String>>,
}

impl MockFheRuntime {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Runtime {
                initialized: AtomicBool::new(true),
                nonce: AtomicU64::new(0),
                plaintexts: Mutex::new(HashMap::new()),
                fail_encrypt: Mutex::new(None),
                fail_decrypt: Mutex::new(None),
            }),
        }
    }

    /// A runtime whose session was never initialized.
    pub fn uninitialized() -> Self {
        let runtime = Self::new();
        runtime.set_initialized(false);
        runtime
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.inner.initialized.store(initialized, Ordering::SeqCst);
    }

    fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// The next encryption fails with `reason`.
    pub async fn fail_next_encrypt(&self, reason: &str) {
        *self.inner.fail_encrypt.lock().await = Some(reason.to_string());
    }

    /// The next decryption fails with `reason` before anything is submitted.
    pub async fn fail_next_decrypt(&self, reason: &str) {
        *self.inner.fail_decrypt.lock().await = Some(reason.to_string());
    }

    /// Number of ciphertexts produced so far.
    pub async fn ciphertext_count(&self) -> usize {
        self.inner.plaintexts.lock().await.len()
    }
}

impl Default for MockFheRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Input proof binding a handle to its verifier and authorized account.
pub fn input_proof(handle: CiphertextHandle, verifier: Address, authorized: Address) -> Bytes {
    let mut preimage = handle.0.to_vec();
    preimage.extend_from_slice(verifier.as_slice());
    preimage.extend_from_slice(authorized.as_slice());
    Bytes::from(keccak256(preimage).to_vec())
}

/// Decryption proof binding a set of handles to their encoded cleartexts.
pub fn decryption_proof(handles: &[CiphertextHandle], clear_values: &[u8]) -> Bytes {
    let mut preimage = Vec::with_capacity(handles.len() * 32 + clear_values.len());
    for handle in handles {
        preimage.extend_from_slice(handle.0.as_slice());
    }
    preimage.extend_from_slice(clear_values);
    Bytes::from(keccak256(preimage).to_vec())
}

impl EncryptionPort for MockFheRuntime {
    async fn encrypt(
        &self,
        verifier: Address,
        authorized: Address,
        value: u32,
    ) -> Result<EncryptedInput, EncryptionError> {
        if !self.is_initialized() {
            return Err(EncryptionError::Unavailable);
        }
        if let Some(reason) = self.inner.fail_encrypt.lock().await.take() {
            return Err(EncryptionError::Failed(reason));
        }

        let nonce = self.inner.nonce.fetch_add(1, Ordering::SeqCst);
        let mut preimage = Vec::with_capacity(20 + 20 + 4 + 8);
        preimage.extend_from_slice(verifier.as_slice());
        preimage.extend_from_slice(authorized.as_slice());
        preimage.extend_from_slice(&value.to_be_bytes());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let handle = CiphertextHandle(B256::from(keccak256(preimage)));

        self.inner.plaintexts.lock().await.insert(handle, value);

        Ok(EncryptedInput {
            handle,
            proof: input_proof(handle, verifier, authorized),
        })
    }
}

impl DecryptionPort for MockFheRuntime {
    async fn verify_decryption<S: ProofSubmitter>(
        &self,
        handles: &[CiphertextHandle],
        _verifier: Address,
        submitter: &S,
    ) -> Result<DecryptionResult, DecryptionError> {
        if !self.is_initialized() {
            return Err(DecryptionError::Unavailable);
        }
        if let Some(reason) = self.inner.fail_decrypt.lock().await.take() {
            return Err(DecryptionError::Failed(reason));
        }

        let values = {
            let plaintexts = self.inner.plaintexts.lock().await;
            handles
                .iter()
                .map(|handle| {
                    plaintexts
                        .get(handle)
                        .copied()
                        .ok_or(DecryptionError::UnknownHandle(*handle))
                })
                .collect::<Result<Vec<u32>, _>>()?
        };

        let encoded = encode_clear_values(&values);
        let proof = decryption_proof(handles, &encoded);
        let receipt = submitter.submit(encoded, proof).await?;

        Ok(DecryptionResult {
            clear_values: handles.iter().copied().zip(values).collect(),
            receipt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ledger::LedgerError;
    use crate::ports::TxReceipt;
    use std::sync::Mutex as StdMutex;

    /// Records what it was asked to submit.
    #[derive(Default)]
    struct RecordingSubmitter {
        calls: StdMutex<Vec<(Bytes, Bytes)>>,
        fail_with: Option<LedgerError>,
    }

    impl ProofSubmitter for RecordingSubmitter {
        async fn submit(&self, clear_values: Bytes, proof: Bytes) -> Result<TxReceipt, LedgerError> {
            self.calls.lock().unwrap().push((clear_values, proof));
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(TxReceipt {
                tx_hash: B256::repeat_byte(0x01),
                block_number: 1,
                success: true,
            })
        }
    }

    #[tokio::test]
    async fn encrypt_then_decrypt() {
        let fhe = MockFheRuntime::new();
        let verifier = Address::repeat_byte(0xCA);
        let input = fhe
            .encrypt(verifier, Address::repeat_byte(0xA1), 42)
            .await
            .unwrap();

        let submitter = RecordingSubmitter::default();
        let result = fhe
            .verify_decryption(&[input.handle], verifier, &submitter)
            .await
            .unwrap();

        assert_eq!(result.clear_values.get(&input.handle), Some(&42));
        let calls = submitter.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, encode_clear_values(&[42]));
        assert_eq!(calls[0].1, decryption_proof(&[input.handle], &calls[0].0));
    }

    #[tokio::test]
    async fn equal_plaintexts_get_distinct_handles() {
        let fhe = MockFheRuntime::new();
        let a = fhe.encrypt(Address::ZERO, Address::ZERO, 7).await.unwrap();
        let b = fhe.encrypt(Address::ZERO, Address::ZERO, 7).await.unwrap();
        assert_ne!(a.handle, b.handle);
        assert_eq!(fhe.ciphertext_count().await, 2);
    }

    #[tokio::test]
    async fn uninitialized_runtime_is_unavailable() {
        let fhe = MockFheRuntime::uninitialized();
        assert_eq!(
            fhe.encrypt(Address::ZERO, Address::ZERO, 1).await,
            Err(EncryptionError::Unavailable)
        );

        let submitter = RecordingSubmitter::default();
        let result = fhe
            .verify_decryption(&[CiphertextHandle::default()], Address::ZERO, &submitter)
            .await;
        assert_eq!(result, Err(DecryptionError::Unavailable));
        assert!(submitter.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let fhe = MockFheRuntime::new();
        fhe.fail_next_encrypt("keygen aborted").await;
        assert_eq!(
            fhe.encrypt(Address::ZERO, Address::ZERO, 3).await,
            Err(EncryptionError::Failed("keygen aborted".into()))
        );
        let input = fhe.encrypt(Address::ZERO, Address::ZERO, 3).await.unwrap();

        fhe.fail_next_decrypt("relayer timeout").await;
        let submitter = RecordingSubmitter::default();
        assert_eq!(
            fhe.verify_decryption(&[input.handle], Address::ZERO, &submitter)
                .await,
            Err(DecryptionError::Failed("relayer timeout".into()))
        );
        assert!(submitter.calls.lock().unwrap().is_empty());

        let result = fhe
            .verify_decryption(&[input.handle], Address::ZERO, &submitter)
            .await
            .unwrap();
        assert_eq!(result.clear_values.get(&input.handle), Some(&3));
    }

    #[tokio::test]
    async fn unknown_handle_never_reaches_submitter() {
        let fhe = MockFheRuntime::new();
        let submitter = RecordingSubmitter::default();
        let handle = CiphertextHandle(B256::repeat_byte(0x77));

        let result = fhe.verify_decryption(&[handle], Address::ZERO, &submitter).await;
        assert_eq!(result, Err(DecryptionError::UnknownHandle(handle)));
        assert!(submitter.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn submitter_errors_propagate() {
        let fhe = MockFheRuntime::new();
        let input = fhe.encrypt(Address::ZERO, Address::ZERO, 5).await.unwrap();
        let submitter = RecordingSubmitter {
            fail_with: Some(LedgerError::AlreadyVerified("asset-1".into())),
            ..Default::default()
        };

        let err = fhe
            .verify_decryption(&[input.handle], Address::ZERO, &submitter)
            .await
            .unwrap_err();
        assert!(err.is_already_verified());
    }
}
