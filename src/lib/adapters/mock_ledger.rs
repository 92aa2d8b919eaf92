use alloy::primitives::{keccak256, Address, Bytes, B256};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::mock_fhe::{decryption_proof, input_proof};
use crate::domain::record::RecordId;
use crate::ports::decryption::decode_clear_values;
use crate::ports::ledger::{LedgerError, LedgerPort};
use crate::ports::{CiphertextHandle, CreateRequest, LedgerRecord, PendingTx, TxKind, TxReceipt};

/// Timestamp of block 1.
const GENESIS_TIME: u64 = 1_700_000_000;

/// In-memory registry with staged finality.
///
/// Submitted transactions sit in a pending pool until `wait_for_finality`
/// applies them, so reads never see unfinalized writes. Proofs are checked
/// against the `MockFheRuntime` construction. Verification submission and
/// finality each yield to the scheduler once, so concurrent verifications of
/// one record interleave the way they would against a real node. A handful
/// of switches inject faults for tests and the demo.
pub struct MockLedger {
    registry: Address,
    /// `msg.sender` for every submitted transaction.
    sender: Address,
    state: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    order: Vec<RecordId>,
    records: HashMap<RecordId, LedgerRecord>,
    pending: HashMap<B256, Staged>,
    block: u64,
    nonce: u64,
    submissions: usize,
    committed_verifications: usize,
    unavailable: bool,
    reject_create: Option<String>,
    reject_verify: Option<String>,
    preempt_verify: bool,
    /// Fetches still allowed to succeed before `get_record` starts failing.
    failing_fetches: HashMap<RecordId, usize>,
}

enum Staged {
    Create(CreateRequest),
    Verify { id: RecordId, value: u32 },
}

impl LedgerState {
    fn next_tx_hash(&mut self, payload: &[u8]) -> B256 {
        self.nonce += 1;
        let mut preimage = self.nonce.to_be_bytes().to_vec();
        preimage.extend_from_slice(payload);
        keccak256(preimage)
    }

    fn mine(&mut self) -> u64 {
        self.block += 1;
        self.block
    }

    fn commit_verification(&mut self, id: &RecordId, value: u32) -> Result<(), LedgerError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| LedgerError::RecordNotFound(id.clone()))?;
        if record.verified {
            return Err(LedgerError::AlreadyVerified(id.clone()));
        }
        record.verified = true;
        record.clear_value = value;
        self.committed_verifications += 1;
        Ok(())
    }
}

impl MockLedger {
    pub fn new(registry: Address, sender: Address) -> Self {
        Self {
            registry,
            sender,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Number of transactions submitted so far (accepted into the pool).
    pub async fn submission_count(&self) -> usize {
        self.state.lock().await.submissions
    }

    /// Number of cleartexts committed on-chain.
    pub async fn committed_verifications(&self) -> usize {
        self.state.lock().await.committed_verifications
    }

    /// Number of submitted transactions not yet final.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn set_available(&self, available: bool) {
        self.state.lock().await.unavailable = !available;
    }

    /// The next creation is declined by the signer.
    pub async fn reject_next_create(&self, reason: &str) {
        self.state.lock().await.reject_create = Some(reason.to_string());
    }

    /// The next verification is declined by the signer.
    pub async fn reject_next_verify(&self, reason: &str) {
        self.state.lock().await.reject_verify = Some(reason.to_string());
    }

    /// The next verification loses a race: another party commits the same
    /// cleartext just before it, so it fails with `AlreadyVerified`.
    pub async fn preempt_next_verify(&self) {
        self.state.lock().await.preempt_verify = true;
    }

    /// Make `get_record` fail for `id` until cleared.
    pub async fn fail_fetch(&self, id: &RecordId) {
        self.fail_fetch_after(id, 0).await;
    }

    /// Let `successes` more fetches of `id` through, then fail until cleared.
    pub async fn fail_fetch_after(&self, id: &RecordId, successes: usize) {
        self.state
            .lock()
            .await
            .failing_fetches
            .insert(id.clone(), successes);
    }

    pub async fn clear_fetch_failures(&self) {
        self.state.lock().await.failing_fetches.clear();
    }

    /// Commit a cleartext directly, as if another party had verified `id`.
    pub async fn mark_verified(&self, id: &RecordId, value: u32) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        state.mine();
        state.commit_verification(id, value)
    }

    /// Insert a finalized record with raw codes, bypassing proof checks.
    pub async fn insert_raw(&self, id: RecordId, record: LedgerRecord) {
        let mut state = self.state.lock().await;
        if state.records.insert(id.clone(), record).is_none() {
            state.order.push(id);
        }
    }
}

impl LedgerPort for MockLedger {
    fn verifier_address(&self) -> Address {
        self.registry
    }

    async fn list_record_ids(&self) -> Result<Vec<RecordId>, LedgerError> {
        let state = self.state.lock().await;
        if state.unavailable {
            return Err(LedgerError::Rpc("registry unavailable".into()));
        }
        Ok(state.order.clone())
    }

    async fn get_record(&self, id: &RecordId) -> Result<LedgerRecord, LedgerError> {
        let mut state = self.state.lock().await;
        if let Some(remaining) = state.failing_fetches.get_mut(id) {
            if *remaining == 0 {
                return Err(LedgerError::Rpc(format!("injected fetch failure for {id}")));
            }
            *remaining -= 1;
        }
        state
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::RecordNotFound(id.clone()))
    }

    async fn get_ciphertext_handle(&self, id: &RecordId) -> Result<CiphertextHandle, LedgerError> {
        self.state
            .lock()
            .await
            .records
            .get(id)
            .map(|r| r.ciphertext_handle)
            .ok_or_else(|| LedgerError::RecordNotFound(id.clone()))
    }

    async fn submit_create(&self, request: &CreateRequest) -> Result<PendingTx, LedgerError> {
        let mut state = self.state.lock().await;
        if let Some(reason) = state.reject_create.take() {
            return Err(LedgerError::Rejected(reason));
        }
        if state.records.contains_key(&request.id) {
            return Err(LedgerError::DuplicateRecord(request.id.clone()));
        }
        if request.proof != input_proof(request.ciphertext, self.registry, self.sender) {
            return Err(LedgerError::Rejected("invalid input proof".into()));
        }

        let tx_hash = state.next_tx_hash(request.id.as_str().as_bytes());
        state.pending.insert(tx_hash, Staged::Create(request.clone()));
        state.submissions += 1;
        Ok(PendingTx {
            tx_hash,
            kind: TxKind::Create(request.id.clone()),
        })
    }

    async fn submit_verify(
        &self,
        id: &RecordId,
        clear_values: &Bytes,
        proof: &Bytes,
    ) -> Result<PendingTx, LedgerError> {
        // Suspend like a real broadcast would
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        if let Some(reason) = state.reject_verify.take() {
            return Err(LedgerError::Rejected(reason));
        }
        let record = state
            .records
            .get(id)
            .ok_or_else(|| LedgerError::RecordNotFound(id.clone()))?;
        if record.verified {
            return Err(LedgerError::AlreadyVerified(id.clone()));
        }
        if *proof != decryption_proof(&[record.ciphertext_handle], clear_values) {
            return Err(LedgerError::Rejected("invalid decryption proof".into()));
        }
        let value = decode_clear_values(clear_values)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?
            .first()
            .copied()
            .ok_or_else(|| LedgerError::Rejected("no clear value".into()))?;

        if std::mem::take(&mut state.preempt_verify) {
            state.mine();
            state.commit_verification(id, value)?;
            return Err(LedgerError::AlreadyVerified(id.clone()));
        }

        let tx_hash = state.next_tx_hash(proof);
        state.pending.insert(
            tx_hash,
            Staged::Verify {
                id: id.clone(),
                value,
            },
        );
        state.submissions += 1;
        Ok(PendingTx {
            tx_hash,
            kind: TxKind::Verify(id.clone()),
        })
    }

    async fn wait_for_finality(&self, tx: &PendingTx) -> Result<TxReceipt, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        let staged = state
            .pending
            .remove(&tx.tx_hash)
            .ok_or(LedgerError::UnknownTransaction(tx.tx_hash))?;
        let block_number = state.mine();

        match staged {
            Staged::Create(request) => {
                if state.records.contains_key(&request.id) {
                    return Ok(TxReceipt {
                        tx_hash: tx.tx_hash,
                        block_number,
                        success: false,
                    });
                }
                let record = LedgerRecord {
                    name: request.name,
                    ciphertext_handle: request.ciphertext,
                    category_code: request.category_code,
                    status_code: request.status_code,
                    created_at: GENESIS_TIME + block_number * 12,
                    creator: self.sender,
                    verified: false,
                    clear_value: 0,
                };
                state.records.insert(request.id.clone(), record);
                state.order.push(request.id);
            }
            // Reverts with AlreadyVerified if another verify finalized first
            Staged::Verify { id, value } => state.commit_verification(&id, value)?,
        }

        Ok(TxReceipt {
            tx_hash: tx.tx_hash,
            block_number,
            success: true,
        })
    }

    async fn probe_availability(&self) -> Result<bool, LedgerError> {
        Ok(!self.state.lock().await.unavailable)
    }
}
