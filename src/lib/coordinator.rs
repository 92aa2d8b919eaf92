use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{self, RecordCache, ReloadReport};
use crate::domain::record::{
    parse_attribute_value, Category, ParseStatusError, PublicStatus, RecordId, RecordIdGenerator,
};
use crate::domain::session::Session;
use crate::domain::verification::VerificationState;
use crate::ports::decryption::{DecryptionError, DecryptionPort, ProofSubmitter};
use crate::ports::encryption::{EncryptionError, EncryptionPort};
use crate::ports::ledger::{LedgerError, LedgerPort};
use crate::ports::{CreateRequest, TxReceipt, PROTOCOL_TAG};

/// Error type for lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("no connected account")]
    NotConnected,

    #[error("record name must not be empty")]
    EmptyName,

    #[error("invalid status: {0}")]
    InvalidStatus(#[from] ParseStatusError),

    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("decryption error: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("decryption result has no value for the handle of {0}")]
    MissingClearValue(RecordId),

    /// The ledger reported `AlreadyVerified` but its record is not verified.
    #[error("ledger reports {0} as already verified but holds no cleartext")]
    InconsistentLedger(RecordId),

    /// The transaction is final but the follow-up reload failed; the cache is
    /// stale until the next successful reload.
    #[error("{id} committed but cache reload failed: {source}")]
    CommittedButStale {
        id: RecordId,
        #[source]
        source: LedgerError,
    },
}

/// Input for a record creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub name: String,
    pub value: u32,
    pub category: Category,
    pub status: PublicStatus,
}

impl NewRecord {
    /// Build from free-form text fields.
    ///
    /// Non-numeric values coerce to 0 and unknown categories to the fallback
    /// bucket; the status must be a known code or label.
    pub fn from_fields(
        name: &str,
        value: &str,
        category: &str,
        status: &str,
    ) -> Result<Self, CoordinatorError> {
        Ok(Self {
            name: name.to_string(),
            value: parse_attribute_value(value),
            category: Category::from_label(category),
            status: status.parse()?,
        })
    }
}

/// Result of a successful creation.
#[derive(Debug, Clone)]
pub struct CreatedRecord {
    pub id: RecordId,
    pub receipt: TxReceipt,
    pub reload: ReloadReport,
}

/// How a verification reached `Verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationPath {
    /// The ledger already held a cleartext; nothing was submitted.
    AlreadyOnLedger,
    /// This call decrypted and committed the cleartext.
    Decrypted,
    /// Another submission won the race while this one was in flight.
    ConcurrentlyVerified,
}

/// Result of a successful verification.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub id: RecordId,
    pub value: u32,
    pub path: VerificationPath,
    /// Present only when this call committed the cleartext.
    pub receipt: Option<TxReceipt>,
}

/// Orchestrates the confidential-attribute lifecycle.
///
/// Generic over `LedgerPort` (record store), `EncryptionPort` (client-side
/// encryption) and `DecryptionPort` (decryption with proof). Operations take
/// `&self`, so creations and verifications for different records can run as
/// independent tasks against one shared coordinator.
///
/// Every mutation follows the same two steps: commit on the ledger, then
/// reload the cache. The cache never shows a record the ledger has not
/// finalized.
pub struct AssetCoordinator<L: LedgerPort, E: EncryptionPort, D: DecryptionPort> {
    ledger: L,
    encryption: E,
    decryption: D,
    cache: Arc<RecordCache>,
    ids: RecordIdGenerator,
    /// In-flight and failed verifications the ledger knows nothing about.
    verifications: Mutex<HashMap<RecordId, VerificationState>>,
}

impl<L: LedgerPort, E: EncryptionPort, D: DecryptionPort> AssetCoordinator<L, E, D> {
    pub fn new(ledger: L, encryption: E, decryption: D) -> Self {
        Self::with_cache(ledger, encryption, decryption, Arc::new(RecordCache::new()))
    }

    /// Build around an existing cache shared with readers.
    pub fn with_cache(ledger: L, encryption: E, decryption: D, cache: Arc<RecordCache>) -> Self {
        Self {
            ledger,
            encryption,
            decryption,
            cache,
            ids: RecordIdGenerator::new(),
            verifications: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Encrypt the attribute, register the record on-chain, then reload.
    ///
    /// Encryption completes before any ledger write, so a failing encryption
    /// leaves no trace. A rejected or reverted transaction creates nothing and
    /// skips the reload. Not retried; the caller may call again (a new id is
    /// generated each time).
    pub async fn create_record(
        &self,
        session: &Session,
        input: NewRecord,
    ) -> Result<CreatedRecord, CoordinatorError> {
        let account = session.account().ok_or(CoordinatorError::NotConnected)?;
        let name = input.name.trim();
        if name.is_empty() {
            return Err(CoordinatorError::EmptyName);
        }

        let id = self.ids.next_id();
        info!(record = %id, category = %input.category, status = %input.status, "creating record");

        let encrypted = self
            .encryption
            .encrypt(self.ledger.verifier_address(), account, input.value)
            .await?;
        debug!(record = %id, handle = %encrypted.handle, "attribute encrypted");

        let request = CreateRequest {
            id: id.clone(),
            name: name.to_string(),
            ciphertext: encrypted.handle,
            proof: encrypted.proof,
            category_code: input.category.code(),
            status_code: input.status.code(),
            tag: PROTOCOL_TAG.to_string(),
        };
        let pending = self.ledger.submit_create(&request).await?;
        debug!(record = %id, tx = %pending.tx_hash, "creation submitted");

        let receipt = self.ledger.wait_for_finality(&pending).await?;
        if !receipt.success {
            return Err(LedgerError::Reverted(receipt.tx_hash).into());
        }
        info!(record = %id, block = receipt.block_number, "record created");

        let reload = self
            .reload()
            .await
            .map_err(|source| CoordinatorError::CommittedButStale {
                id: id.clone(),
                source,
            })?;

        Ok(CreatedRecord {
            id,
            receipt,
            reload,
        })
    }

    /// Reveal a record's attribute: decrypt off-chain, commit cleartext and
    /// proof on-chain, then reload.
    ///
    /// Idempotent. If the ledger already holds a cleartext, that value is
    /// adopted without any transaction. If another submission wins while this
    /// one is in flight, the committed value is adopted as success.
    pub async fn verify_record(
        &self,
        session: &Session,
        id: &RecordId,
    ) -> Result<VerificationOutcome, CoordinatorError> {
        session.account().ok_or(CoordinatorError::NotConnected)?;

        let on_ledger = self.ledger.get_record(id).await?;
        if on_ledger.verified {
            info!(record = %id, "already verified on ledger");
            let cached = self.transition(id, |s| s.succeed(on_ledger.clear_value)).await;
            if !cached {
                self.reload().await?;
            }
            return Ok(VerificationOutcome {
                id: id.clone(),
                value: on_ledger.clear_value,
                path: VerificationPath::AlreadyOnLedger,
                receipt: None,
            });
        }

        self.transition(id, VerificationState::begin).await;
        info!(record = %id, "verification pending");

        match self.decrypt_and_commit(id).await {
            Ok((value, receipt)) => {
                info!(record = %id, block = receipt.block_number, "record verified");
                self.settle(id, value).await?;
                Ok(VerificationOutcome {
                    id: id.clone(),
                    value,
                    path: VerificationPath::Decrypted,
                    receipt: Some(receipt),
                })
            }
            Err(CoordinatorError::Decryption(err)) if err.is_already_verified() => {
                info!(record = %id, "verified concurrently by another submission");
                let value = match self.committed_value(id).await {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(record = %id, error = %err, "cannot adopt committed value");
                        self.transition(id, |s| s.fail(err.to_string())).await;
                        return Err(err);
                    }
                };
                self.settle(id, value).await?;
                Ok(VerificationOutcome {
                    id: id.clone(),
                    value,
                    path: VerificationPath::ConcurrentlyVerified,
                    receipt: None,
                })
            }
            Err(err) => {
                warn!(record = %id, error = %err, "verification failed");
                self.transition(id, |s| s.fail(err.to_string())).await;
                Err(err)
            }
        }
    }

    /// Rebuild the cache from the ledger.
    ///
    /// Records whose fetch fails are left out and listed in the report; only a
    /// failure to enumerate ids aborts the reload.
    pub async fn reload(&self) -> Result<ReloadReport, LedgerError> {
        let epoch = self.cache.begin_reload();
        let local = self.verifications.lock().await.clone();
        let (records, failures) = cache::project(&self.ledger, &local).await?;

        {
            let mut tracked = self.verifications.lock().await;
            for record in records.iter().filter(|r| r.is_verified()) {
                tracked.remove(&record.id);
            }
        }

        let installed = self.cache.replace(epoch, records);
        let stats = installed.unwrap_or_else(|| self.cache.stats());
        info!(
            total = stats.total,
            verified = stats.verified,
            active = stats.active,
            skipped = failures.len(),
            "cache reloaded"
        );

        Ok(ReloadReport {
            stats,
            failures,
            installed: installed.is_some(),
        })
    }

    pub async fn check_availability(&self) -> Result<bool, CoordinatorError> {
        Ok(self.ledger.probe_availability().await?)
    }

    /// Current verification state of a record as this coordinator sees it.
    pub async fn verification_state(&self, id: &RecordId) -> VerificationState {
        if let Some(record) = self.cache.get(id) {
            return record.verification;
        }
        self.verifications
            .lock()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    async fn decrypt_and_commit(&self, id: &RecordId) -> Result<(u32, TxReceipt), CoordinatorError> {
        let handle = self.ledger.get_ciphertext_handle(id).await?;
        let submitter = LedgerProofSubmitter {
            ledger: &self.ledger,
            id,
        };

        let result = self
            .decryption
            .verify_decryption(&[handle], self.ledger.verifier_address(), &submitter)
            .await?;

        let value = result
            .clear_values
            .get(&handle)
            .copied()
            .ok_or_else(|| CoordinatorError::MissingClearValue(id.clone()))?;
        Ok((value, result.receipt))
    }

    /// Cleartext the ledger holds after reporting `AlreadyVerified`.
    async fn committed_value(&self, id: &RecordId) -> Result<u32, CoordinatorError> {
        let committed = self.ledger.get_record(id).await?;
        if !committed.verified {
            return Err(CoordinatorError::InconsistentLedger(id.clone()));
        }
        Ok(committed.clear_value)
    }

    /// Record a ledger-confirmed cleartext and refresh the cache.
    async fn settle(&self, id: &RecordId, value: u32) -> Result<(), CoordinatorError> {
        self.transition(id, |s| s.succeed(value)).await;
        self.reload()
            .await
            .map_err(|source| CoordinatorError::CommittedButStale {
                id: id.clone(),
                source,
            })?;
        Ok(())
    }

    /// Apply a state-machine transition to both the local tracker and the cache.
    ///
    /// Verified records leave the tracker: from then on the ledger is the only
    /// source of truth for them. An untracked record starts from its cached
    /// state, so a late failure cannot shadow a verification that already
    /// landed. Returns `false` when the record is not cached yet.
    async fn transition<F>(&self, id: &RecordId, step: F) -> bool
    where
        F: Fn(&VerificationState) -> VerificationState,
    {
        {
            let mut tracked = self.verifications.lock().await;
            let current = match tracked.get(id) {
                Some(state) => state.clone(),
                None => self
                    .cache
                    .get(id)
                    .map(|record| record.verification)
                    .unwrap_or_default(),
            };
            let next = step(&current);
            if next.is_verified() {
                tracked.remove(id);
            } else {
                tracked.insert(id.clone(), next);
            }
        }
        self.cache.patch_verification(id, &step)
    }
}

/// Commits a decryption proof for one record through the ledger port.
struct LedgerProofSubmitter<'a, L> {
    ledger: &'a L,
    id: &'a RecordId,
}

impl<L: LedgerPort> ProofSubmitter for LedgerProofSubmitter<'_, L> {
    async fn submit(&self, clear_values: Bytes, proof: Bytes) -> Result<TxReceipt, LedgerError> {
        let pending = self
            .ledger
            .submit_verify(self.id, &clear_values, &proof)
            .await?;
        debug!(record = %self.id, tx = %pending.tx_hash, "decryption proof submitted");

        let receipt = self.ledger.wait_for_finality(&pending).await?;
        if !receipt.success {
            return Err(LedgerError::Reverted(receipt.tx_hash));
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_fhe::MockFheRuntime;
    use crate::adapters::mock_ledger::MockLedger;
    use alloy::primitives::Address;

    type TestCoordinator = AssetCoordinator<MockLedger, MockFheRuntime, MockFheRuntime>;

    fn account() -> Address {
        Address::repeat_byte(0xA1)
    }

    fn coordinator() -> TestCoordinator {
        let fhe = MockFheRuntime::new();
        AssetCoordinator::new(
            MockLedger::new(Address::repeat_byte(0xCA), account()),
            fhe.clone(),
            fhe,
        )
    }

    fn laptop() -> NewRecord {
        NewRecord::from_fields("Laptop", "42", "electronics", "0").unwrap()
    }

    #[test]
    fn new_record_from_fields() {
        let input = NewRecord::from_fields("Ring", "12abc", "JEWELRY", "in transit").unwrap();
        assert_eq!(input.value, 12);
        assert_eq!(input.category, Category::Jewelry);
        assert_eq!(input.status, PublicStatus::InTransit);

        let fallback = NewRecord::from_fields("Box", "n/a", "furniture", "2").unwrap();
        assert_eq!(fallback.value, 0);
        assert_eq!(fallback.category, Category::Other);

        assert!(matches!(
            NewRecord::from_fields("Box", "1", "art", "9"),
            Err(CoordinatorError::InvalidStatus(_))
        ));
    }

    #[tokio::test]
    async fn create_requires_connected_session() {
        let c = coordinator();
        let result = c.create_record(&Session::disconnected(), laptop()).await;
        assert!(matches!(result, Err(CoordinatorError::NotConnected)));
        assert_eq!(c.ledger().submission_count().await, 0);
    }

    #[tokio::test]
    async fn create_rejects_blank_name() {
        let c = coordinator();
        let mut input = laptop();
        input.name = "   ".into();
        let result = c.create_record(&Session::connected(account()), input).await;
        assert!(matches!(result, Err(CoordinatorError::EmptyName)));
    }

    #[tokio::test]
    async fn create_then_verify() {
        let c = coordinator();
        let session = Session::connected(account());

        let created = c.create_record(&session, laptop()).await.unwrap();
        assert!(created.receipt.success);
        assert_eq!(created.reload.stats.total, 1);

        let record = c.cache().get(&created.id).unwrap();
        assert_eq!(record.verification, VerificationState::Unverified);
        assert!(!record.ciphertext_handle.is_zero());

        let outcome = c.verify_record(&session, &created.id).await.unwrap();
        assert_eq!(outcome.value, 42);
        assert_eq!(outcome.path, VerificationPath::Decrypted);
        assert!(outcome.receipt.is_some());
        assert_eq!(c.cache().get(&created.id).unwrap().clear_value(), Some(42));
        assert_eq!(c.cache().stats().verified, 1);
    }

    #[tokio::test]
    async fn verify_unknown_record_is_ledger_error() {
        let c = coordinator();
        let result = c
            .verify_record(&Session::connected(account()), &"asset-404".into())
            .await;
        assert!(matches!(
            result,
            Err(CoordinatorError::Ledger(LedgerError::RecordNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn rejected_verify_marks_failed_then_retry_succeeds() {
        let c = coordinator();
        let session = Session::connected(account());
        let created = c.create_record(&session, laptop()).await.unwrap();

        c.ledger().reject_next_verify("user rejected transaction").await;
        let result = c.verify_record(&session, &created.id).await;
        assert!(matches!(
            result,
            Err(CoordinatorError::Decryption(DecryptionError::Submission(
                LedgerError::Rejected(_)
            )))
        ));
        assert_eq!(c.verification_state(&created.id).await.label(), "Failed");

        let outcome = c.verify_record(&session, &created.id).await.unwrap();
        assert_eq!(outcome.value, 42);
        assert!(c.verification_state(&created.id).await.is_verified());
    }

    #[tokio::test]
    async fn failed_state_survives_reload() {
        let c = coordinator();
        let session = Session::connected(account());
        let created = c.create_record(&session, laptop()).await.unwrap();

        c.ledger().reject_next_verify("declined").await;
        let _ = c.verify_record(&session, &created.id).await;
        c.reload().await.unwrap();

        assert_eq!(c.cache().get(&created.id).unwrap().verification.label(), "Failed");
    }

    #[tokio::test]
    async fn late_failure_does_not_shadow_verification() {
        let c = coordinator();
        let session = Session::connected(account());
        let created = c.create_record(&session, laptop()).await.unwrap();
        c.verify_record(&session, &created.id).await.unwrap();
        assert!(c.verifications.lock().await.is_empty());

        // A second caller whose attempt failed after the first one verified
        c.transition(&created.id, |s| s.fail("declined")).await;

        assert!(c.verifications.lock().await.is_empty());
        assert_eq!(
            c.verification_state(&created.id).await,
            VerificationState::Verified { value: 42 }
        );
    }

    #[tokio::test]
    async fn reload_drops_tracked_states_the_ledger_settled() {
        let c = coordinator();
        let session = Session::connected(account());
        let created = c.create_record(&session, laptop()).await.unwrap();

        c.ledger().reject_next_verify("declined").await;
        let _ = c.verify_record(&session, &created.id).await;
        assert_eq!(c.verifications.lock().await.len(), 1);

        // Someone else commits the cleartext; the next reload forgets the failure
        c.ledger().mark_verified(&created.id, 42).await.unwrap();
        c.reload().await.unwrap();
        assert!(c.verifications.lock().await.is_empty());
        assert!(c.cache().get(&created.id).unwrap().is_verified());
    }

    #[tokio::test]
    async fn availability_probe() {
        let c = coordinator();
        assert!(c.check_availability().await.unwrap());
        c.ledger().set_available(false).await;
        assert!(!c.check_availability().await.unwrap());
    }
}
