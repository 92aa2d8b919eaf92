use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::domain::record::{Category, PublicStatus, Record, RecordId};
use crate::domain::verification::VerificationState;
use crate::ports::ledger::{LedgerError, LedgerPort};
use crate::ports::LedgerRecord;

/// Aggregate counters recomputed on every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub total: usize,
    pub verified: usize,
    /// Records in the default (`Active`) status.
    pub active: usize,
}

impl CacheStats {
    fn compute(records: &[Record]) -> Self {
        Self {
            total: records.len(),
            verified: records.iter().filter(|r| r.is_verified()).count(),
            active: records
                .iter()
                .filter(|r| r.status == Some(PublicStatus::DEFAULT))
                .count(),
        }
    }
}

/// Immutable view of the record set at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    records: Vec<Record>,
    stats: CacheStats,
}

impl Snapshot {
    fn new(records: Vec<Record>) -> Self {
        let stats = CacheStats::compute(&records);
        Self { records, stats }
    }

    /// Records in ledger enumeration order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// Case-insensitive substring match on name or category label.
    pub fn search(&self, term: &str) -> Vec<&Record> {
        let term = term.to_lowercase();
        self.records
            .iter()
            .filter(|r| {
                r.name.to_lowercase().contains(&term) || r.category.label().contains(&term)
            })
            .collect()
    }
}

/// In-memory projection of ledger state.
///
/// Readers always get a whole [`Snapshot`]; replacement swaps the `Arc` under a
/// write lock so no reader can observe a half-built set. The only in-place
/// mutation is a narrow verification-state patch.
#[derive(Debug, Default)]
pub struct RecordCache {
    current: RwLock<Arc<Snapshot>>,
    /// Epoch of the snapshot currently installed.
    installed: AtomicU64,
    /// Last epoch handed out to a reload.
    issued: AtomicU64,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> CacheStats {
        self.snapshot().stats()
    }

    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.snapshot().get(id).cloned()
    }

    pub fn search(&self, term: &str) -> Vec<Record> {
        self.snapshot().search(term).into_iter().cloned().collect()
    }

    /// Reserve an epoch before starting to fetch a new record set.
    pub fn begin_reload(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Install `records` as the new snapshot, unless a reload that started
    /// later has already installed its own. Returns the new counters, or
    /// `None` if this result was stale and dropped.
    pub fn replace(&self, epoch: u64, records: Vec<Record>) -> Option<CacheStats> {
        let snapshot = Arc::new(Snapshot::new(records));
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if epoch < self.installed.load(Ordering::SeqCst) {
            debug!(epoch, "dropping stale snapshot");
            return None;
        }
        self.installed.store(epoch, Ordering::SeqCst);
        let stats = snapshot.stats();
        *current = snapshot;
        Some(stats)
    }

    /// Apply a verification transition to one cached record.
    ///
    /// Returns `false` when the record is not in the current snapshot.
    pub fn patch_verification<F>(&self, id: &RecordId, transition: F) -> bool
    where
        F: FnOnce(&VerificationState) -> VerificationState,
    {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = current.records.iter().position(|r| &r.id == id) else {
            return false;
        };
        let mut records = current.records.clone();
        records[index].verification = transition(&records[index].verification);
        *current = Arc::new(Snapshot::new(records));
        true
    }
}

/// A record left out of a snapshot because its fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadFailure {
    pub id: RecordId,
    pub error: LedgerError,
}

/// Summary of one reload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReloadReport {
    pub stats: CacheStats,
    pub failures: Vec<ReloadFailure>,
    /// False when a newer reload had already installed its snapshot.
    pub installed: bool,
}

/// Decode a ledger record into its typed form.
///
/// Never fails: unknown category codes map to the fallback bucket and unknown
/// status codes are kept as "no status".
pub fn to_record(
    id: RecordId,
    raw: LedgerRecord,
    local: Option<&VerificationState>,
) -> Record {
    let ledger_value = raw.verified.then_some(raw.clear_value);
    Record {
        id,
        name: raw.name,
        category: Category::from_code(raw.category_code),
        status: PublicStatus::from_code(raw.status_code),
        status_code: raw.status_code,
        creator: raw.creator,
        created_at: raw.created_at,
        ciphertext_handle: raw.ciphertext_handle,
        verification: VerificationState::reconcile(ledger_value, local),
    }
}

/// Fetch every record from the ledger, best effort.
///
/// Failing to enumerate ids is fatal; a failing per-record fetch is logged and
/// that record is skipped. `local` overlays in-flight verification states that
/// the ledger does not know about.
pub async fn project<L: LedgerPort>(
    ledger: &L,
    local: &HashMap<RecordId, VerificationState>,
) -> Result<(Vec<Record>, Vec<ReloadFailure>), LedgerError> {
    let ids = ledger.list_record_ids().await?;
    let mut records = Vec::with_capacity(ids.len());
    let mut failures = Vec::new();

    for id in ids {
        match ledger.get_record(&id).await {
            Ok(raw) => {
                let local_state = local.get(&id);
                records.push(to_record(id, raw, local_state));
            }
            Err(error) => {
                warn!(record = %id, %error, "skipping record during reload");
                failures.push(ReloadFailure { id, error });
            }
        }
    }

    Ok((records, failures))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::CiphertextHandle;
    use alloy::primitives::{Address, B256};

    fn raw(name: &str, category_code: u32, status_code: u32, verified: bool) -> LedgerRecord {
        LedgerRecord {
            name: name.to_string(),
            ciphertext_handle: CiphertextHandle(B256::repeat_byte(0x11)),
            category_code,
            status_code,
            created_at: 1_700_000_000,
            creator: Address::repeat_byte(0xA1),
            verified,
            clear_value: if verified { 42 } else { 0 },
        }
    }

    fn record(id: &str, name: &str, category_code: u32, status_code: u32, verified: bool) -> Record {
        to_record(RecordId::from(id), raw(name, category_code, status_code, verified), None)
    }

    #[test]
    fn to_record_decodes_codes() {
        let r = record("asset-1", "Laptop", 0, 1, false);
        assert_eq!(r.category, Category::Electronics);
        assert_eq!(r.status, Some(PublicStatus::InTransit));
        assert_eq!(r.verification, VerificationState::Unverified);
        assert_eq!(r.clear_value(), None);
    }

    #[test]
    fn to_record_applies_fallbacks() {
        let r = record("asset-1", "Mystery", 17, 9, false);
        assert_eq!(r.category, Category::Other);
        assert_eq!(r.status, None);
        assert_eq!(r.status_code, 9);
        assert_eq!(r.status_label(), "Unknown");
    }

    #[test]
    fn to_record_verified_carries_value() {
        let r = record("asset-1", "Ring", 1, 0, true);
        assert_eq!(r.verification, VerificationState::Verified { value: 42 });
        assert_eq!(r.clear_value(), Some(42));
    }

    #[test]
    fn to_record_unverified_ignores_stale_clear_value() {
        let mut unverified = raw("Ring", 1, 0, false);
        unverified.clear_value = 99;
        let r = to_record("asset-1".into(), unverified, None);
        assert_eq!(r.clear_value(), None);
    }

    #[test]
    fn replace_recomputes_stats() {
        let cache = RecordCache::new();
        let epoch = cache.begin_reload();
        let stats = cache
            .replace(
                epoch,
                vec![
                    record("asset-1", "Laptop", 0, 0, true),
                    record("asset-2", "Painting", 2, 1, false),
                    record("asset-3", "Deed", 3, 0, false),
                ],
            )
            .unwrap();

        assert_eq!(
            stats,
            CacheStats {
                total: 3,
                verified: 1,
                active: 2
            }
        );
        assert_eq!(cache.stats(), stats);
    }

    #[test]
    fn stale_reload_is_dropped() {
        let cache = RecordCache::new();
        let older = cache.begin_reload();
        let newer = cache.begin_reload();

        cache
            .replace(newer, vec![record("asset-2", "New", 0, 0, false)])
            .unwrap();
        assert!(cache
            .replace(older, vec![record("asset-1", "Old", 0, 0, false)])
            .is_none());

        assert!(cache.get(&"asset-2".into()).is_some());
        assert!(cache.get(&"asset-1".into()).is_none());
    }

    #[test]
    fn snapshots_are_isolated_from_replacement() {
        let cache = RecordCache::new();
        let epoch = cache.begin_reload();
        cache.replace(epoch, vec![record("asset-1", "Laptop", 0, 0, false)]);

        let before = cache.snapshot();
        let epoch = cache.begin_reload();
        cache.replace(epoch, Vec::new());

        assert_eq!(before.records().len(), 1);
        assert_eq!(cache.snapshot().records().len(), 0);
    }

    #[test]
    fn patch_verification_updates_stats() {
        let cache = RecordCache::new();
        let epoch = cache.begin_reload();
        cache.replace(epoch, vec![record("asset-1", "Laptop", 0, 0, false)]);

        let id = RecordId::from("asset-1");
        assert!(cache.patch_verification(&id, |s| s.succeed(42)));
        assert_eq!(cache.get(&id).unwrap().clear_value(), Some(42));
        assert_eq!(cache.stats().verified, 1);

        assert!(!cache.patch_verification(&"asset-9".into(), |s| s.begin()));
    }

    #[test]
    fn search_matches_name_or_category() {
        let cache = RecordCache::new();
        let epoch = cache.begin_reload();
        cache.replace(
            epoch,
            vec![
                record("asset-1", "Gold Ring", 1, 0, false),
                record("asset-2", "Laptop", 0, 0, false),
                record("asset-3", "Sketch", 2, 0, false),
            ],
        );

        let hits: Vec<_> = cache.search("RING").into_iter().map(|r| r.id).collect();
        assert_eq!(hits, vec![RecordId::from("asset-1")]);

        let hits: Vec<_> = cache.search("electr").into_iter().map(|r| r.id).collect();
        assert_eq!(hits, vec![RecordId::from("asset-2")]);

        assert_eq!(cache.search("").len(), 3);
    }
}
