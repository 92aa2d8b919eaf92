pub mod decryption;
pub mod encryption;
pub mod ledger;

use alloy::primitives::{Address, Bytes, B256};

pub use crate::domain::record::CiphertextHandle;
use crate::domain::record::RecordId;

/// Fixed protocol tag carried by every creation transaction.
pub const PROTOCOL_TAG: &str = "Confidential Asset Tracking";

/// Output of client-side encryption: the external ciphertext handle plus the
/// zero-knowledge proof that it was built correctly for the given verifier
/// and authorized account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handle: CiphertextHandle,
    pub proof: Bytes,
}

/// Public projection of a record as the registry contract returns it.
///
/// Category and status are raw integer codes; decoding into the closed
/// enumerations happens in the cache projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub name: String,
    pub ciphertext_handle: CiphertextHandle,
    pub category_code: u32,
    pub status_code: u32,
    pub created_at: u64,
    pub creator: Address,
    pub verified: bool,
    /// Meaningful only when `verified` is set.
    pub clear_value: u32,
}

/// Arguments of a record creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub id: RecordId,
    pub name: String,
    pub ciphertext: CiphertextHandle,
    pub proof: Bytes,
    pub category_code: u32,
    pub status_code: u32,
    pub tag: String,
}

/// What a submitted transaction will do once final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxKind {
    Create(RecordId),
    Verify(RecordId),
}

/// Handle to a submitted, not yet final, transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub tx_hash: B256,
    pub kind: TxKind,
}

/// Minimal transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub success: bool,
}
