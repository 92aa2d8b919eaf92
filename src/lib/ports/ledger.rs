use alloy::primitives::{Address, Bytes, B256};
use std::future::Future;

use super::{CiphertextHandle, CreateRequest, LedgerRecord, PendingTx, TxReceipt};
use crate::domain::record::RecordId;

/// Port for the shared record store (the registry contract).
///
/// Writes are two-step: `submit_*` hands back a [`PendingTx`] and the write only
/// becomes visible to reads once [`LedgerPort::wait_for_finality`] resolves.
///
/// Implementations:
/// - `EthereumLedger` (alloy RPC against the deployed registry)
/// - `MockLedger` (in-memory, for tests and the demo)
pub trait LedgerPort: Send + Sync {
    /// Address of the registry contract. Doubles as the verifier address for
    /// input proofs and the verifying contract for decryption proofs.
    fn verifier_address(&self) -> Address;

    /// Enumerate all finalized record identifiers, in ledger order.
    fn list_record_ids(&self) -> impl Future<Output = Result<Vec<RecordId>, LedgerError>> + Send;

    /// Fetch a record's public projection.
    fn get_record(
        &self,
        id: &RecordId,
    ) -> impl Future<Output = Result<LedgerRecord, LedgerError>> + Send;

    /// Fetch only the ciphertext handle of a record.
    fn get_ciphertext_handle(
        &self,
        id: &RecordId,
    ) -> impl Future<Output = Result<CiphertextHandle, LedgerError>> + Send;

    /// Submit a record creation transaction.
    fn submit_create(
        &self,
        request: &CreateRequest,
    ) -> impl Future<Output = Result<PendingTx, LedgerError>> + Send;

    /// Submit the decrypted cleartext values together with the decryption proof.
    ///
    /// Fails with [`LedgerError::AlreadyVerified`] when another submission for the
    /// same record has already finalized.
    fn submit_verify(
        &self,
        id: &RecordId,
        clear_values: &Bytes,
        proof: &Bytes,
    ) -> impl Future<Output = Result<PendingTx, LedgerError>> + Send;

    /// Wait until a submitted transaction is final.
    ///
    /// A verify transaction that lost a race reports `AlreadyVerified`; any
    /// other revert reports `Reverted`.
    fn wait_for_finality(
        &self,
        tx: &PendingTx,
    ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send;

    /// Check whether the registry is reachable and accepting calls.
    fn probe_availability(&self) -> impl Future<Output = Result<bool, LedgerError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("record already exists: {0}")]
    DuplicateRecord(RecordId),

    /// Benign race: another submission committed the cleartext first.
    #[error("record already verified: {0}")]
    AlreadyVerified(RecordId),

    /// The signer declined or the node refused the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("transaction reverted: {0}")]
    Reverted(B256),

    #[error("unknown transaction: {0}")]
    UnknownTransaction(B256),

    #[error("RPC error: {0}")]
    Rpc(String),
}
