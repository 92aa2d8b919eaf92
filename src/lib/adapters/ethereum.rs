use alloy::{
    network::EthereumWallet,
    primitives::{Address, Bytes, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    sol,
};
use tracing::debug;

use crate::{
    domain::record::RecordId,
    ports::{
        ledger::{LedgerError, LedgerPort},
        CiphertextHandle, CreateRequest, LedgerRecord, PendingTx, TxKind, TxReceipt,
    },
};

sol! {
    #[sol(rpc)]
    interface IConfidentialAssetRegistry {
        function getAllBusinessIds() external view returns (string[] memory);

        function getBusinessData(string calldata businessId) external view returns (
            string memory name,
            uint256 publicValue1,
            uint256 publicValue2,
            string memory description,
            address creator,
            uint256 timestamp,
            bool isVerified,
            uint32 decryptedValue
        );

        function getEncryptedValue(string calldata businessId) external view returns (bytes32);

        function createBusinessData(
            string calldata businessId,
            string calldata name,
            bytes32 encryptedValue,
            bytes calldata inputProof,
            uint256 publicValue1,
            uint256 publicValue2,
            string calldata description
        ) external;

        function verifyDecryption(
            string calldata businessId,
            bytes calldata abiEncodedClearValue,
            bytes calldata decryptionProof
        ) external;

        function isAvailable() external view returns (bool);
    }
}

/// Ethereum RPC adapter for the confidential asset registry.
///
/// `publicValue1` carries the category code and `publicValue2` the status code.
#[derive(Clone)]
pub struct EthereumLedger {
    provider: DynProvider,
    registry: Address,
}

impl EthereumLedger {
    /// Read-only client: every `submit_*` call will be refused by the node.
    pub fn read_only(rpc_url: &str, registry: Address) -> Result<Self, LedgerError> {
        let url = rpc_url
            .parse()
            .map_err(|e| LedgerError::Rpc(format!("Invalid RPC URL: {}", e)))?;
        let provider = DynProvider::new(ProviderBuilder::new().connect_http(url));
        Ok(Self { provider, registry })
    }

    /// Signing client: transactions are sent from the key's account.
    pub fn with_signer(
        rpc_url: &str,
        private_key: &str,
        registry: Address,
    ) -> Result<Self, LedgerError> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| LedgerError::Rpc(format!("Invalid private key: {}", e)))?;
        let wallet = EthereumWallet::from(signer);
        let url = rpc_url
            .parse()
            .map_err(|e| LedgerError::Rpc(format!("Invalid RPC URL: {}", e)))?;
        let provider = DynProvider::new(ProviderBuilder::new().wallet(wallet).connect_http(url));
        Ok(Self { provider, registry })
    }

    /// Classify a failed verify: if the record is verified by now, another
    /// submission won the race.
    async fn verify_failure(&self, id: &RecordId, err: LedgerError) -> LedgerError {
        match self.get_record(id).await {
            Ok(record) if record.verified => LedgerError::AlreadyVerified(id.clone()),
            _ => err,
        }
    }
}

fn saturating_u32(value: U256) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn saturating_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

impl LedgerPort for EthereumLedger {
    fn verifier_address(&self) -> Address {
        self.registry
    }

    async fn list_record_ids(&self) -> Result<Vec<RecordId>, LedgerError> {
        let registry = IConfidentialAssetRegistry::new(self.registry, &self.provider);
        let ids = registry
            .getAllBusinessIds()
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        Ok(ids.into_iter().map(RecordId::new).collect())
    }

    async fn get_record(&self, id: &RecordId) -> Result<LedgerRecord, LedgerError> {
        let registry = IConfidentialAssetRegistry::new(self.registry, &self.provider);
        let data = registry
            .getBusinessData(id.to_string())
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        // The registry returns a zeroed struct for ids it does not know
        if data.creator == Address::ZERO {
            return Err(LedgerError::RecordNotFound(id.clone()));
        }

        let handle = registry
            .getEncryptedValue(id.to_string())
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        Ok(LedgerRecord {
            name: data.name,
            ciphertext_handle: CiphertextHandle(handle),
            category_code: saturating_u32(data.publicValue1),
            status_code: saturating_u32(data.publicValue2),
            created_at: saturating_u64(data.timestamp),
            creator: data.creator,
            verified: data.isVerified,
            clear_value: data.decryptedValue,
        })
    }

    async fn get_ciphertext_handle(&self, id: &RecordId) -> Result<CiphertextHandle, LedgerError> {
        let registry = IConfidentialAssetRegistry::new(self.registry, &self.provider);
        let handle = registry
            .getEncryptedValue(id.to_string())
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        Ok(CiphertextHandle(handle))
    }

    async fn submit_create(&self, request: &CreateRequest) -> Result<PendingTx, LedgerError> {
        let registry = IConfidentialAssetRegistry::new(self.registry, &self.provider);
        let pending = registry
            .createBusinessData(
                request.id.to_string(),
                request.name.clone(),
                request.ciphertext.0,
                request.proof.clone(),
                U256::from(request.category_code),
                U256::from(request.status_code),
                request.tag.clone(),
            )
            .send()
            .await
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let tx_hash = *pending.tx_hash();
        debug!(record = %request.id, tx = %tx_hash, "createBusinessData sent");
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
        let registry = IConfidentialAssetRegistry::new(self.registry, &self.provider);
        let sent = registry
            .verifyDecryption(id.to_string(), clear_values.clone(), proof.clone())
            .send()
            .await;

        match sent {
            Ok(pending) => Ok(PendingTx {
                tx_hash: *pending.tx_hash(),
                kind: TxKind::Verify(id.clone()),
            }),
            // Gas estimation reverts when the record is already verified
            Err(e) => Err(self
                .verify_failure(id, LedgerError::Rejected(e.to_string()))
                .await),
        }
    }

    async fn wait_for_finality(&self, tx: &PendingTx) -> Result<TxReceipt, LedgerError> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx.tx_hash)
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if !receipt.status() {
            let reverted = LedgerError::Reverted(receipt.transaction_hash);
            return Err(match &tx.kind {
                TxKind::Verify(id) => self.verify_failure(id, reverted).await,
                TxKind::Create(_) => reverted,
            });
        }

        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.unwrap_or_default(),
            success: true,
        })
    }

    async fn probe_availability(&self) -> Result<bool, LedgerError> {
        let registry = IConfidentialAssetRegistry::new(self.registry, &self.provider);
        registry
            .isAvailable()
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }
}
