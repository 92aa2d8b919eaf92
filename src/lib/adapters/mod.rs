pub mod ethereum;
pub mod mock_fhe;
pub mod mock_ledger;
