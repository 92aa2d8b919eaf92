//! Confidential attribute lifecycle for ledger-tracked assets.
//!
//! A record's sensitive attribute (e.g. a GPS coordinate) is encrypted client-side
//! under a homomorphic scheme and registered on a shared ledger together with its
//! input proof. Later, anyone holding a connected session can request an off-chain
//! decryption whose proof is committed back on-chain, so every observer can trust
//! the revealed value without trusting the revealer.
//!
//! The crate is organised as ports and adapters:
//! - [`domain`]: records, enumerations, the verification state machine, sessions
//! - [`ports`]: capability traits for the ledger and the homomorphic runtime
//! - [`cache`]: the in-memory projection of ledger state
//! - [`coordinator`]: the lifecycle orchestration (create, verify, reload)
//! - [`adapters`]: in-memory mocks and the Ethereum registry client

pub mod adapters;
pub mod cache;
pub mod coordinator;
pub mod domain;
pub mod ports;
