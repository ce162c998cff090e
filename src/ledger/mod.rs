//! Double-entry ledger core
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ TransferCoordinator ──▶ LockOrder (pure)
//!                    │
//!                    ├──▶ LedgerTx: insert transfer, insert entries
//!                    └──▶ BalanceMutator ──▶ LedgerTx: lock + update (lower ID first)
//! ```
//!
//! # Invariants
//!
//! 1. **Conservation**: a transfer moves `amount` from one balance to the other
//! 2. **Double-entry**: every transfer has exactly two entries, `-amount` and `+amount`
//! 3. **Atomicity**: a failed attempt leaves no transfer, entry or balance change
//! 4. **Lock order**: account rows are always locked in ascending ID order

pub mod balance;
pub mod coordinator;
pub mod error;
pub mod lock_order;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod state;
pub mod store;
pub mod validation;

pub use balance::BalanceMutator;
pub use coordinator::TransferCoordinator;
pub use error::LedgerError;
pub use lock_order::LockOrder;
pub use memory::MemoryLedgerStore;
pub use models::{Account, Entry, Transfer, TransferResult};
pub use postgres::PgLedgerStore;
pub use state::TransferPhase;
pub use store::{LedgerStore, LedgerTx};
pub use validation::Currency;
