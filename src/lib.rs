//! Simple Bank - double-entry transfer core
//!
//! Moves funds between two accounts while keeping double-entry bookkeeping
//! intact under concurrent access.
//!
//! # Modules
//!
//! - [`core_types`] - ID and money type aliases
//! - [`ledger`] - Ledger store, balance mutator, lock ordering, transfer coordinator
//! - [`service`] - Caller-side checks and retry policy in front of the coordinator
//! - [`db`] - PostgreSQL pool and schema bootstrap
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;
pub mod service;

// Convenient re-exports at crate root
pub use core_types::{AccountId, EntryId, MinorUnits, TransferId};
pub use ledger::{
    Account, BalanceMutator, Entry, LedgerError, LedgerStore, LedgerTx, LockOrder,
    MemoryLedgerStore, PgLedgerStore, Transfer, TransferCoordinator, TransferPhase,
    TransferResult,
};
pub use service::{BankService, TransferRequest};
