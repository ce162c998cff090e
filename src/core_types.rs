//! Core types used throughout the ledger
//!
//! Type aliases that give the raw database integers semantic meaning.

/// Account ID - unique, immutable after the account row is inserted.
///
/// # Constraints:
/// - **Immutable**: Once assigned, NEVER changes
/// - **Totally ordered**: Ascending ID order is the global row-lock order
pub type AccountId = i64;

/// Entry ID - unique within the ledger
pub type EntryId = i64;

/// Transfer ID - unique within the ledger
pub type TransferId = i64;

/// Money in minor currency units (cents, rupiah, ...).
///
/// Signed: entries carry negative amounts for debits, and account
/// balances are allowed to go below zero.
pub type MinorUnits = i64;
