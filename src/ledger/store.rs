//! Ledger Store contract
//!
//! Every row operation runs on a transaction handle obtained from
//! [`LedgerStore::begin`]; nothing commits implicitly. Dropping a handle
//! without calling [`LedgerTx::commit`] rolls the transaction back, which is
//! how a cancelled request leaves no trace.

use async_trait::async_trait;

use super::error::LedgerError;
use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Transfer, UpdateAccountParams,
};
use crate::core_types::{AccountId, EntryId, TransferId};

/// Source of transactions over the accounts, entries and transfers relations.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx + 'static;

    /// Begin a read-committed transaction.
    async fn begin(&self) -> Result<Self::Tx, LedgerError>;
}

/// Transaction-scoped row operations
#[async_trait]
pub trait LedgerTx: Send {
    // === Accounts ===
    async fn create_account(&mut self, params: CreateAccountParams)
    -> Result<Account, LedgerError>;

    async fn get_account(&mut self, id: AccountId) -> Result<Account, LedgerError>;

    /// Locking read. Blocks until no other in-flight transaction holds the
    /// row; the lock is then held until this transaction ends. Re-entrant
    /// within one transaction.
    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError>;

    async fn list_accounts(
        &mut self,
        params: &ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError>;

    /// Overwrite the balance. Takes the row lock if not already held.
    async fn update_account(&mut self, params: UpdateAccountParams)
    -> Result<Account, LedgerError>;

    /// Add a signed amount to the balance in one statement.
    async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> Result<Account, LedgerError>;

    /// Fails with `Conflict` while entries or transfers reference the account.
    async fn delete_account(&mut self, id: AccountId) -> Result<(), LedgerError>;

    // === Entries ===
    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError>;

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry, LedgerError>;

    async fn list_entries(&mut self, params: &ListEntriesParams)
    -> Result<Vec<Entry>, LedgerError>;

    // === Transfers ===
    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError>;

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer, LedgerError>;

    async fn list_transfers(
        &mut self,
        params: &ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError>;

    // === Lifetime ===
    async fn commit(self) -> Result<(), LedgerError>;

    async fn rollback(self) -> Result<(), LedgerError>;
}
