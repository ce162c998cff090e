//! In-Memory Ledger Store
//!
//! Process-local implementation of [`LedgerStore`] with the same transactional
//! behaviour the ledger relies on from PostgreSQL:
//! - per-account row locks held until commit/rollback
//! - read-committed visibility (a transaction sees committed rows plus its own writes)
//! - writes staged per transaction and applied atomically on commit
//! - foreign-key and uniqueness checks on insert and again at commit
//! - sequence-style IDs that are never reused (rollbacks leave gaps)
//!
//! Lock waits are bounded by `lock_timeout`; an expired wait surfaces as
//! `SerializationFailure`, like `lock_timeout` / deadlock detection does in
//! PostgreSQL.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::debug;

use super::error::LedgerError;
use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Transfer, UpdateAccountParams,
};
use super::store::{LedgerStore, LedgerTx};
use super::validation::check_query_bounds;
use crate::core_types::{AccountId, EntryId, TransferId};

/// Default upper bound on a single row-lock wait
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    entries: BTreeMap<EntryId, Entry>,
    transfers: BTreeMap<TransferId, Transfer>,
}

struct Sequence(AtomicI64);

impl Sequence {
    fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

struct Inner {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<AccountId, Arc<RowLock<()>>>>,
    account_seq: Sequence,
    entry_seq: Sequence,
    transfer_seq: Sequence,
    lock_timeout: Option<Duration>,
}

impl Inner {
    // A panic while holding the guard cannot leave half-applied state:
    // commit validates everything before it mutates.
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, id: AccountId) -> Arc<RowLock<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id).or_default().clone()
    }

    /// Drop the lock slot of a row nobody holds or waits on.
    fn release_row_lock(&self, id: AccountId) {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(&id).is_some_and(|row| Arc::strong_count(row) == 1) {
            locks.remove(&id);
        }
    }
}

/// Ledger store held entirely in process memory
#[derive(Clone)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(Some(DEFAULT_LOCK_TIMEOUT))
    }

    /// `None` waits for row locks indefinitely.
    pub fn with_lock_timeout(lock_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                account_seq: Sequence::new(),
                entry_seq: Sequence::new(),
                transfer_seq: Sequence::new(),
                lock_timeout,
            }),
        }
    }

    // === Committed-state inspection ===

    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.inner.tables().accounts.get(&id).cloned()
    }

    pub fn account_count(&self) -> usize {
        self.inner.tables().accounts.len()
    }

    pub fn entry_count(&self) -> usize {
        self.inner.tables().entries.len()
    }

    pub fn transfer_count(&self) -> usize {
        self.inner.tables().transfers.len()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.inner.tables().entries.values().cloned().collect()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.inner.tables().transfers.values().cloned().collect()
    }

    /// Number of row-lock slots currently allocated
    pub fn row_lock_count(&self) -> usize {
        self.inner
            .row_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryLedgerTx;

    async fn begin(&self) -> Result<MemoryLedgerTx, LedgerError> {
        Ok(MemoryLedgerTx {
            inner: self.inner.clone(),
            held: HashMap::new(),
            accounts: BTreeMap::new(),
            entries: BTreeMap::new(),
            transfers: BTreeMap::new(),
            finished: false,
        })
    }
}

/// One open in-memory transaction
pub struct MemoryLedgerTx {
    inner: Arc<Inner>,
    held: HashMap<AccountId, OwnedMutexGuard<()>>,
    /// Staged account writes; `None` marks a delete
    accounts: BTreeMap<AccountId, Option<Account>>,
    entries: BTreeMap<EntryId, Entry>,
    transfers: BTreeMap<TransferId, Transfer>,
    finished: bool,
}

impl MemoryLedgerTx {
    async fn lock_row(&mut self, id: AccountId) -> Result<(), LedgerError> {
        if self.held.contains_key(&id) {
            return Ok(());
        }

        let row = self.inner.row_lock(id);
        let guard = match self.inner.lock_timeout {
            Some(timeout) => tokio::time::timeout(timeout, row.lock_owned())
                .await
                .map_err(|_| {
                    LedgerError::SerializationFailure(format!(
                        "lock wait on account {} exceeded {:?}",
                        id, timeout
                    ))
                })?,
            None => row.lock_owned().await,
        };

        self.held.insert(id, guard);
        Ok(())
    }

    fn visible_account(&self, id: AccountId) -> Option<Account> {
        match self.accounts.get(&id) {
            Some(staged) => staged.clone(),
            None => self.inner.tables().accounts.get(&id).cloned(),
        }
    }

    fn require_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.visible_account(id)
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    /// Lock, then read. Drops the lock again if the row does not exist.
    async fn locked_account(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        let newly_locked = !self.held.contains_key(&id);
        self.lock_row(id).await?;

        match self.visible_account(id) {
            Some(account) => Ok(account),
            None => {
                if newly_locked {
                    self.held.remove(&id);
                    self.inner.release_row_lock(id);
                }
                Err(LedgerError::account_not_found(id))
            }
        }
    }

    fn stage_account(&mut self, account: Account) -> Account {
        self.accounts.insert(account.id, Some(account.clone()));
        account
    }

    fn has_writes(&self) -> bool {
        !(self.accounts.is_empty() && self.entries.is_empty() && self.transfers.is_empty())
    }

    fn references_account(&self, tables: &Tables, id: AccountId) -> bool {
        let is_ref = |t: &Transfer| t.from_account_id == id || t.to_account_id == id;
        tables.entries.values().any(|e| e.account_id == id)
            || self.entries.values().any(|e| e.account_id == id)
            || tables.transfers.values().any(is_ref)
            || self.transfers.values().any(is_ref)
    }

    /// Re-check constraints against the latest committed state.
    fn validate_commit(&self, tables: &Tables) -> Result<(), LedgerError> {
        let exists = |id: AccountId| match self.accounts.get(&id) {
            Some(staged) => staged.is_some(),
            None => tables.accounts.contains_key(&id),
        };

        for entry in self.entries.values() {
            if !exists(entry.account_id) {
                return Err(LedgerError::account_not_found(entry.account_id));
            }
        }
        for transfer in self.transfers.values() {
            for id in [transfer.from_account_id, transfer.to_account_id] {
                if !exists(id) {
                    return Err(LedgerError::account_not_found(id));
                }
            }
        }

        for (id, staged) in &self.accounts {
            if let Some(account) = staged
                && !tables.accounts.contains_key(id)
                && tables
                    .accounts
                    .values()
                    .any(|a| a.owner == account.owner && a.currency == account.currency)
            {
                return Err(duplicate_account(account));
            }
        }
        Ok(())
    }
}

fn duplicate_account(account: &Account) -> LedgerError {
    LedgerError::Conflict(format!(
        "owner '{}' already has a {} account",
        account.owner, account.currency
    ))
}

fn page<T>(rows: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    rows.skip(offset as usize).take(limit as usize).collect()
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn create_account(
        &mut self,
        params: CreateAccountParams,
    ) -> Result<Account, LedgerError> {
        let duplicate = {
            let tables = self.inner.tables();
            let committed = tables.accounts.values().filter(|a| {
                !matches!(self.accounts.get(&a.id), Some(None))
            });
            let staged = self.accounts.values().flatten();
            committed
                .chain(staged)
                .any(|a| a.owner == params.owner && a.currency == params.currency)
        };

        let account = Account {
            id: self.inner.account_seq.next(),
            owner: params.owner,
            balance: params.balance,
            currency: params.currency,
            created_at: chrono::Utc::now(),
        };
        if duplicate {
            return Err(duplicate_account(&account));
        }

        Ok(self.stage_account(account))
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        self.require_account(id)
    }

    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        self.locked_account(id).await
    }

    async fn list_accounts(
        &mut self,
        params: &ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError> {
        check_query_bounds(params.limit, params.offset)?;

        let mut visible = self.inner.tables().accounts.clone();
        for (id, staged) in &self.accounts {
            match staged {
                Some(account) => visible.insert(*id, account.clone()),
                None => visible.remove(id),
            };
        }

        let rows = visible
            .into_values()
            .filter(|a| params.owner.as_ref().is_none_or(|owner| &a.owner == owner));
        Ok(page(rows, params.limit, params.offset))
    }

    async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, LedgerError> {
        let mut account = self.locked_account(params.id).await?;
        account.balance = params.balance;
        Ok(self.stage_account(account))
    }

    async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> Result<Account, LedgerError> {
        let mut account = self.locked_account(params.id).await?;
        account.balance = account.balance.checked_add(params.amount).ok_or_else(|| {
            LedgerError::Internal(format!("balance of account {} out of range", params.id))
        })?;
        Ok(self.stage_account(account))
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<(), LedgerError> {
        self.locked_account(id).await?;

        let referenced = {
            let tables = self.inner.tables();
            self.references_account(&tables, id)
        };
        if referenced {
            return Err(LedgerError::Conflict(format!(
                "account {} is referenced by the ledger",
                id
            )));
        }

        self.accounts.insert(id, None);
        Ok(())
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError> {
        self.require_account(params.account_id)?;

        let entry = Entry {
            id: self.inner.entry_seq.next(),
            account_id: params.account_id,
            amount: params.amount,
            created_at: chrono::Utc::now(),
        };
        self.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry, LedgerError> {
        if let Some(entry) = self.entries.get(&id) {
            return Ok(entry.clone());
        }
        self.inner
            .tables()
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("entry {}", id)))
    }

    async fn list_entries(
        &mut self,
        params: &ListEntriesParams,
    ) -> Result<Vec<Entry>, LedgerError> {
        check_query_bounds(params.limit, params.offset)?;

        let mut visible = self.inner.tables().entries.clone();
        visible.extend(self.entries.iter().map(|(id, e)| (*id, e.clone())));

        let rows = visible
            .into_values()
            .filter(|e| e.account_id == params.account_id);
        Ok(page(rows, params.limit, params.offset))
    }

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        if params.from_account_id == params.to_account_id {
            return Err(LedgerError::InvalidArgument(
                "transfer accounts must differ".to_string(),
            ));
        }
        if params.amount <= 0 {
            return Err(LedgerError::InvalidArgument(
                "transfer amount must be positive".to_string(),
            ));
        }
        self.require_account(params.from_account_id)?;
        self.require_account(params.to_account_id)?;

        let transfer = Transfer {
            id: self.inner.transfer_seq.next(),
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: chrono::Utc::now(),
        };
        self.transfers.insert(transfer.id, transfer.clone());
        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer, LedgerError> {
        if let Some(transfer) = self.transfers.get(&id) {
            return Ok(transfer.clone());
        }
        self.inner
            .tables()
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("transfer {}", id)))
    }

    async fn list_transfers(
        &mut self,
        params: &ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        check_query_bounds(params.limit, params.offset)?;

        let mut visible = self.inner.tables().transfers.clone();
        visible.extend(self.transfers.iter().map(|(id, t)| (*id, t.clone())));

        let rows = visible.into_values().filter(|t| {
            t.from_account_id == params.from_account_id || t.to_account_id == params.to_account_id
        });
        Ok(page(rows, params.limit, params.offset))
    }

    async fn commit(mut self) -> Result<(), LedgerError> {
        {
            let mut tables = self.inner.tables();
            self.validate_commit(&tables)?;

            for (id, staged) in std::mem::take(&mut self.accounts) {
                match staged {
                    Some(account) => tables.accounts.insert(id, account),
                    None => tables.accounts.remove(&id),
                };
            }
            tables.entries.append(&mut self.entries);
            tables.transfers.append(&mut self.transfers);
        }

        self.finished = true;
        debug!(locks = self.held.len(), "Memory transaction committed");
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), LedgerError> {
        self.finished = true;
        debug!(locks = self.held.len(), "Memory transaction rolled back");
        Ok(())
    }
}

impl Drop for MemoryLedgerTx {
    fn drop(&mut self) {
        if !self.finished && (self.has_writes() || !self.held.is_empty()) {
            debug!(
                locks = self.held.len(),
                "Memory transaction dropped before commit, rolled back"
            );
        }
        // Row locks are released when `held` drops.
    }
}
