//! PostgreSQL Ledger Store
//!
//! sqlx-backed implementation of [`LedgerStore`]. Row locks are taken with
//! `SELECT ... FOR NO KEY UPDATE`: it still excludes concurrent balance
//! writers, but does not conflict with the `KEY SHARE` locks that the
//! foreign-key checks of concurrent entry/transfer inserts take on the same
//! account rows.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::debug;

use super::error::{LedgerError, sqlstate, sqlstate_of};
use super::models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Transfer, UpdateAccountParams,
};
use super::store::{LedgerStore, LedgerTx};
use super::validation::check_query_bounds;
use crate::core_types::{AccountId, EntryId, TransferId};

/// Ledger store over a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Option<Duration>,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: None,
        }
    }

    /// Abort lock waits after `timeout` (SQLSTATE 55P03, surfaced as
    /// `SerializationFailure`).
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    async fn begin(&self) -> Result<PgLedgerTx, LedgerError> {
        let mut tx = self.pool.begin().await?;

        if let Some(timeout) = self.lock_timeout {
            // SET does not accept bind parameters; the value is an integer we format ourselves.
            sqlx::query(&format!("SET LOCAL lock_timeout = {}", timeout.as_millis()))
                .execute(&mut *tx)
                .await?;
        }

        Ok(PgLedgerTx { tx })
    }
}

/// One open PostgreSQL transaction
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn create_account(
        &mut self,
        params: CreateAccountParams,
    ) -> Result<Account, LedgerError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (owner, balance, currency)
            VALUES ($1, $2, $3)
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(&params.owner)
        .bind(params.balance)
        .bind(&params.currency)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(account)
    }

    async fn get_account(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(id))
    }

    async fn get_account_for_update(&mut self, id: AccountId) -> Result<Account, LedgerError> {
        debug!(account_id = id, "Locking account row");
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            FOR NO KEY UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(id))
    }

    async fn list_accounts(
        &mut self,
        params: &ListAccountsParams,
    ) -> Result<Vec<Account>, LedgerError> {
        check_query_bounds(params.limit, params.offset)?;

        let accounts = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE ($1::text IS NULL OR owner = $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(params.owner.as_deref())
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(accounts)
    }

    async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET balance = $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(params.id)
        .bind(params.balance)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(params.id))
    }

    async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> Result<Account, LedgerError> {
        sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET balance = balance + $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(params.id)
        .bind(params.amount)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::account_not_found(params.id))
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                // Here an FK violation means the account is still referenced,
                // not that a referenced row is missing.
                if sqlstate_of(&e).as_deref() == Some(sqlstate::FOREIGN_KEY_VIOLATION) {
                    LedgerError::Conflict(format!("account {} is referenced by the ledger", id))
                } else {
                    LedgerError::from(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::account_not_found(id));
        }
        Ok(())
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError> {
        let entry = sqlx::query_as::<_, Entry>(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(params.account_id)
        .bind(params.amount)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(entry)
    }

    async fn get_entry(&mut self, id: EntryId) -> Result<Entry, LedgerError> {
        sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("entry {}", id)))
    }

    async fn list_entries(
        &mut self,
        params: &ListEntriesParams,
    ) -> Result<Vec<Entry>, LedgerError> {
        check_query_bounds(params.limit, params.offset)?;

        let entries = sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE account_id = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(params.account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(entries)
    }

    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.amount)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(transfer)
    }

    async fn get_transfer(&mut self, id: TransferId) -> Result<Transfer, LedgerError> {
        sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("transfer {}", id)))
    }

    async fn list_transfers(
        &mut self,
        params: &ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        check_query_bounds(params.limit, params.offset)?;

        let transfers = sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE from_account_id = $1 OR to_account_id = $2
            ORDER BY id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(transfers)
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
