//! Bank Service
//!
//! The caller layer around the ledger core, minus any transport. It owns the
//! checks that sit in front of a transfer (both accounts exist, currencies
//! match the request, the caller owns the source account) and the retry
//! policy for serialization failures. The coordinator underneath stays a
//! single attempt per call.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::core_types::{AccountId, MinorUnits};
use crate::ledger::models::{CreateAccountParams, ListAccountsParams, ListEntriesParams};
use crate::ledger::validation::{Currency, Page};
use crate::ledger::{
    Account, Entry, LedgerError, LedgerStore, LedgerTx, TransferCoordinator, TransferResult,
};

/// Transfer as requested by an authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: MinorUnits,
    pub currency: String,
}

pub struct BankService<S: LedgerStore> {
    store: Arc<S>,
    coordinator: TransferCoordinator<S>,
    retry: TransferConfig,
}

impl<S: LedgerStore> BankService<S> {
    pub fn new(store: Arc<S>, retry: TransferConfig) -> Self {
        Self {
            coordinator: TransferCoordinator::new(store.clone()),
            store,
            retry,
        }
    }

    pub fn coordinator(&self) -> &TransferCoordinator<S> {
        &self.coordinator
    }

    /// Open a zero-balance account. One account per owner and currency.
    pub async fn open_account(&self, owner: &str, currency: &str) -> Result<Account, LedgerError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(LedgerError::InvalidArgument("owner is required".to_string()));
        }
        let currency = Currency::new(currency)?;

        let mut tx = self.store.begin().await?;
        let account = tx
            .create_account(CreateAccountParams {
                owner: owner.to_string(),
                balance: 0,
                currency: currency.into_string(),
            })
            .await?;
        tx.commit().await?;

        info!(account_id = account.id, owner = %account.owner, currency = %account.currency, "Account opened");
        Ok(account)
    }

    /// Fetch an account the caller owns.
    pub async fn account_for_owner(
        &self,
        owner: &str,
        account_id: AccountId,
    ) -> Result<Account, LedgerError> {
        let account = self.get_account(account_id).await?;
        if account.owner != owner {
            return Err(LedgerError::Forbidden(
                "account does not belong to the authenticated user".to_string(),
            ));
        }
        Ok(account)
    }

    /// One page of the caller's accounts, `page_id` starting at 1.
    pub async fn accounts_for_owner(
        &self,
        owner: &str,
        page_id: i64,
        page_size: i64,
    ) -> Result<Vec<Account>, LedgerError> {
        let page = Page::new(page_id, page_size)?;

        let mut tx = self.store.begin().await?;
        let accounts = tx
            .list_accounts(&ListAccountsParams {
                owner: Some(owner.to_string()),
                limit: page.limit,
                offset: page.offset,
            })
            .await?;
        tx.commit().await?;
        Ok(accounts)
    }

    /// One page of ledger entries on an account the caller owns.
    pub async fn entries_for_owner(
        &self,
        owner: &str,
        account_id: AccountId,
        page_id: i64,
        page_size: i64,
    ) -> Result<Vec<Entry>, LedgerError> {
        let page = Page::new(page_id, page_size)?;
        self.account_for_owner(owner, account_id).await?;

        let mut tx = self.store.begin().await?;
        let entries = tx
            .list_entries(&ListEntriesParams {
                account_id,
                limit: page.limit,
                offset: page.offset,
            })
            .await?;
        tx.commit().await?;
        Ok(entries)
    }

    /// Check the request, then run the transfer, retrying serialization
    /// failures up to `max_retries` times.
    pub async fn transfer(
        &self,
        owner: &str,
        req: &TransferRequest,
    ) -> Result<TransferResult, LedgerError> {
        TransferCoordinator::<S>::validate(req.from_account_id, req.to_account_id, req.amount)?;
        let currency = Currency::new(&req.currency)?;

        let from = self.valid_account(req.from_account_id, &currency).await?;
        if from.owner != owner {
            return Err(LedgerError::Forbidden(
                "you are not the owner of this account".to_string(),
            ));
        }
        self.valid_account(req.to_account_id, &currency).await?;

        let mut attempt = 0;
        loop {
            match self
                .coordinator
                .transfer(req.from_account_id, req.to_account_id, req.amount)
                .await
            {
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let backoff = self.backoff(attempt);
                    warn!(
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transfer conflicted, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                other => return other,
            }
        }
    }

    async fn get_account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let mut tx = self.store.begin().await?;
        let account = tx.get_account(account_id).await?;
        tx.commit().await?;
        Ok(account)
    }

    async fn valid_account(
        &self,
        account_id: AccountId,
        currency: &Currency,
    ) -> Result<Account, LedgerError> {
        let account = self.get_account(account_id).await?;
        if account.currency != currency.as_str() {
            debug!(account_id = account_id, "Currency mismatch");
            return Err(LedgerError::CurrencyMismatch {
                expected: account.currency,
                got: currency.to_string(),
            });
        }
        Ok(account)
    }

    /// Linear backoff with up to 100% random jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry.retry_backoff_ms.saturating_mul(attempt as u64);
        let jitter = if base > 0 {
            rand::thread_rng().gen_range(0..=base)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}
