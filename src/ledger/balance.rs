//! Balance Mutator
//!
//! Read-modify-write of one account balance under its row lock. The lock
//! is taken by the locking read and held until the surrounding transaction
//! ends, so no other transaction observes or changes the row in between.
//! No entry is written here; recording the ledger legs is the caller's job.

use tracing::debug;

use super::error::LedgerError;
use super::models::{Account, UpdateAccountParams};
use super::store::LedgerTx;
use crate::core_types::{AccountId, MinorUnits};

pub struct BalanceMutator;

impl BalanceMutator {
    /// Add `delta` (negative to debit) to the account's balance and return
    /// the updated row.
    pub async fn apply<T: LedgerTx>(
        tx: &mut T,
        account_id: AccountId,
        delta: MinorUnits,
    ) -> Result<Account, LedgerError> {
        let account = tx.get_account_for_update(account_id).await?;

        let balance = account.balance.checked_add(delta).ok_or_else(|| {
            LedgerError::Internal(format!(
                "balance of account {} out of range: {} + {}",
                account_id, account.balance, delta
            ))
        })?;

        let updated = tx
            .update_account(UpdateAccountParams {
                id: account_id,
                balance,
            })
            .await?;

        debug!(
            account_id = account_id,
            delta = delta,
            before = account.balance,
            after = updated.balance,
            "Balance applied"
        );
        Ok(updated)
    }
}
