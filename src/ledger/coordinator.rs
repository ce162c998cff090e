//! Transfer Transaction Coordinator
//!
//! The only entry point for moving funds. One call is one attempt:
//!
//! 1. insert the transfer row
//! 2. insert the debit and credit entries
//! 3. lock and update both balances, lower account ID first
//! 4. commit
//!
//! Any failure in 1-3 rolls the whole transaction back. If the calling
//! future is dropped before commit the open transaction is dropped with it,
//! which also rolls back. Retrying on `SerializationFailure` is the caller's
//! decision; two identical calls produce two transfers.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::balance::BalanceMutator;
use super::error::LedgerError;
use super::lock_order::LockOrder;
use super::models::{CreateEntryParams, CreateTransferParams, TransferResult};
use super::state::TransferPhase;
use super::store::{LedgerStore, LedgerTx};
use crate::core_types::{AccountId, MinorUnits};

pub struct TransferCoordinator<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> Clone for TransferCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: LedgerStore> TransferCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Preconditions checked before any write.
    pub fn validate(
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: MinorUnits,
    ) -> Result<(), LedgerError> {
        if from_account_id == to_account_id {
            return Err(LedgerError::InvalidArgument(format!(
                "cannot transfer from account {} to itself",
                from_account_id
            )));
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "amount must be greater than zero: got {}",
                amount
            )));
        }
        Ok(())
    }

    /// Move `amount` from one account to another in one transaction.
    pub async fn transfer(
        &self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: MinorUnits,
    ) -> Result<TransferResult, LedgerError> {
        self.attempt(from_account_id, to_account_id, amount).await.1
    }

    /// One attempt, together with the phase it ended in. Once a transaction
    /// is open the end phase is always `Committed` or `RolledBack`.
    pub(crate) async fn attempt(
        &self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: MinorUnits,
    ) -> (TransferPhase, Result<TransferResult, LedgerError>) {
        let mut phase = TransferPhase::Started;
        if let Err(e) = Self::validate(from_account_id, to_account_id, amount) {
            debug!(
                from = from_account_id,
                to = to_account_id,
                amount = amount,
                phase = %phase,
                error = %e,
                "Transfer rejected"
            );
            return (phase, Err(e));
        }
        phase = TransferPhase::Validated;

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => return (phase, Err(e)),
        };

        let outcome = Self::run(&mut tx, from_account_id, to_account_id, amount, &mut phase).await;
        let reached = phase;
        let outcome = match outcome {
            Ok(result) => match tx.commit().await {
                Ok(()) => {
                    phase = TransferPhase::Committed;
                    info!(
                        transfer_id = result.transfer.id,
                        from = from_account_id,
                        to = to_account_id,
                        amount = amount,
                        phase = %phase,
                        "Transfer committed"
                    );
                    Ok(result)
                }
                Err(e) => {
                    // A failed commit leaves nothing applied.
                    phase = TransferPhase::RolledBack;
                    warn!(
                        from = from_account_id,
                        to = to_account_id,
                        amount = amount,
                        reached = %reached,
                        phase = %phase,
                        error = %e,
                        "Transfer commit failed"
                    );
                    Err(e)
                }
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    // The connection discards the transaction anyway.
                    error!(error = %rollback_err, "Rollback failed");
                }
                phase = TransferPhase::RolledBack;
                warn!(
                    from = from_account_id,
                    to = to_account_id,
                    amount = amount,
                    reached = %reached,
                    discarded_writes = reached.is_in_transaction(),
                    phase = %phase,
                    error = %e,
                    "Transfer failed, rolled back"
                );
                Err(e)
            }
        };

        debug_assert!(phase.is_terminal());
        (phase, outcome)
    }

    async fn run(
        tx: &mut S::Tx,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: MinorUnits,
        phase: &mut TransferPhase,
    ) -> Result<TransferResult, LedgerError> {
        let transfer = tx
            .create_transfer(CreateTransferParams {
                from_account_id,
                to_account_id,
                amount,
            })
            .await?;
        *phase = TransferPhase::InsertedTransfer;
        debug!(transfer_id = transfer.id, phase = %phase, "Transfer row inserted");

        let from_entry = tx
            .create_entry(CreateEntryParams {
                account_id: from_account_id,
                amount: -amount,
            })
            .await?;
        let to_entry = tx
            .create_entry(CreateEntryParams {
                account_id: to_account_id,
                amount,
            })
            .await?;
        *phase = TransferPhase::InsertedEntries;
        debug!(transfer_id = transfer.id, phase = %phase, "Entries inserted");

        let order = LockOrder::resolve(from_account_id, to_account_id);
        let delta = |id: AccountId| if id == from_account_id { -amount } else { amount };

        let first = BalanceMutator::apply(tx, order.first, delta(order.first)).await?;
        *phase = TransferPhase::LockedLower;
        let second = BalanceMutator::apply(tx, order.second, delta(order.second)).await?;
        *phase = TransferPhase::LockedHigher;
        debug!(transfer_id = transfer.id, phase = %phase, "Balances updated");

        let (from_account, to_account) = if order.first == from_account_id {
            (first, second)
        } else {
            (second, first)
        };

        Ok(TransferResult {
            transfer,
            from_account,
            to_account,
            from_entry,
            to_entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryLedgerStore;
    use crate::ledger::models::{Account, CreateAccountParams};

    async fn open(store: &MemoryLedgerStore, owner: &str, balance: MinorUnits) -> Account {
        let mut tx = store.begin().await.unwrap();
        let account = tx
            .create_account(CreateAccountParams {
                owner: owner.to_string(),
                balance,
                currency: "USD".to_string(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        account
    }

    fn coordinator(store: &MemoryLedgerStore) -> TransferCoordinator<MemoryLedgerStore> {
        TransferCoordinator::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_transfer_scenario() {
        let store = MemoryLedgerStore::new();
        let a = open(&store, "alice", 100).await;
        let b = open(&store, "bob", 100).await;

        let result = coordinator(&store).transfer(a.id, b.id, 30).await.unwrap();

        assert_eq!(result.transfer.from_account_id, a.id);
        assert_eq!(result.transfer.to_account_id, b.id);
        assert_eq!(result.transfer.amount, 30);
        assert_eq!(result.from_account.balance, 70);
        assert_eq!(result.to_account.balance, 130);
        assert_eq!((result.from_entry.account_id, result.from_entry.amount), (a.id, -30));
        assert_eq!((result.to_entry.account_id, result.to_entry.amount), (b.id, 30));
        assert!(result.is_balanced());

        assert_eq!(store.account(a.id).unwrap().balance, 70);
        assert_eq!(store.account(b.id).unwrap().balance, 130);
        assert_eq!(store.transfer_count(), 1);
        assert_eq!(store.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_higher_to_lower_transfer_maps_accounts_back() {
        let store = MemoryLedgerStore::new();
        let low = open(&store, "alice", 0).await;
        let high = open(&store, "bob", 50).await;

        let result = coordinator(&store).transfer(high.id, low.id, 20).await.unwrap();

        assert_eq!(result.from_account.id, high.id);
        assert_eq!(result.from_account.balance, 30);
        assert_eq!(result.to_account.id, low.id);
        assert_eq!(result.to_account.balance, 20);
    }

    #[tokio::test]
    async fn test_invalid_arguments_write_nothing() {
        let store = MemoryLedgerStore::new();
        let a = open(&store, "alice", 100).await;
        let b = open(&store, "bob", 100).await;
        let coordinator = coordinator(&store);

        for (from, to, amount) in [(a.id, a.id, 10), (a.id, b.id, 0), (a.id, b.id, -5)] {
            let err = coordinator.transfer(from, to, amount).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidArgument(_)));
        }

        assert_eq!(store.transfer_count(), 0);
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.account(a.id).unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_missing_destination_is_not_found() {
        let store = MemoryLedgerStore::new();
        let a = open(&store, "alice", 100).await;

        let err = coordinator(&store).transfer(a.id, 404, 10).await.unwrap_err();

        assert!(matches!(err, LedgerError::NotFound(_)));
        assert_eq!(store.transfer_count(), 0);
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.account(a.id).unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_failure_after_first_balance_update_rolls_back_everything() {
        let store = MemoryLedgerStore::new();
        // Lower ID is debited first, then crediting the higher ID overflows.
        let a = open(&store, "alice", 100).await;
        let b = open(&store, "bob", i64::MAX).await;

        let err = coordinator(&store).transfer(a.id, b.id, 1).await.unwrap_err();

        assert!(matches!(err, LedgerError::Internal(_)));
        assert_eq!(store.account(a.id).unwrap().balance, 100);
        assert_eq!(store.account(b.id).unwrap().balance, i64::MAX);
        assert_eq!(store.transfer_count(), 0);
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_calls_are_not_idempotent() {
        let store = MemoryLedgerStore::new();
        let a = open(&store, "alice", 100).await;
        let b = open(&store, "bob", 100).await;
        let coordinator = coordinator(&store);

        let first = coordinator.transfer(a.id, b.id, 10).await.unwrap();
        let second = coordinator.transfer(a.id, b.id, 10).await.unwrap();

        assert_ne!(first.transfer.id, second.transfer.id);
        assert_eq!(store.transfer_count(), 2);
        assert_eq!(store.account(a.id).unwrap().balance, 80);
    }

    #[tokio::test]
    async fn test_attempt_end_phases() {
        let store = MemoryLedgerStore::new();
        let a = open(&store, "alice", 100).await;
        let b = open(&store, "bob", i64::MAX).await;
        let coordinator = coordinator(&store);

        let (phase, result) = coordinator.attempt(b.id, a.id, 1).await;
        assert!(result.is_ok());
        assert_eq!(phase, TransferPhase::Committed);

        // Crediting b overflows after a was already debited.
        let (phase, result) = coordinator.attempt(a.id, b.id, 2).await;
        assert!(matches!(result, Err(LedgerError::Internal(_))));
        assert_eq!(phase, TransferPhase::RolledBack);
        assert_eq!(store.account(a.id).unwrap().balance, 101);

        // Missing row fails on the first insert, still inside the transaction.
        let (phase, result) = coordinator.attempt(a.id, 404, 1).await;
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
        assert_eq!(phase, TransferPhase::RolledBack);

        let (phase, result) = coordinator.attempt(a.id, a.id, 1).await;
        assert!(matches!(result, Err(LedgerError::InvalidArgument(_))));
        assert_eq!(phase, TransferPhase::Started);
    }
}
