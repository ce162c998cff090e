//! Ledger rows and query parameters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, EntryId, MinorUnits, TransferId};

/// Account row
///
/// `balance` always equals the signed sum of the account's entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub balance: MinorUnits,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// One signed balance movement on one account. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Entry {
    pub id: EntryId,
    pub account_id: AccountId,
    /// Negative for debits, positive for credits
    pub amount: MinorUnits,
    pub created_at: DateTime<Utc>,
}

/// One funds movement between two distinct accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    /// Absolute magnitude moved, always > 0
    pub amount: MinorUnits,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAccountParams {
    pub owner: String,
    pub balance: MinorUnits,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAccountsParams {
    /// `None` lists every owner's accounts
    pub owner: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateAccountParams {
    pub id: AccountId,
    pub balance: MinorUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddAccountBalanceParams {
    pub id: AccountId,
    pub amount: MinorUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateEntryParams {
    pub account_id: AccountId,
    pub amount: MinorUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntriesParams {
    pub account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateTransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: MinorUnits,
}

/// Matches transfers sent by `from_account_id` OR received by `to_account_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListTransfersParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

/// Everything a committed transfer produced, returned as one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

impl TransferResult {
    /// Double-entry check: two legs that cancel out and match the transfer.
    pub fn is_balanced(&self) -> bool {
        self.from_entry.amount + self.to_entry.amount == 0
            && self.from_entry.amount == -self.transfer.amount
            && self.from_entry.account_id == self.transfer.from_account_id
            && self.to_entry.account_id == self.transfer.to_account_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(from_leg: MinorUnits, to_leg: MinorUnits) -> TransferResult {
        let now = Utc::now();
        let account = |id| Account {
            id,
            owner: "alice".to_string(),
            balance: 0,
            currency: "USD".to_string(),
            created_at: now,
        };
        let entry = |id, account_id, amount| Entry {
            id,
            account_id,
            amount,
            created_at: now,
        };
        TransferResult {
            transfer: Transfer {
                id: 1,
                from_account_id: 1,
                to_account_id: 2,
                amount: 30,
                created_at: now,
            },
            from_account: account(1),
            to_account: account(2),
            from_entry: entry(1, 1, from_leg),
            to_entry: entry(2, 2, to_leg),
        }
    }

    #[test]
    fn test_balanced_result() {
        assert!(result(-30, 30).is_balanced());
    }

    #[test]
    fn test_unbalanced_result() {
        assert!(!result(-30, 20).is_balanced());
        assert!(!result(30, -30).is_balanced());
    }

    #[test]
    fn test_transfer_result_serializes_all_parts() {
        let json = serde_json::to_value(result(-30, 30)).unwrap();
        assert_eq!(json["transfer"]["amount"], 30);
        assert_eq!(json["from_entry"]["amount"], -30);
        assert_eq!(json["to_account"]["id"], 2);
    }
}
