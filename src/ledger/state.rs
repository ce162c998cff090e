//! Transfer attempt phases
//!
//! ```text
//! Started → Validated → InsertedTransfer → InsertedEntries → LockedLower → LockedHigher → Committed
//!                              └──────────────┴────────────────┴──────────────┴─────→ RolledBack
//! ```
//!
//! Phases are not persisted; a transfer attempt either commits as a whole
//! or leaves nothing behind. They exist so failures can report how far the
//! attempt got.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferPhase {
    Started,
    /// Preconditions checked, no transaction yet
    Validated,
    InsertedTransfer,
    InsertedEntries,
    /// Lower-ID account locked and updated
    LockedLower,
    /// Higher-ID account locked and updated
    LockedHigher,
    /// Terminal: transaction committed
    Committed,
    /// Terminal: transaction rolled back, no trace left
    RolledBack,
}

impl TransferPhase {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferPhase::Committed | TransferPhase::RolledBack)
    }

    /// Inside the database transaction (a failure here triggers rollback)
    #[inline]
    pub fn is_in_transaction(&self) -> bool {
        matches!(
            self,
            TransferPhase::InsertedTransfer
                | TransferPhase::InsertedEntries
                | TransferPhase::LockedLower
                | TransferPhase::LockedHigher
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::Started => "STARTED",
            TransferPhase::Validated => "VALIDATED",
            TransferPhase::InsertedTransfer => "INSERTED_TRANSFER",
            TransferPhase::InsertedEntries => "INSERTED_ENTRIES",
            TransferPhase::LockedLower => "LOCKED_LOWER",
            TransferPhase::LockedHigher => "LOCKED_HIGHER",
            TransferPhase::Committed => "COMMITTED",
            TransferPhase::RolledBack => "ROLLED_BACK",
        }
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(TransferPhase::Committed.is_terminal());
        assert!(TransferPhase::RolledBack.is_terminal());

        assert!(!TransferPhase::Started.is_terminal());
        assert!(!TransferPhase::Validated.is_terminal());
        assert!(!TransferPhase::LockedHigher.is_terminal());
    }

    #[test]
    fn test_in_transaction_phases() {
        assert!(TransferPhase::InsertedTransfer.is_in_transaction());
        assert!(TransferPhase::LockedLower.is_in_transaction());

        assert!(!TransferPhase::Validated.is_in_transaction());
        assert!(!TransferPhase::Committed.is_in_transaction());
    }

    #[test]
    fn test_display() {
        assert_eq!(TransferPhase::Started.to_string(), "STARTED");
        assert_eq!(TransferPhase::LockedLower.to_string(), "LOCKED_LOWER");
        assert_eq!(TransferPhase::RolledBack.to_string(), "ROLLED_BACK");
    }
}
