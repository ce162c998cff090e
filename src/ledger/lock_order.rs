//! Lock-ordering for the two account rows a transfer touches.
//!
//! Every transfer locks the lower account ID first. Two concurrent transfers
//! A→B and B→A therefore request the same row first, and one simply waits
//! for the other instead of each holding the row the other needs.

use crate::core_types::AccountId;

/// The two accounts of one transfer in global lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOrder {
    pub first: AccountId,
    pub second: AccountId,
}

impl LockOrder {
    /// Order `from` and `to` ascending. The pair must be distinct; self
    /// transfers are rejected before a lock order is ever needed.
    #[inline]
    pub fn resolve(from: AccountId, to: AccountId) -> Self {
        debug_assert_ne!(from, to, "lock order requires two distinct accounts");
        if from < to {
            Self {
                first: from,
                second: to,
            }
        } else {
            Self {
                first: to,
                second: from,
            }
        }
    }

    #[inline]
    pub fn as_tuple(&self) -> (AccountId, AccountId) {
        (self.first, self.second)
    }
}
