//! Transactions.
//!
//! A session has at most one active transaction. Beginning a transaction
//! while one is active returns a *participating* handle: committing it
//! defers to the outer transaction, rolling it back marks the whole
//! transaction rollback-only. Only the outer handle ends the transaction.

mod state;

pub(crate) use state::TransactionInner;
pub use state::TransactionState;

use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use std::sync::Arc;
use tracing::{trace, warn};

/// Handle to a session's transaction.
///
/// `commit` and `rollback` consume the handle. Dropping an outer handle
/// while the transaction is still active rolls it back.
#[derive(Debug)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
    participating: bool,
}

impl Transaction {
    pub(crate) fn outer(inner: Arc<TransactionInner>) -> Self {
        Self {
            inner,
            participating: false,
        }
    }

    pub(crate) fn participating(inner: Arc<TransactionInner>) -> Self {
        Self {
            inner,
            participating: true,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.inner.id()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.inner.state()
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Whether this handle joined a transaction begun earlier.
    #[must_use]
    pub fn is_participating(&self) -> bool {
        self.participating
    }

    /// Marks the transaction so that it can only roll back.
    pub fn set_rollback_only(&self) {
        self.inner.set_rollback_only();
    }

    /// Whether the transaction has been marked rollback-only.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.inner.is_rollback_only()
    }

    /// Commits the transaction.
    ///
    /// For a participating handle this only checks the transaction is still
    /// active; the outer handle performs the commit.
    pub fn commit(self) -> CoreResult<()> {
        if self.participating {
            trace!(txn = %self.id(), "participating commit deferred to outer transaction");
            return if self.inner.is_active() {
                Ok(())
            } else {
                Err(CoreError::invalid_operation(
                    "transaction is no longer active",
                ))
            };
        }
        self.inner.commit()
    }

    /// Rolls the transaction back.
    ///
    /// For a participating handle this marks the transaction rollback-only.
    pub fn rollback(self) -> CoreResult<()> {
        if self.participating {
            trace!(txn = %self.id(), "participating rollback marks transaction rollback-only");
            self.inner.set_rollback_only();
            return Ok(());
        }
        self.inner.rollback()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.participating && self.inner.is_active() {
            warn!(txn = %self.inner.id(), "transaction dropped while active, rolling back");
            if let Err(e) = self.inner.rollback() {
                warn!(txn = %self.inner.id(), error = %e, "rollback on drop failed");
            }
        }
    }
}
