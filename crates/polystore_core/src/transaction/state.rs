//! Transaction state.

use crate::backend::TransactionResource;
use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// State shared between a session and the transaction handles it issued.
pub(crate) struct TransactionInner {
    id: TransactionId,
    state: Mutex<TransactionState>,
    rollback_only: AtomicBool,
    resource: Mutex<Option<Box<dyn TransactionResource>>>,
}

impl TransactionInner {
    pub(crate) fn new(id: TransactionId, resource: Box<dyn TransactionResource>) -> Self {
        Self {
            id,
            state: Mutex::new(TransactionState::Active),
            rollback_only: AtomicBool::new(false),
            resource: Mutex::new(Some(resource)),
        }
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    pub(crate) fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    pub(crate) fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    /// Commits, or rolls back if the transaction was marked rollback-only
    /// or the resource refuses the commit.
    pub(crate) fn commit(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        ensure_active(*state)?;
        let mut resource = self.take_resource()?;

        if self.is_rollback_only() {
            *state = TransactionState::RolledBack;
            resource.rollback()?;
            debug!(txn = %self.id, "rolled back rollback-only transaction");
            return Err(CoreError::transaction_aborted(
                "transaction was marked rollback-only",
            ));
        }

        match resource.commit() {
            Ok(()) => {
                *state = TransactionState::Committed;
                debug!(txn = %self.id, "committed");
                Ok(())
            }
            Err(e) => {
                *state = TransactionState::RolledBack;
                warn!(txn = %self.id, error = %e, "commit failed, rolling back");
                // Roll back, but don't mask the commit error
                if let Err(rollback) = resource.rollback() {
                    warn!(txn = %self.id, error = %rollback, "rollback after failed commit also failed");
                }
                Err(e)
            }
        }
    }

    pub(crate) fn rollback(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        ensure_active(*state)?;
        let mut resource = self.take_resource()?;
        *state = TransactionState::RolledBack;
        debug!(txn = %self.id, "rolled back");
        resource.rollback()
    }

    fn take_resource(&self) -> CoreResult<Box<dyn TransactionResource>> {
        self.resource
            .lock()
            .take()
            .ok_or_else(|| CoreError::invalid_operation("transaction resource already released"))
    }
}

impl std::fmt::Debug for TransactionInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionInner")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("rollback_only", &self.is_rollback_only())
            .finish_non_exhaustive()
    }
}

fn ensure_active(state: TransactionState) -> CoreResult<()> {
    match state {
        TransactionState::Active => Ok(()),
        TransactionState::Committed => Err(CoreError::invalid_operation(
            "transaction already committed",
        )),
        TransactionState::RolledBack => Err(CoreError::invalid_operation(
            "transaction already rolled back",
        )),
    }
}
