//! Pessimistic record locks.

use parking_lot::{Condvar, Mutex};
use polystore_core::{CoreError, CoreResult, SessionId};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

type LockKey = (String, i64);

#[derive(Debug, Clone, Copy)]
struct Hold {
    owner: SessionId,
    depth: usize,
}

/// Locks keyed by (entity, key), owned by sessions.
///
/// Locks are re-entrant: a session may lock a record it already holds, and
/// must unlock it as many times. Waiters block on a condvar until the
/// holder releases or the timeout elapses. There is no deadlock detection.
#[derive(Debug, Default)]
pub struct LockTable {
    holds: Mutex<HashMap<LockKey, Hold>>,
    released: Condvar,
}

impl LockTable {
    /// Acquires the lock for `owner`, waiting at most `timeout`. A timeout
    /// too large to express as a deadline waits until the lock is released.
    pub fn acquire(
        &self,
        entity: &str,
        key: i64,
        owner: SessionId,
        timeout: Duration,
    ) -> CoreResult<()> {
        let deadline = Instant::now().checked_add(timeout);
        let lock_key = (entity.to_string(), key);
        let mut holds = self.holds.lock();

        loop {
            match holds.get_mut(&lock_key) {
                None => {
                    holds.insert(lock_key, Hold { owner, depth: 1 });
                    trace!(entity, key, session = %owner, "lock acquired");
                    return Ok(());
                }
                Some(hold) if hold.owner == owner => {
                    hold.depth += 1;
                    return Ok(());
                }
                Some(hold) => {
                    let holder = hold.owner;
                    trace!(entity, key, session = %owner, %holder, "waiting for lock");
                    match deadline {
                        Some(deadline) => {
                            if Instant::now() >= deadline {
                                warn!(entity, key, session = %owner, %holder, ?timeout, "lock timed out");
                                return Err(CoreError::lock_timeout(entity, key.to_string(), timeout));
                            }
                            self.released.wait_until(&mut holds, deadline);
                        }
                        None => self.released.wait(&mut holds),
                    }
                }
            }
        }
    }

    /// Releases one level of `owner`'s hold. Returns whether `owner` held
    /// the lock; releasing a lock held by another session does nothing.
    pub fn release(&self, entity: &str, key: i64, owner: SessionId) -> bool {
        let lock_key = (entity.to_string(), key);
        let mut holds = self.holds.lock();
        let Some(hold) = holds.get_mut(&lock_key) else {
            return false;
        };
        if hold.owner != owner {
            return false;
        }
        hold.depth -= 1;
        if hold.depth == 0 {
            holds.remove(&lock_key);
            trace!(entity, key, session = %owner, "lock released");
            self.released.notify_all();
        }
        true
    }

    /// Releases every lock `owner` holds. Returns how many were held.
    pub fn release_all(&self, owner: SessionId) -> usize {
        let mut holds = self.holds.lock();
        let before = holds.len();
        holds.retain(|_, hold| hold.owner != owner);
        let released = before - holds.len();
        if released > 0 {
            debug!(session = %owner, released, "released session locks");
            self.released.notify_all();
        }
        released
    }

    /// Whether any session holds the lock.
    #[must_use]
    pub fn is_locked(&self, entity: &str, key: i64) -> bool {
        self.holds.lock().contains_key(&(entity.to_string(), key))
    }

    /// The session holding the lock, if any.
    #[must_use]
    pub fn holder(&self, entity: &str, key: i64) -> Option<SessionId> {
        self.holds
            .lock()
            .get(&(entity.to_string(), key))
            .map(|hold| hold.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const A: SessionId = SessionId::new(1);
    const B: SessionId = SessionId::new(2);

    #[test]
    fn reentrant_for_owner() {
        let table = LockTable::default();
        table.acquire("person", 1, A, Duration::ZERO).unwrap();
        table.acquire("person", 1, A, Duration::ZERO).unwrap();
        assert!(table.release("person", 1, A));
        assert!(table.is_locked("person", 1));
        assert!(table.release("person", 1, A));
        assert!(!table.is_locked("person", 1));
    }

    #[test]
    fn contended_lock_times_out() {
        let table = LockTable::default();
        table.acquire("person", 1, A, Duration::ZERO).unwrap();
        let err = table
            .acquire("person", 1, B, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { .. }));
        assert_eq!(table.holder("person", 1), Some(A));
    }

    #[test]
    fn non_owner_release_is_noop() {
        let table = LockTable::default();
        table.acquire("person", 1, A, Duration::ZERO).unwrap();
        assert!(!table.release("person", 1, B));
        assert!(table.is_locked("person", 1));
        assert!(!table.release("person", 2, A));
    }

    #[test]
    fn waiter_acquires_after_release() {
        let table = Arc::new(LockTable::default());
        table.acquire("person", 1, A, Duration::ZERO).unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.acquire("person", 1, B, Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        table.release("person", 1, A);

        waiter.join().unwrap().unwrap();
        assert_eq!(table.holder("person", 1), Some(B));
    }

    #[test]
    fn unbounded_timeout_waits_for_release() {
        let table = Arc::new(LockTable::default());
        table.acquire("person", 1, A, Duration::MAX).unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.acquire("person", 1, B, Duration::MAX))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(table.holder("person", 1), Some(A));
        table.release("person", 1, A);

        waiter.join().unwrap().unwrap();
        assert_eq!(table.holder("person", 1), Some(B));
    }

    #[test]
    fn release_all_frees_only_owner() {
        let table = LockTable::default();
        table.acquire("person", 1, A, Duration::ZERO).unwrap();
        table.acquire("person", 2, A, Duration::ZERO).unwrap();
        table.acquire("person", 3, B, Duration::ZERO).unwrap();
        assert_eq!(table.release_all(A), 2);
        assert!(!table.is_locked("person", 1));
        assert!(table.is_locked("person", 3));
    }
}
