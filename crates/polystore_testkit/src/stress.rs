//! Stress tests for polystore.
//!
//! These helpers drive a datastore from several threads, each with its own
//! session, and report what succeeded.

use crate::fixtures::{Person, PERSONS};
use polystore_core::{CoreError, Datastore};
use polystore_memory::MemoryDatastore;
use polystore_model::{Identifier, Record};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads, one session each.
    pub threads: usize,
    /// How long a contended lock is waited for.
    pub lock_timeout: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            lock_timeout: Duration::from_millis(500),
        }
    }
}

/// Stores records from every thread concurrently. Returns the identifiers
/// of every successful store.
pub fn stress_concurrent_store(
    datastore: &Arc<MemoryDatastore>,
    config: &StressConfig,
) -> (StressTestResult, Vec<Identifier>) {
    let failed = Arc::new(AtomicUsize::new(0));
    let stored = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|thread_id| {
            let datastore = Arc::clone(datastore);
            let failed = Arc::clone(&failed);
            let stored = Arc::clone(&stored);
            let operations = config.operations;
            thread::spawn(move || {
                let mut session = datastore.connect(None).expect("Failed to open session");
                let mut ids = Vec::with_capacity(operations);
                for i in 0..operations {
                    let mut record = Record::new()
                        .with("thread", thread_id as i64)
                        .with("seq", i as i64);
                    match session.store(PERSONS, &mut record) {
                        Ok(id) => ids.push(id),
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                stored.lock().expect("poisoned").extend(ids);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let ids = std::mem::take(&mut *stored.lock().expect("poisoned"));
    let result = StressTestResult::new(ids.len(), failed.load(Ordering::Relaxed), start.elapsed());
    (result, ids)
}

/// Has every thread lock, update and unlock the same person repeatedly.
///
/// A lock timeout counts as a failed operation; any other error panics.
pub fn stress_lock_contention(
    datastore: &Arc<MemoryDatastore>,
    config: &StressConfig,
) -> (StressTestResult, Identifier) {
    let id = {
        let mut session = datastore.connect(None).expect("Failed to open session");
        session
            .persist(&mut Person::new("Contended", "Lock", 0))
            .expect("Failed to persist person")
    };

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let datastore = Arc::clone(datastore);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let id = id.clone();
            let config = config.clone();
            thread::spawn(move || {
                let mut session = datastore.connect(None).expect("Failed to open session");
                for _ in 0..config.operations {
                    match session.lock("person", &id, Some(config.lock_timeout)) {
                        Ok(()) => {}
                        Err(CoreError::LockTimeout { .. }) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                        Err(e) => panic!("lock failed: {e}"),
                    }
                    session.clear();
                    let mut person = session
                        .get::<Person>(&id)
                        .expect("Failed to load person")
                        .expect("Person disappeared");
                    person.age += 1;
                    session.persist(&mut person).expect("Failed to update person");
                    session.unlock("person", &id).expect("Failed to unlock");
                    successful.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    (result, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::entities;
    use polystore_core::DatastoreConfig;
    use std::collections::HashSet;

    fn datastore() -> Arc<MemoryDatastore> {
        Arc::new(MemoryDatastore::new(DatastoreConfig::default(), &entities()).unwrap())
    }

    #[test]
    fn concurrent_stores_lose_nothing() {
        let datastore = datastore();
        let config = StressConfig {
            operations: 200,
            threads: 4,
            ..StressConfig::default()
        };
        let (result, ids) = stress_concurrent_store(&datastore, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(ids.len(), 800);

        let unique: HashSet<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(unique.len(), 800);

        let mut session = datastore.connect(None).unwrap();
        let found = session.retrieve_all(PERSONS, &ids).unwrap();
        assert!(found.iter().all(Option::is_some));
    }

    #[test]
    fn lock_contention_serializes_updates() {
        let datastore = datastore();
        let config = StressConfig {
            operations: 50,
            threads: 4,
            lock_timeout: Duration::from_secs(10),
        };
        let (result, id) = stress_lock_contention(&datastore, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 200);

        let mut session = datastore.connect(None).unwrap();
        let person = session.get::<Person>(&id).unwrap().unwrap();
        assert_eq!(person.age, 200);
        assert_eq!(person.version, 200);
    }

    #[test]
    fn result_throughput() {
        let result = StressTestResult::new(90, 10, Duration::from_secs(2));
        assert_eq!(result.total_ops, 100);
        assert!((result.ops_per_second - 50.0).abs() < f64::EPSILON);
    }
}
