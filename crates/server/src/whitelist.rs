//! Whitelist store
//!
//! The set of device identities allowed to attach. It starts empty, is
//! filled only through the control channel and is cleared at teardown.
//!
//! All access goes through one readers-writer lock around the whole
//! collection: decisions take the read side and run in parallel, mutations
//! take the write side and are serialized against each other and against
//! reads. A mutation is visible to every decision that starts after it
//! returns.

use common::{TraceLevel, diag_trace};
use protocol::DeviceIdentity;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Store handle shared by the decision path and the control path
pub type SharedWhitelist = Arc<WhitelistStore>;

#[derive(Debug, Default)]
struct Entries {
    /// Insertion order, for snapshots only
    order: Vec<DeviceIdentity>,
    /// Membership index
    index: HashSet<DeviceIdentity>,
}

/// Concurrency-safe set of permitted identities
#[derive(Debug, Default)]
pub struct WhitelistStore {
    entries: RwLock<Entries>,
}

impl WhitelistStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store ready to be shared
    pub fn shared() -> SharedWhitelist {
        Arc::new(Self::new())
    }

    // A panic while holding the lock cannot leave `order` and `index` out of
    // step (each mutation touches the index first and bails out early), so a
    // poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an identity
    ///
    /// Returns `false` if it was already present; the store is unchanged in
    /// that case.
    pub fn insert(&self, identity: DeviceIdentity) -> bool {
        let added = {
            let mut entries = self.write();
            let added = entries.index.insert(identity.clone());
            if added {
                entries.order.push(identity.clone());
            }
            added
        };

        // Traced with the lock released
        if added {
            diag_trace!(TraceLevel::Notice, "whitelist add {}", identity);
        } else {
            diag_trace!(TraceLevel::Debug, "whitelist already holds {}", identity);
        }
        added
    }

    /// Remove an identity
    ///
    /// Returns `false` if it was not present.
    pub fn remove(&self, identity: &DeviceIdentity) -> bool {
        let removed = {
            let mut entries = self.write();
            let removed = entries.index.remove(identity);
            if removed {
                entries.order.retain(|entry| entry != identity);
            }
            removed
        };

        if removed {
            diag_trace!(TraceLevel::Notice, "whitelist remove {}", identity);
        } else {
            diag_trace!(TraceLevel::Debug, "whitelist has no {}", identity);
        }
        removed
    }

    /// Exact-match membership test
    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.read().index.contains(identity)
    }

    /// Copy of all entries in insertion order
    pub fn snapshot(&self) -> Vec<DeviceIdentity> {
        self.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().index.is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let count = {
            let mut entries = self.write();
            entries.order.clear();
            std::mem::take(&mut entries.index).len()
        };
        diag_trace!(TraceLevel::Notice, "whitelist cleared ({} entries)", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    fn id(pid: u16, serial: &str) -> DeviceIdentity {
        DeviceIdentity::new(0x0930, pid, serial)
    }

    #[test]
    fn test_starts_empty() {
        let store = WhitelistStore::new();
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
        assert!(!store.contains(&id(1, "A")));
    }

    #[test]
    fn test_insert_is_idempotent() {
        let store = WhitelistStore::new();
        assert!(store.insert(id(1, "A")));
        assert!(!store.insert(id(1, "A")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot(), vec![id(1, "A")]);
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let store = WhitelistStore::new();
        store.insert(id(3, "C"));
        store.insert(id(1, "A"));
        store.insert(id(2, "B"));
        store.remove(&id(1, "A"));
        store.insert(id(1, "A"));

        assert_eq!(store.snapshot(), vec![id(3, "C"), id(2, "B"), id(1, "A")]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let store = WhitelistStore::new();
        store.insert(id(1, "A"));
        assert!(!store.remove(&id(1, "B")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_serial_is_distinct() {
        let store = WhitelistStore::new();
        store.insert(id(1, ""));
        assert!(store.contains(&id(1, "")));
        assert!(!store.contains(&id(1, "A")));
    }

    #[test]
    fn test_clear() {
        let store = WhitelistStore::new();
        store.insert(id(1, "A"));
        store.insert(id(2, "B"));
        store.clear();
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_inserts_leave_no_duplicates() {
        let store = WhitelistStore::shared();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for pid in 0..100 {
                        store.insert(id(pid, "S"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 100);
        assert_eq!(store.snapshot().len(), 100);
    }

    /// Records, for each trace write, whether the store lock was free
    #[derive(Clone)]
    struct LockCheckingWriter {
        store: SharedWhitelist,
        lock_free: Arc<Mutex<Vec<bool>>>,
    }

    impl io::Write for LockCheckingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let free = self.store.entries.try_write().is_ok();
            self.lock_free.lock().unwrap().push(free);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LockCheckingWriter {
        type Writer = LockCheckingWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_mutations_trace_after_releasing_lock() {
        common::set_trace_level(TraceLevel::Debug);
        let store = WhitelistStore::shared();
        let writer = LockCheckingWriter {
            store: store.clone(),
            lock_free: Arc::new(Mutex::new(Vec::new())),
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            store.insert(id(1, "A"));
            store.insert(id(1, "A"));
            store.remove(&id(1, "A"));
            store.remove(&id(1, "A"));
            store.clear();
        });

        let lock_free = writer.lock_free.lock().unwrap();
        assert!(lock_free.len() >= 5, "{} writes", lock_free.len());
        assert!(lock_free.iter().all(|free| *free));
    }
}
