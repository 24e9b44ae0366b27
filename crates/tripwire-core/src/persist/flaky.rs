// In-memory store whose writes can be switched off, for exercising
// retry paths.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

use super::{MemoryStore, Store};
use crate::error::PersistenceError;

#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing: AtomicBool,
    failing_sets: AtomicBool,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only key writes; appends keep working.
    pub fn set_failing_sets(&self, failing: bool) {
        self.failing_sets.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(std::io::Error::other("disk full").into())
        } else {
            Ok(())
        }
    }
}

impl Store for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, PersistenceError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Bytes) -> Result<(), PersistenceError> {
        self.check()?;
        if self.failing_sets.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("read-only file system").into());
        }
        self.inner.set(key, value)
    }

    fn append(&self, log: &str, record: Bytes) -> Result<(), PersistenceError> {
        self.check()?;
        self.inner.append(log, record)
    }

    fn query(
        &self,
        log: &str,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<Bytes>, PersistenceError> {
        self.inner.query(log, predicate)
    }

    fn clear_log(&self, log: &str) -> Result<(), PersistenceError> {
        self.check()?;
        self.inner.clear_log(log)
    }
}
