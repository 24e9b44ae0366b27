// ── Durable storage contracts ──
//
// The core depends only on a byte-oriented key-value store plus named
// append-only logs. Typed JSON access lives in `StoreExt`.

mod file;
mod memory;

#[cfg(test)]
pub(crate) mod flaky;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::PersistenceError;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Well-known keys and log names.
pub mod keys {
    pub const LEDGER_BASELINE: &str = "ledger.baseline";
    pub const LEDGER_TOTALS: &str = "ledger.totals";
    pub const LEDGER_TRACKING_SINCE: &str = "ledger.tracking_since";
    pub const LEDGER_DAILY: &str = "ledger.daily";

    pub const TRAFFIC_LOG: &str = "traffic";
    pub const INCIDENT_LOG: &str = "incidents";
    pub const SLEEP_SESSION_LOG: &str = "sleep_sessions";
}

/// Durable key-value and append-log storage.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Bytes>, PersistenceError>;

    fn set(&self, key: &str, value: Bytes) -> Result<(), PersistenceError>;

    fn append(&self, log: &str, record: Bytes) -> Result<(), PersistenceError>;

    /// All records of `log`, oldest first, for which `predicate` holds.
    fn query(
        &self,
        log: &str,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<Bytes>, PersistenceError>;

    /// The longest run of trailing records of `log` that all satisfy
    /// `predicate`, oldest first. Stops reading at the first record,
    /// walking back from the end, for which it fails.
    fn tail(
        &self,
        log: &str,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<Bytes>, PersistenceError> {
        let mut records = self.query(log, &|_| true)?;
        let keep = records.iter().rev().take_while(|r| predicate(r)).count();
        Ok(records.split_off(records.len() - keep))
    }

    fn clear_log(&self, log: &str) -> Result<(), PersistenceError>;
}

/// Typed JSON helpers over any [`Store`].
pub trait StoreExt: Store {
    /// Decode a JSON value. A missing key yields `Ok(None)`; a corrupt one
    /// yields `Err(Decode)` so callers can choose their fallback.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| PersistenceError::Decode {
                key: key.to_owned(),
                source,
            })
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_vec(value).map_err(|source| PersistenceError::Encode {
            key: key.to_owned(),
            source,
        })?;
        self.set(key, Bytes::from(encoded))
    }

    fn append_json<T: Serialize + ?Sized>(&self, log: &str, record: &T) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_vec(record).map_err(|source| PersistenceError::Encode {
            key: log.to_owned(),
            source,
        })?;
        self.append(log, Bytes::from(encoded))
    }

    /// Decode every record of `log` that satisfies `predicate`. Records
    /// that fail to decode (e.g. a torn final write) are skipped.
    fn query_json<T: DeserializeOwned>(
        &self,
        log: &str,
        predicate: impl Fn(&T) -> bool,
    ) -> Result<Vec<T>, PersistenceError> {
        let raw = self.query(log, &|_| true)?;
        let mut out = Vec::with_capacity(raw.len());
        for record in raw {
            match serde_json::from_slice::<T>(&record) {
                Ok(value) if predicate(&value) => out.push(value),
                Ok(_) => {}
                Err(e) => warn!(log, error = %e, "skipping undecodable log record"),
            }
        }
        Ok(out)
    }

    /// Decode the trailing records of `log` that satisfy `predicate`.
    /// Undecodable records do not end the run; they are skipped.
    fn tail_json<T: DeserializeOwned>(
        &self,
        log: &str,
        predicate: impl Fn(&T) -> bool,
    ) -> Result<Vec<T>, PersistenceError> {
        let raw = self.tail(log, &|record| {
            serde_json::from_slice::<T>(record).map_or(true, |value| predicate(&value))
        })?;
        let mut out = Vec::with_capacity(raw.len());
        for record in raw {
            match serde_json::from_slice::<T>(&record) {
                Ok(value) => out.push(value),
                Err(e) => warn!(log, error = %e, "skipping undecodable log record"),
            }
        }
        Ok(out)
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

pub(crate) fn validate_name(name: &str) -> Result<(), PersistenceError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && !name.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(PersistenceError::InvalidKey {
            key: name.to_owned(),
            reason: "expected ASCII letters, digits, '.', '_' or '-'".into(),
        })
    }
}
