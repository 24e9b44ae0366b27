// ── In-memory store ──

use bytes::Bytes;
use dashmap::DashMap;

use super::{Store, validate_name};
use crate::error::PersistenceError;

/// Volatile [`Store`] for tests and one-shot snapshots.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: DashMap<String, Bytes>,
    logs: DashMap<String, Vec<Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_len(&self, log: &str) -> usize {
        self.logs.get(log).map_or(0, |records| records.len())
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, PersistenceError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: Bytes) -> Result<(), PersistenceError> {
        validate_name(key)?;
        self.values.insert(key.to_owned(), value);
        Ok(())
    }

    fn append(&self, log: &str, record: Bytes) -> Result<(), PersistenceError> {
        validate_name(log)?;
        self.logs.entry(log.to_owned()).or_default().push(record);
        Ok(())
    }

    fn query(
        &self,
        log: &str,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<Bytes>, PersistenceError> {
        Ok(self.logs.get(log).map_or_else(Vec::new, |records| {
            records.iter().filter(|r| predicate(r)).cloned().collect()
        }))
    }

    fn clear_log(&self, log: &str) -> Result<(), PersistenceError> {
        self.logs.remove(log);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::persist::StoreExt;

    #[test]
    fn typed_values_round_trip() {
        let store = MemoryStore::new();
        store.set_json("answer", &42_u32).unwrap();
        assert_eq!(store.get_json::<u32>("answer").unwrap(), Some(42));
        assert_eq!(store.get_json::<u32>("missing").unwrap(), None);
    }

    #[test]
    fn corrupt_value_is_a_decode_error() {
        let store = MemoryStore::new();
        store.set("answer", Bytes::from_static(b"{not json")).unwrap();
        assert!(matches!(
            store.get_json::<u32>("answer"),
            Err(PersistenceError::Decode { .. })
        ));
    }

    #[test]
    fn query_json_filters_and_skips_garbage() {
        let store = MemoryStore::new();
        store.append_json("nums", &1_u32).unwrap();
        store.append("nums", Bytes::from_static(b"\"oops")).unwrap();
        store.append_json("nums", &2_u32).unwrap();
        store.append_json("nums", &3_u32).unwrap();

        let odd: Vec<u32> = store.query_json("nums", |n: &u32| n % 2 == 1).unwrap();
        assert_eq!(odd, vec![1, 3]);

        store.clear_log("nums").unwrap();
        assert_eq!(store.log_len("nums"), 0);
    }

    #[test]
    fn rejects_path_like_keys() {
        let store = MemoryStore::new();
        assert!(store.set("../etc/passwd", Bytes::new()).is_err());
        assert!(store.append("", Bytes::new()).is_err());
    }

    #[test]
    fn tail_returns_trailing_run_oldest_first() {
        let store = MemoryStore::new();
        for n in [9_u32, 1, 8, 2, 3] {
            store.append_json("nums", &n).unwrap();
        }
        let tail: Vec<u32> = store.tail_json("nums", |n: &u32| *n < 5).unwrap();
        assert_eq!(tail, vec![2, 3]);
    }
}
