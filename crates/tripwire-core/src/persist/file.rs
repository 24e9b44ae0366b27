// ── File-backed store ──
//
// Layout under the state directory:
//   kv/<key>.json     one file per key, replaced atomically via rename
//   logs/<log>.jsonl  one record per line, append-only
//   lock              advisory lock held for the store's lifetime

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use fs2::FileExt;
use tracing::{debug, warn};

use super::{Store, validate_name};
use crate::error::PersistenceError;

/// Bytes read per step when scanning a log backwards.
const TAIL_CHUNK: u64 = 8 * 1024;

/// Durable [`Store`] rooted at a directory.
///
/// Only one `FileStore` may have a directory open at a time, across
/// processes. The lock is released when the store is dropped.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes writers within this process.
    write_lock: Mutex<()>,
    _dir_lock: File,
}

impl FileStore {
    /// Open (creating if needed) the store at `root`. Fails with
    /// [`PersistenceError::Locked`] while another store holds it.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        fs::create_dir_all(root.join("kv"))?;
        fs::create_dir_all(root.join("logs"))?;

        let lock_path = root.join("lock");
        let dir_lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        if let Err(e) = dir_lock.try_lock_exclusive() {
            let contended = e.kind() == io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            if contended {
                return Err(PersistenceError::Locked {
                    path: root.display().to_string(),
                });
            }
            return Err(e.into());
        }

        debug!(root = %root.display(), "opened file store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
            _dir_lock: dir_lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join("kv").join(format!("{key}.json"))
    }

    fn log_path(&self, log: &str) -> PathBuf {
        self.root.join("logs").join(format!("{log}.jsonl"))
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, PersistenceError> {
        validate_name(key)?;
        match fs::read(self.key_path(key)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: Bytes) -> Result<(), PersistenceError> {
        validate_name(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.key_path(key);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&value)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn append(&self, log: &str, record: Bytes) -> Result<(), PersistenceError> {
        validate_name(log)?;
        if record.contains(&b'\n') {
            return Err(PersistenceError::InvalidRecord {
                log: log.to_owned(),
                reason: "records must not contain newlines".into(),
            });
        }
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut line = Vec::with_capacity(record.len() + 1);
        line.extend_from_slice(&record);
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.log_path(log))?;
        if ends_mid_record(&mut file)? {
            warn!(log, "log ends in a partial record, terminating it before appending");
            file.write_all(b"\n")?;
        }
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    fn query(
        &self,
        log: &str,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<Bytes>, PersistenceError> {
        validate_name(log)?;
        let file = match fs::File::open(self.log_path(log)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for line in BufReader::new(file).split(b'\n') {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            if predicate(&line) {
                out.push(Bytes::from(line));
            }
        }
        Ok(out)
    }

    fn tail(
        &self,
        log: &str,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<Bytes>, PersistenceError> {
        validate_name(log)?;
        let mut file = match fs::File::open(self.log_path(log)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut pos = file.metadata()?.len();
        // Start of the line that straddles the previous chunk boundary.
        let mut carry: Vec<u8> = Vec::new();
        let mut out = Vec::new();
        'scan: while pos > 0 {
            let step = pos.min(TAIL_CHUNK);
            pos -= step;
            let mut chunk = vec![0_u8; usize::try_from(step).map_err(io::Error::other)?];
            file.seek(SeekFrom::Start(pos))?;
            file.read_exact(&mut chunk)?;
            chunk.extend_from_slice(&carry);

            let mut lines = chunk.split(|b| *b == b'\n');
            let head = if pos > 0 { lines.next() } else { None };
            for line in lines.rev() {
                if line.is_empty() {
                    continue;
                }
                if !predicate(line) {
                    break 'scan;
                }
                out.push(Bytes::copy_from_slice(line));
            }
            carry = head.unwrap_or_default().to_vec();
        }
        out.reverse();
        Ok(out)
    }

    fn clear_log(&self, log: &str) -> Result<(), PersistenceError> {
        validate_name(log)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(self.log_path(log)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether a crash left the last record without its newline.
fn ends_mid_record(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0_u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::persist::StoreExt;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set_json("ledger.baseline", &vec![1_u64, 2, 3]).unwrap();
            store.append_json("traffic", &"first").unwrap();
            store.append_json("traffic", &"second").unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get_json::<Vec<u64>>("ledger.baseline").unwrap(),
            Some(vec![1, 2, 3])
        );
        let records: Vec<String> = store.query_json("traffic", |_: &String| true).unwrap();
        assert_eq!(records, vec!["first", "second"]);
    }

    #[test]
    fn torn_trailing_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.append_json("traffic", &1_u32).unwrap();

        // Simulate a crash halfway through the next write.
        let mut file = OpenOptions::new()
            .append(true)
            .open(store.log_path("traffic"))
            .unwrap();
        file.write_all(b"{\"trunc").unwrap();

        let records: Vec<u32> = store.query_json("traffic", |_: &u32| true).unwrap();
        assert_eq!(records, vec![1]);
    }

    #[test]
    fn append_after_torn_line_keeps_next_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.append_json("traffic", &1_u32).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(store.log_path("traffic"))
            .unwrap();
        file.write_all(b"{\"trunc").unwrap();
        drop(file);

        store.append_json("traffic", &2_u32).unwrap();
        store.append_json("traffic", &3_u32).unwrap();

        let records: Vec<u32> = store.query_json("traffic", |_: &u32| true).unwrap();
        assert_eq!(records, vec![1, 2, 3]);
    }

    #[test]
    fn directory_is_locked_while_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let err = FileStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, PersistenceError::Locked { .. }));

        drop(store);
        FileStore::open(dir.path()).unwrap();
    }

    #[test]
    fn missing_log_and_key_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get("nothing").unwrap().is_none());
        assert!(store.query("nothing", &|_| true).unwrap().is_empty());
        store.clear_log("nothing").unwrap();
    }

    #[test]
    fn newline_records_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let err = store
            .append("traffic", Bytes::from_static(b"a\nb"))
            .unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidRecord { .. }));
    }

    #[test]
    fn tail_stops_at_first_failing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for n in [5_u32, 1, 2, 3, 4] {
            store.append_json("traffic", &n).unwrap();
        }

        let tail: Vec<u32> = store.tail_json("traffic", |n: &u32| *n < 5).unwrap();
        assert_eq!(tail, vec![1, 2, 3, 4]);
        let none: Vec<u32> = store.tail_json("traffic", |n: &u32| *n > 4).unwrap();
        assert!(none.is_empty());
        let missing: Vec<u32> = store.tail_json("absent", |_: &u32| true).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn tail_spans_many_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for n in 0_u32..5_000 {
            store.append_json("traffic", &format!("record-{n:05}")).unwrap();
        }

        let tail: Vec<String> = store
            .tail_json("traffic", |r: &String| r.as_str() >= "record-01000")
            .unwrap();
        assert_eq!(tail.len(), 4_000);
        assert_eq!(tail.first().unwrap(), "record-01000");
        assert_eq!(tail.last().unwrap(), "record-04999");

        let all: Vec<String> = store.tail_json("traffic", |_: &String| true).unwrap();
        assert_eq!(all.len(), 5_000);
    }

    #[test]
    fn tail_skips_torn_final_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.append_json("traffic", &1_u32).unwrap();
        store.append_json("traffic", &2_u32).unwrap();
        let mut log = OpenOptions::new()
            .append(true)
            .open(store.log_path("traffic"))
            .unwrap();
        log.write_all(b"{\"trunc").unwrap();

        let tail: Vec<u32> = store.tail_json("traffic", |_: &u32| true).unwrap();
        assert_eq!(tail, vec![1, 2]);
    }
}
