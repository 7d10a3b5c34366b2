//! Record stores — the persistence capability behind the session state
//! machine and the circuit breaker.
//!
//! Every mutating operation is lock → read → transform → atomic replace.
//! The transform runs on an in-memory copy; if it fails, nothing is
//! written and no temporary file survives. The lock sidecar
//! (`<record>.lock`) is stable store infrastructure and persists between
//! operations.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// A record type with an on-disk schema-version contract.
pub trait PersistedRecord: Serialize + DeserializeOwned {
    /// The layout version this implementation reads and writes.
    const SCHEMA_VERSION: u32;

    /// The version stamped on this record instance.
    fn schema_version(&self) -> u32;
}

/// Store failures. `LockTimeout` and `AlreadyExists` are recoverable by
/// the caller; `SchemaMismatch` is a deliberate hard stop.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists at {path}; remove it or resume instead")]
    AlreadyExists { path: PathBuf },

    #[error("no record at {path}")]
    NotFound { path: PathBuf },

    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: u32, found: u32 },

    #[error("could not acquire exclusive lock on {path} within {waited_ms}ms")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("in-memory store poisoned by a panicking writer")]
    Poisoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence capability injected into the state machine and breaker.
pub trait StateStore<T> {
    fn exists(&self) -> bool;

    /// Create the record. Fails if one already exists; the caller must
    /// explicitly remove or resume.
    fn init(&self, record: &T) -> Result<(), StoreError>;

    fn load(&self) -> Result<T, StoreError>;

    /// Read-transform-write under the exclusive lock. The closure mutates
    /// an in-memory copy; an error from it aborts before any write, so the
    /// stored record is guaranteed unchanged on the failure path.
    fn update<E, F>(&self, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: From<StoreError>;
}

/// Default time to wait for the exclusive lock before failing the
/// operation instead of blocking behind a crashed holder.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Durable JSON-on-disk store, one record per path.
#[derive(Debug)]
pub struct FileStore<T> {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    _record: PhantomData<fn() -> T>,
}

impl<T: PersistedRecord> FileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_lock_timeout(path, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self {
            path,
            lock_path,
            lock_timeout,
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the advisory lock, polling until the configured deadline.
    /// The lock releases when the returned handle drops.
    fn acquire_lock(&self) -> Result<File, StoreError> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_path)?;

        let started = Instant::now();
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => return Ok(lock_file),
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    let waited = started.elapsed();
                    if waited >= self.lock_timeout {
                        return Err(StoreError::LockTimeout {
                            path: self.lock_path.clone(),
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(err) => return Err(StoreError::Io(err)),
            }
        }
    }

    /// Read and version-check the record. The version is checked on the
    /// raw document before full deserialization so an incompatible layout
    /// reports `SchemaMismatch` rather than a parse error.
    fn read_record(&self) -> Result<T, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotFound {
                path: self.path.clone(),
            });
        }
        let raw = fs::read_to_string(&self.path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let found = value
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;
        if found != T::SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                expected: T::SCHEMA_VERSION,
                found,
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Write to a temp file in the record's directory, sync, then rename
    /// over the target so readers never observe a half-written record.
    fn write_record(&self, record: &T) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(&serde_json::to_vec_pretty(record)?)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        debug!(path = %self.path.display(), "record written");
        Ok(())
    }
}

impl<T: PersistedRecord> StateStore<T> for FileStore<T> {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn init(&self, record: &T) -> Result<(), StoreError> {
        let _lock = self.acquire_lock()?;
        if self.path.exists() {
            return Err(StoreError::AlreadyExists {
                path: self.path.clone(),
            });
        }
        self.write_record(record)
    }

    fn load(&self) -> Result<T, StoreError> {
        let _lock = self.acquire_lock()?;
        self.read_record()
    }

    fn update<E, F>(&self, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: From<StoreError>,
    {
        let _lock = self.acquire_lock().map_err(E::from)?;
        let mut record = self.read_record().map_err(E::from)?;
        apply(&mut record)?;
        self.write_record(&record).map_err(E::from)?;
        Ok(record)
    }
}

/// In-memory store for tests and dry runs. Same atomic-or-untouched
/// contract: the transform runs on a clone and only commits on success.
#[derive(Debug)]
pub struct MemoryStore<T> {
    inner: Mutex<Option<T>>,
}

impl<T: Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub fn with_record(record: T) -> Self {
        Self {
            inner: Mutex::new(Some(record)),
        }
    }
}

impl<T: Clone> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn memory_path() -> PathBuf {
    PathBuf::from("<memory>")
}

impl<T: Clone> StateStore<T> for MemoryStore<T> {
    fn exists(&self) -> bool {
        self.inner.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    fn init(&self, record: &T) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        if guard.is_some() {
            return Err(StoreError::AlreadyExists {
                path: memory_path(),
            });
        }
        *guard = Some(record.clone());
        Ok(())
    }

    fn load(&self) -> Result<T, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .clone()
            .ok_or(StoreError::NotFound {
                path: memory_path(),
            })
    }

    fn update<E, F>(&self, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: From<StoreError>,
    {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| E::from(StoreError::Poisoned))?;
        let held = guard.as_ref().ok_or_else(|| {
            E::from(StoreError::NotFound {
                path: memory_path(),
            })
        })?;
        let mut working = held.clone();
        apply(&mut working)?;
        *guard = Some(working.clone());
        Ok(working)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Probe {
        schema_version: u32,
        counter: u32,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                schema_version: 7,
                counter: 0,
            }
        }
    }

    impl PersistedRecord for Probe {
        const SCHEMA_VERSION: u32 = 7;

        fn schema_version(&self) -> u32 {
            self.schema_version
        }
    }

    fn file_store(dir: &tempfile::TempDir) -> FileStore<Probe> {
        FileStore::new(dir.path().join("probe.json"))
    }

    #[test]
    fn test_init_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        assert!(!store.exists());

        store.init(&Probe::new()).unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), Probe::new());
    }

    #[test]
    fn test_init_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        store.init(&Probe::new()).unwrap();
        assert!(matches!(
            store.init(&Probe::new()),
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        assert!(matches!(store.load(), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_schema_mismatch_is_hard_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.json");
        fs::write(&path, r#"{"schema_version": 99, "counter": 0}"#).unwrap();

        let store = FileStore::<Probe>::new(&path);
        match store.load() {
            Err(StoreError::SchemaMismatch { expected, found }) => {
                assert_eq!(expected, 7);
                assert_eq!(found, 99);
            }
            other => panic!("expected SchemaMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_version_field_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.json");
        fs::write(&path, r#"{"counter": 0}"#).unwrap();

        let store = FileStore::<Probe>::new(&path);
        assert!(matches!(
            store.load(),
            Err(StoreError::SchemaMismatch { found: 0, .. })
        ));
    }

    #[test]
    fn test_failed_transform_leaves_bytes_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        store.init(&Probe::new()).unwrap();
        let before = fs::read(store.path()).unwrap();

        let result: Result<Probe, StoreError> = store.update(|p| {
            p.counter = 42;
            Err(StoreError::Poisoned)
        });
        assert!(result.is_err());
        assert_eq!(fs::read(store.path()).unwrap(), before);
        assert_eq!(store.load().unwrap().counter, 0);
    }

    #[test]
    fn test_update_commits_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        store.init(&Probe::new()).unwrap();

        let updated: Probe = store
            .update(|p| {
                p.counter += 1;
                Ok::<(), StoreError>(())
            })
            .unwrap();
        assert_eq!(updated.counter, 1);
        assert_eq!(store.load().unwrap().counter, 1);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n != "probe.json" && n != "probe.json.lock")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
    }

    #[test]
    fn test_lock_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            FileStore::<Probe>::with_lock_timeout(dir.path().join("probe.json"), Duration::from_millis(60));
        store.init(&Probe::new()).unwrap();

        // Hold the lock out-of-band and watch the store give up.
        let holder = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(dir.path().join("probe.json.lock"))
            .unwrap();
        holder.lock_exclusive().unwrap();

        let result: Result<Probe, StoreError> = store.update(|p| {
            p.counter += 1;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
        // The record is untouched on this path, so retrying is safe.
        fs2::FileExt::unlock(&holder).unwrap();
        assert_eq!(store.load().unwrap().counter, 0);
    }

    #[test]
    fn test_memory_store_contract() {
        let store = MemoryStore::<Probe>::new();
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(StoreError::NotFound { .. })));

        store.init(&Probe::new()).unwrap();
        assert!(matches!(
            store.init(&Probe::new()),
            Err(StoreError::AlreadyExists { .. })
        ));

        let result: Result<Probe, StoreError> = store.update(|p| {
            p.counter = 9;
            Err(StoreError::Poisoned)
        });
        assert!(result.is_err());
        assert_eq!(store.load().unwrap().counter, 0, "aborted transform must not commit");

        store
            .update(|p| {
                p.counter += 1;
                Ok::<(), StoreError>(())
            })
            .unwrap();
        assert_eq!(store.load().unwrap().counter, 1);
    }
}
