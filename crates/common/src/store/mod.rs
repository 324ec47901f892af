//! Encrypted, path-addressed document store with write-behind persistence.
//!
//! A [`Store`] owns one JSON document in memory. On [`Store::open`] it loads
//! and decrypts its backing file, or creates a fresh one. Afterwards every
//! mutation only touches memory, marks the store dirty and arms a short
//! debounce timer; when the timer fires the whole document is encrypted and
//! written back in a single file write.
//!
//! # Durability
//!
//! Writes are eventually durable. Mutations made inside the last debounce
//! window before an uncontrolled exit are lost, so call [`Store::close`]
//! before shutting down. The file is overwritten in place: a crash in the
//! middle of a write can corrupt it.
//!
//! # Example
//!
//! ```rust,no_run
//! use common::store::{Store, StoreConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), common::store::StoreError> {
//! let store = Store::open(StoreConfig::new("./warden.db")).await?;
//! store.set("a.b.c", json!(5)).await;
//! assert_eq!(store.get("a.b").await, Some(json!({ "c": 5 })));
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

mod document;
mod error;
mod record;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::crypto::{self, KdfParams, MasterKey, MasterKeyManager};

pub use document::Document;
pub use error::{Result, StoreError};
pub use record::{DurableRecord, RecordMeta};

/// Default delay used to coalesce mutations into a single write.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Configuration for opening a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backing state file
    pub path: PathBuf,
    /// Delay between the first unflushed mutation and the write
    pub debounce: Duration,
    /// Cost parameters for the machine key derivation
    pub kdf: KdfParams,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            debounce: DEFAULT_DEBOUNCE,
            kdf: KdfParams::default(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }
}

#[derive(Debug, Default)]
struct State {
    document: Document,
    dirty: bool,
    timer_armed: bool,
}

struct StoreInner {
    path: PathBuf,
    debounce: Duration,
    keys: MasterKeyManager,
    master_key: MasterKey,
    state: Mutex<State>,
    // held for the duration of a physical write
    flush_lock: Mutex<()>,
    writes: AtomicU64,
}

/// Handle to an open state store. Cloning is cheap and every clone shares
/// the same document.
#[derive(Clone)]
pub struct Store(Arc<StoreInner>);

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.0.path)
            .field("debounce", &self.0.debounce)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the store at `config.path`, binding it to this
    /// machine's key-encrypting key.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Integrity`] if the file was written on another machine
    ///   or has been tampered with
    /// - [`StoreError::Format`] if the file is not a valid state file
    /// - [`StoreError::Io`] if the file cannot be read or the initial write fails
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let params = config.kdf;
        let keys = tokio::task::spawn_blocking(move || MasterKeyManager::for_this_machine(&params))
            .await
            .map_err(|e| StoreError::Crypto(format!("key derivation task failed: {e}")))??;

        Self::open_with_keys(config, keys).await
    }

    /// Open the store with an explicit key manager.
    pub async fn open_with_keys(config: StoreConfig, keys: MasterKeyManager) -> Result<Self> {
        let existing = match tokio::fs::read_to_string(&config.path).await {
            Ok(contents) if !contents.trim().is_empty() => Some(contents),
            Ok(_) => None,
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let Some(contents) = existing else {
            let master_key = keys.generate()?;
            let store = Self::from_parts(config, keys, master_key, Document::new());
            store.flush_now(true).await?;
            tracing::info!(path = %store.path().display(), "created new state file");
            return Ok(store);
        };

        let record = DurableRecord::parse(&contents)?;
        let master_key = keys.unwrap(&record.meta.key)?;
        let plaintext = crypto::decrypt(&record.payload, &master_key)?;
        let document = match serde_json::from_slice::<Value>(&plaintext) {
            Ok(Value::Object(map)) => Document::from(map),
            Ok(_) => return Err(StoreError::Format("document is not an object".to_string())),
            Err(e) => return Err(StoreError::Format(e.to_string())),
        };

        tracing::info!(
            path = %config.path.display(),
            entries = document.as_map().len(),
            "loaded state file"
        );
        Ok(Self::from_parts(config, keys, master_key, document))
    }

    fn from_parts(
        config: StoreConfig,
        keys: MasterKeyManager,
        master_key: MasterKey,
        document: Document,
    ) -> Self {
        Self(Arc::new(StoreInner {
            path: config.path,
            debounce: config.debounce,
            keys,
            master_key,
            state: Mutex::new(State {
                document,
                ..State::default()
            }),
            flush_lock: Mutex::new(()),
            writes: AtomicU64::new(0),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.0.path
    }

    /// Number of physical writes performed by this handle.
    pub fn write_count(&self) -> u64 {
        self.0.writes.load(Ordering::Relaxed)
    }

    pub async fn is_dirty(&self) -> bool {
        self.0.state.lock().await.dirty
    }

    /// Run `f` against the document while holding the store lock.
    ///
    /// A flush is scheduled only if `f` mutated the document. No other
    /// operation observes the document between the steps of `f`.
    pub async fn transaction<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Document) -> R,
    {
        let mut state = self.0.state.lock().await;
        let before = state.document.generation();
        let out = f(&mut state.document);
        if state.document.generation() != before {
            self.mark_dirty(&mut state);
        }
        out
    }

    pub async fn get(&self, path: &str) -> Option<Value> {
        self.0.state.lock().await.document.get(path).cloned()
    }

    /// Read and deserialize the value at `path`.
    pub async fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path).await {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn has(&self, path: &str) -> bool {
        self.0.state.lock().await.document.has(path)
    }

    /// Write `value` at `path` and return it.
    pub async fn set(&self, path: &str, value: impl Into<Value>) -> Value {
        let value = value.into();
        self.transaction(|doc| doc.set(path, value.clone())).await;
        value
    }

    pub async fn delete(&self, path: &str) -> bool {
        self.transaction(|doc| doc.delete(path)).await
    }

    pub async fn add(&self, path: &str, amount: f64) -> f64 {
        self.transaction(|doc| doc.add(path, amount)).await
    }

    pub async fn subtract(&self, path: &str, amount: f64) -> f64 {
        self.add(path, -amount).await
    }

    pub async fn push(&self, path: &str, value: impl Into<Value>) -> Vec<Value> {
        let value = value.into();
        self.transaction(|doc| doc.push(path, value)).await
    }

    /// Write the document now if it has unflushed changes.
    pub async fn flush(&self) -> Result<()> {
        self.flush_now(false).await
    }

    /// Write the document now, regardless of the debounce timer. Call this
    /// before shutdown.
    pub async fn close(&self) -> Result<()> {
        self.flush_now(true).await?;
        tracing::debug!(path = %self.path().display(), "store closed");
        Ok(())
    }

    fn mark_dirty(&self, state: &mut State) {
        state.dirty = true;
        if state.timer_armed {
            return;
        }
        state.timer_armed = true;

        let store = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(store.0.debounce).await;
            // disarm first so a mutation landing mid-flush arms a follow-up
            store.0.state.lock().await.timer_armed = false;
            if let Err(e) = store.flush_now(false).await {
                tracing::error!(
                    path = %store.path().display(),
                    "background flush failed: {}",
                    e
                );
            }
        });
    }

    async fn flush_now(&self, force: bool) -> Result<()> {
        let _flushing = self.0.flush_lock.lock().await;
        match self.take_snapshot(force).await? {
            Some(snapshot) => self.persist(&snapshot).await,
            None => Ok(()),
        }
    }

    /// Serialize the document and clear the dirty flag. Mutations after this
    /// point mark the store dirty again and are left to a follow-up flush.
    async fn take_snapshot(&self, force: bool) -> Result<Option<Vec<u8>>> {
        let mut state = self.0.state.lock().await;
        if !state.dirty && !force {
            return Ok(None);
        }
        let snapshot = state.document.to_json()?;
        state.dirty = false;
        Ok(Some(snapshot))
    }

    async fn persist(&self, snapshot: &[u8]) -> Result<()> {
        let result = self.write_snapshot(snapshot).await;
        if let Err(e) = &result {
            // the next mutation re-arms the timer and retries
            tracing::warn!(path = %self.path().display(), "flush failed: {}", e);
            self.0.state.lock().await.dirty = true;
        }
        result
    }

    async fn write_snapshot(&self, plaintext: &[u8]) -> Result<()> {
        let payload = crypto::encrypt(plaintext, &self.0.master_key)?;
        let key = self.0.keys.wrap(&self.0.master_key)?;
        let bytes = DurableRecord::new(key, payload).to_json()?;

        if let Some(parent) = self.0.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.0.path, &bytes).await?;

        self.0.writes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            path = %self.path().display(),
            bytes = bytes.len(),
            "flushed state file"
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{KeyEncryptingKey, MachineFingerprint};

    fn keys() -> MasterKeyManager {
        let kdf = KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        };
        let fingerprint = MachineFingerprint::from_parts("flush-host", "linux", "x86_64");
        MasterKeyManager::new(KeyEncryptingKey::derive(&fingerprint, &kdf).unwrap())
    }

    #[tokio::test]
    async fn test_mutation_during_flush_gets_one_follow_up() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = StoreConfig::new(temp_dir.path().join("warden.db"))
            .with_debounce(Duration::from_millis(20));
        let store = Store::open_with_keys(config.clone(), keys()).await.unwrap();
        store.set("early", 1).await;
        store.flush().await.unwrap();
        let baseline = store.write_count();

        // a flush is in flight: lock held and snapshot taken
        let flushing = store.0.flush_lock.lock().await;
        store.set("early", 2).await;
        let snapshot = store.take_snapshot(false).await.unwrap().unwrap();
        store.set("late", true).await;
        assert!(store.is_dirty().await);
        store.persist(&snapshot).await.unwrap();

        let on_disk = Store::open_with_keys(config.clone(), keys()).await.unwrap();
        assert_eq!(on_disk.get("early").await, Some(2.into()));
        assert_eq!(on_disk.get("late").await, None);

        // the timer fired meanwhile and is parked behind the lock
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.write_count(), baseline + 1);
        drop(flushing);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.write_count(), baseline + 2);
        assert!(!store.is_dirty().await);

        let reopened = Store::open_with_keys(config, keys()).await.unwrap();
        assert_eq!(reopened.get("late").await, Some(true.into()));
        assert_eq!(reopened.get("early").await, Some(2.into()));
    }
}
