use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const FAVORITES_KEY: &str = "favorites";
pub const DARK_MODE_KEY: &str = "darkMode";
pub const WELCOME_SEEN_KEY: &str = "hasSeenWelcome";
pub const GENRES_CACHE_KEY: &str = "cachedGenres";
pub const GENRES_TIMESTAMP_KEY: &str = "genresCachedAt";
pub const SELECTED_GENRE_KEY: &str = "selectedGenre";

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
    // Changes written by other contexts, never by this one.
    fn changes(&self) -> broadcast::Receiver<StorageEvent>;
}

pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read '{}' from store: {:#}", key, e);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Discarding malformed '{}' entry: {}", key, e);
            if let Err(e) = store.remove(key) {
                warn!("Failed to remove malformed '{}' entry: {:#}", key, e);
            }
            None
        }
    }
}

#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn subscribe<F>(store: &dyn KeyValueStore, key: &str, callback: F) -> Subscription
where
    F: Fn(Option<String>) + Send + 'static,
{
    let mut rx = store.changes();
    let key = key.to_string();
    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.key == key => callback(event.new_value),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Storage listener for '{}' skipped {} events", key, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    Subscription { task }
}

struct Shared {
    data: Mutex<HashMap<String, String>>,
    listeners: Mutex<Vec<(u64, broadcast::Sender<StorageEvent>)>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                data: Mutex::new(HashMap::new()),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn context(&self) -> StoreContext {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        lock(&self.shared.listeners).push((id, tx.clone()));
        StoreContext {
            id,
            shared: self.shared.clone(),
            tx,
        }
    }
}

pub struct StoreContext {
    id: u64,
    shared: Arc<Shared>,
    tx: broadcast::Sender<StorageEvent>,
}

impl StoreContext {
    fn announce(&self, key: &str, new_value: Option<&str>) {
        let listeners = lock(&self.shared.listeners);
        for (id, tx) in listeners.iter() {
            if *id == self.id {
                continue;
            }
            // No receivers just means nobody in that context is listening.
            let _ = tx.send(StorageEvent {
                key: key.to_string(),
                new_value: new_value.map(str::to_string),
            });
        }
    }
}

impl Drop for StoreContext {
    fn drop(&mut self) {
        lock(&self.shared.listeners).retain(|(id, _)| *id != self.id);
    }
}

impl KeyValueStore for StoreContext {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.shared.data).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.shared.data).insert(key.to_string(), value.to_string());
        self.announce(key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let existed = lock(&self.shared.data).remove(key).is_some();
        if existed {
            self.announce(key, None);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let keys: Vec<String> = lock(&self.shared.data).drain().map(|(k, _)| k).collect();
        for key in keys {
            self.announce(&key, None);
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<BTreeMap<String, String>>,
    tx: broadcast::Sender<StorageEvent>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store file {}", path.display()))?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text)
                    .with_context(|| format!("Store file {} is not a JSON object", path.display()))?
            }
        } else {
            debug!("Store file {} missing, starting empty", path.display());
            BTreeMap::new()
        };
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            path,
            data: Mutex::new(data),
            tx,
        })
    }

    fn flush(&self, data: &BTreeMap<String, String>) -> Result<()> {
        let text = serde_json::to_string_pretty(data).context("Failed to encode store")?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)
            .with_context(|| format!("Failed to write store file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            anyhow!(
                "Failed to replace store file {}: {}",
                self.path.display(),
                e
            )
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.data).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = lock(&self.data);
        data.insert(key.to_string(), value.to_string());
        self.flush(&data)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut data = lock(&self.data);
        if data.remove(key).is_some() {
            self.flush(&data)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut data = lock(&self.data);
        data.clear();
        self.flush(&data)
    }

    fn changes(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }
}
