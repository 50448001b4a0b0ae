//! Recorder manager state
//!
//! Keeps one recorder per consumer id. Constructed once at startup and
//! handed to whatever needs it; `shutdown()` flushes every recorder.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{RecorderConfig, StoreBackend};
use crate::monitor::recorder::{ConsumerChannels, Recorder};
use crate::store::sqlite::{self, DbPool};
use crate::store::{DurableStore, FileStore, MemoryStore, SqliteStore};
use crate::types::error::{RecorderError, Result};
use crate::types::event::{MonitorEvent, RecorderSignal};
use crate::types::notification::ChangeNotification;
use crate::types::subscription::SubscriptionSpec;

pub type SharedRecorder = Arc<Mutex<Recorder>>;

type CustomFactory = dyn Fn(&str) -> Result<Box<dyn DurableStore>> + Send + Sync;

/// Where each consumer's store comes from
enum StoreFactory {
    Sqlite(DbPool),
    File(PathBuf),
    Memory(StdMutex<HashMap<String, MemoryStore>>),
    Custom(Box<CustomFactory>),
}

impl StoreFactory {
    fn from_config(config: &RecorderConfig) -> Result<Self> {
        match config.store.backend {
            StoreBackend::Sqlite => {
                let path = config.sqlite_path();
                info!("Recorder database: {:?}", path);
                Ok(Self::Sqlite(sqlite::create_pool(&path)?))
            }
            StoreBackend::File => {
                let dir = config.file_directory();
                std::fs::create_dir_all(&dir)?;
                info!("Recorder queue directory: {:?}", dir);
                Ok(Self::File(dir))
            }
            StoreBackend::Memory => Ok(Self::Memory(StdMutex::new(HashMap::new()))),
        }
    }

    fn store_for(&self, consumer_id: &str) -> Result<Box<dyn DurableStore>> {
        match self {
            Self::Sqlite(pool) => Ok(Box::new(SqliteStore::with_pool(pool.clone(), consumer_id))),
            Self::File(dir) => Ok(Box::new(file_store(dir, consumer_id))),
            Self::Memory(stores) => {
                let mut stores = lock_memory(stores)?;
                let store = stores.entry(consumer_id.to_string()).or_default().clone();
                Ok(Box::new(store))
            }
            Self::Custom(factory) => factory(consumer_id),
        }
    }

    fn forget(&self, consumer_id: &str) -> Result<()> {
        match self {
            Self::Sqlite(pool) => SqliteStore::with_pool(pool.clone(), consumer_id).clear(),
            Self::File(dir) => {
                let store = file_store(dir, consumer_id);
                match std::fs::remove_file(store.path()) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Self::Memory(stores) => {
                lock_memory(stores)?.remove(consumer_id);
                Ok(())
            }
            Self::Custom(_) => Ok(()),
        }
    }

    fn stored_consumers(&self) -> Result<Vec<String>> {
        let mut ids = match self {
            Self::Sqlite(pool) => sqlite::list_consumers(pool)?,
            Self::File(dir) => std::fs::read_dir(dir)?
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        path.file_stem().map(|s| s.to_string_lossy().into_owned())
                    } else {
                        None
                    }
                })
                .collect(),
            Self::Memory(stores) => lock_memory(stores)?.keys().cloned().collect(),
            Self::Custom(_) => Vec::new(),
        };
        ids.sort();
        Ok(ids)
    }
}

fn file_store(dir: &std::path::Path, consumer_id: &str) -> FileStore {
    FileStore::new(dir.join(format!("{}.json", consumer_id)))
}

fn lock_memory(
    stores: &StdMutex<HashMap<String, MemoryStore>>,
) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryStore>>> {
    stores
        .lock()
        .map_err(|e| RecorderError::Persistence(format!("Failed to lock memory stores: {}", e)))
}

/// Consumer ids double as file names, so keep them plain
fn validate_consumer_id(consumer_id: &str) -> Result<()> {
    let valid = !consumer_id.is_empty()
        && !consumer_id.starts_with('.')
        && consumer_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));

    if valid {
        Ok(())
    } else {
        Err(RecorderError::InvalidInput(format!(
            "Invalid consumer id: {:?}",
            consumer_id
        )))
    }
}

/// What a consumer gets back from `register`
pub struct ConsumerHandle {
    pub consumer_id: String,
    pub recorder: SharedRecorder,
    pub events: flume::Receiver<MonitorEvent>,
    pub signals: flume::Receiver<RecorderSignal>,
}

pub struct RecorderManager {
    recorders: RwLock<HashMap<String, SharedRecorder>>,
    config: RecorderConfig,
    factory: StoreFactory,
}

impl RecorderManager {
    /// Create a manager using the store backend named in `config`
    pub fn new(config: RecorderConfig) -> Result<Self> {
        let factory = StoreFactory::from_config(&config)?;
        Ok(Self {
            recorders: RwLock::new(HashMap::new()),
            config,
            factory,
        })
    }

    /// Create a manager that asks `factory` for each consumer's store
    pub fn with_store_factory<F>(config: RecorderConfig, factory: F) -> Self
    where
        F: Fn(&str) -> Result<Box<dyn DurableStore>> + Send + Sync + 'static,
    {
        Self {
            recorders: RwLock::new(HashMap::new()),
            config,
            factory: StoreFactory::Custom(Box::new(factory)),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Open a recorder for a consumer, restoring its saved queue
    pub async fn register(
        &self,
        consumer_id: &str,
        subscription: SubscriptionSpec,
    ) -> Result<ConsumerHandle> {
        validate_consumer_id(consumer_id)?;

        let mut recorders = self.recorders.write().await;
        if recorders.contains_key(consumer_id) {
            return Err(RecorderError::AlreadyRegistered(consumer_id.to_string()));
        }

        info!("Registering recorder for consumer: {}", consumer_id);

        let store = self.factory.store_for(consumer_id)?;
        let (recorder, ConsumerChannels { events, signals }) =
            Recorder::open(store, subscription, &self.config);
        let recorder = Arc::new(Mutex::new(recorder));
        recorders.insert(consumer_id.to_string(), recorder.clone());

        Ok(ConsumerHandle {
            consumer_id: consumer_id.to_string(),
            recorder,
            events,
            signals,
        })
    }

    /// Get the recorder for a consumer (if registered)
    pub async fn get(&self, consumer_id: &str) -> Option<SharedRecorder> {
        let recorders = self.recorders.read().await;
        recorders.get(consumer_id).cloned()
    }

    pub async fn consumer_ids(&self) -> Vec<String> {
        let recorders = self.recorders.read().await;
        let mut ids: Vec<String> = recorders.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Consumers with saved state, registered or not
    pub fn stored_consumers(&self) -> Result<Vec<String>> {
        self.factory.stored_consumers()
    }

    /// Unregister a consumer, flushing and closing its recorder. Saved state
    /// is kept. Handles still holding the old recorder get `Closed` errors.
    pub async fn remove(&self, consumer_id: &str) -> Result<()> {
        // Close while holding the registry so a concurrent register cannot
        // open a second recorder on the same store first
        let mut recorders = self.recorders.write().await;
        let Some(recorder) = recorders.remove(consumer_id) else {
            return Err(RecorderError::ConsumerNotFound(consumer_id.to_string()));
        };

        info!("Removing recorder for consumer: {}", consumer_id);
        let mut recorder = recorder.lock().await;
        recorder.shutdown()
    }

    /// Unregister a consumer and delete its saved state
    pub async fn forget(&self, consumer_id: &str) -> Result<()> {
        let mut recorders = self.recorders.write().await;
        if let Some(recorder) = recorders.remove(consumer_id) {
            if let Err(e) = recorder.lock().await.shutdown() {
                warn!("Flush before forgetting {} failed: {}", consumer_id, e);
            }
        }

        info!("Forgetting saved state of consumer: {}", consumer_id);
        self.factory.forget(consumer_id)
    }

    /// Flush and drop every recorder; returns the first flush error
    pub async fn shutdown(&self) -> Result<()> {
        let mut recorders = self.recorders.write().await;
        info!("Shutting down {} recorders", recorders.len());

        let mut first_error = None;
        for (consumer_id, recorder) in recorders.drain() {
            if let Err(e) = recorder.lock().await.shutdown() {
                warn!("Failed to flush recorder {}: {}", consumer_id, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Feed a shared recorder from an upstream channel until every sender is gone
/// or the recorder is shut down. Returns how many notifications were handled.
///
/// The recorder is locked only while a notification is handled, never while
/// waiting for the next one, so the consumer can replay and acknowledge
/// while the feed is idle.
pub async fn pump_feed(
    recorder: SharedRecorder,
    feed: flume::Receiver<ChangeNotification>,
) -> usize {
    let mut handled = 0;

    while let Ok(notification) = feed.recv_async().await {
        let mut guard = recorder.lock().await;
        match guard.on_live_notification(notification) {
            Ok(outcome) => debug!("Feed notification: {:?}", outcome),
            Err(RecorderError::Closed) => {
                info!("Recorder closed, stopping feed pump");
                break;
            }
            Err(e) => warn!("Failed to record feed notification: {}", e),
        }
        handled += 1;
    }

    debug!("Feed pump finished after {} notifications", handled);
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::types::notification::{ChangeNotification, Operation};

    fn memory_config() -> RecorderConfig {
        RecorderConfig {
            store: StoreConfig {
                backend: StoreBackend::Memory,
                path: None,
            },
            ..RecorderConfig::default()
        }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let manager = RecorderManager::new(memory_config()).unwrap();
        let handle = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();

        assert_eq!(handle.consumer_id, "indexer");
        assert!(manager.get("indexer").await.is_some());
        assert!(manager.get("other").await.is_none());
        assert_eq!(manager.consumer_ids().await, vec!["indexer".to_string()]);
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let manager = RecorderManager::new(memory_config()).unwrap();
        let _handle = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();

        let err = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RecorderError::AlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn test_invalid_consumer_id_rejected() {
        let manager = RecorderManager::new(memory_config()).unwrap();
        for id in ["", "../escape", ".hidden", "a/b"] {
            let result = manager.register(id, SubscriptionSpec::monitor_all()).await;
            assert!(matches!(result, Err(RecorderError::InvalidInput(_))), "{:?}", id);
        }
    }

    #[tokio::test]
    async fn test_remove_keeps_state_for_reregistration() {
        let manager = RecorderManager::new(memory_config()).unwrap();
        let handle = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();
        handle
            .recorder
            .lock()
            .await
            .on_live_notification(ChangeNotification::item(1, Operation::Added))
            .unwrap();

        manager.remove("indexer").await.unwrap();
        assert!(manager.get("indexer").await.is_none());
        assert!(matches!(
            manager.remove("indexer").await,
            Err(RecorderError::ConsumerNotFound(_))
        ));

        let handle = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();
        assert_eq!(handle.recorder.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_forget_deletes_state() {
        let manager = RecorderManager::new(memory_config()).unwrap();
        let handle = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();
        handle
            .recorder
            .lock()
            .await
            .on_live_notification(ChangeNotification::item(1, Operation::Added))
            .unwrap();
        assert_eq!(manager.stored_consumers().unwrap(), vec!["indexer".to_string()]);

        manager.forget("indexer").await.unwrap();
        assert!(manager.stored_consumers().unwrap().is_empty());

        let handle = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();
        assert!(handle.recorder.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_custom_factory() {
        let shared = MemoryStore::new();
        let store = shared.clone();
        let manager = RecorderManager::with_store_factory(RecorderConfig::default(), move |_| {
            Ok(Box::new(store.clone()) as Box<dyn DurableStore>)
        });

        let handle = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();
        handle
            .recorder
            .lock()
            .await
            .on_live_notification(ChangeNotification::item(1, Operation::Added))
            .unwrap();

        assert!(shared.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_handle_cannot_write_after_reregistration() {
        let manager = RecorderManager::new(memory_config()).unwrap();
        let stale = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();
        manager.remove("indexer").await.unwrap();

        let current = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();
        current
            .recorder
            .lock()
            .await
            .on_live_notification(ChangeNotification::item(1, Operation::Added))
            .unwrap();

        let err = stale
            .recorder
            .lock()
            .await
            .on_live_notification(ChangeNotification::item(2, Operation::Added))
            .unwrap_err();
        assert!(matches!(err, RecorderError::Closed));

        drop(stale);
        drop(current);
        manager.shutdown().await.unwrap();

        let handle = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();
        let ids: Vec<u64> = handle
            .recorder
            .lock()
            .await
            .pending()
            .iter()
            .map(|n| n.entity_id)
            .collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_forgotten_state_not_recreated_by_stale_handle() {
        let manager = RecorderManager::new(memory_config()).unwrap();
        let stale = manager
            .register("indexer", SubscriptionSpec::monitor_all())
            .await
            .unwrap();
        manager.forget("indexer").await.unwrap();

        let result = stale
            .recorder
            .lock()
            .await
            .on_live_notification(ChangeNotification::item(1, Operation::Added));
        assert!(matches!(result, Err(RecorderError::Closed)));
        assert!(manager.stored_consumers().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_clears_registry() {
        let manager = RecorderManager::new(memory_config()).unwrap();
        for id in ["a", "b"] {
            manager
                .register(id, SubscriptionSpec::monitor_all())
                .await
                .unwrap();
        }

        manager.shutdown().await.unwrap();
        assert!(manager.consumer_ids().await.is_empty());
    }
}
