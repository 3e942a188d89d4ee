use crate::error::StoreError;
use crate::types::{CapturedRequest, Webhook};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

pub const DEFAULT_MAX_REQUESTS_PER_WEBHOOK: usize = 1000;

/// Resolves a webhook identifier to its current configuration.
pub trait WebhookDirectory: Send + Sync {
    fn lookup_webhook(&self, id: &str) -> Result<Webhook, StoreError>;
}

/// Durable history of captured requests.
pub trait RequestStore: Send + Sync {
    fn persist_captured_request(&self, record: &CapturedRequest) -> Result<(), StoreError>;
    fn load_captured_request(&self, id: &str) -> Result<CapturedRequest, StoreError>;
    /// Newest first.
    fn list_captured_requests(&self, webhook_id: &str) -> Result<Vec<CapturedRequest>, StoreError>;
    fn delete_captured_request(&self, id: &str) -> Result<(), StoreError>;
}

type History = Vec<Arc<CapturedRequest>>;

#[derive(Default)]
struct Tables {
    webhooks: HashMap<String, Webhook>,
    /// Oldest first.
    requests: HashMap<String, History>,
    /// Captured request id -> owning webhook id.
    owners: HashMap<String, String>,
}

/// In-process webhook directory and request store, optionally mirrored to
/// JSON files under a data directory (`webhooks.json`, `requests/<id>.json`).
///
/// Changes to one webhook's history are serialized by that webhook's file
/// lock. The file is rewritten while only the file lock is held, and the
/// shared tables are updated after the write succeeds, so a slow rewrite for
/// one webhook never holds up lookups or captures for another.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    file_locks: DashMap<String, Arc<Mutex<()>>>,
    data_dir: Option<PathBuf>,
    max_requests_per_webhook: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            file_locks: DashMap::new(),
            data_dir: None,
            max_requests_per_webhook: DEFAULT_MAX_REQUESTS_PER_WEBHOOK,
        }
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::new()
        }
    }

    pub fn with_retention(mut self, max_requests_per_webhook: usize) -> Self {
        self.max_requests_per_webhook = max_requests_per_webhook.max(1);
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn file_lock(&self, webhook_id: &str) -> Arc<Mutex<()>> {
        self.file_locks
            .entry(webhook_id.to_string())
            .or_default()
            .clone()
    }

    fn history(&self, webhook_id: &str) -> Result<History, StoreError> {
        Ok(self
            .read()?
            .requests
            .get(webhook_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Load webhooks and their captured requests from the data directory.
    /// Missing files are not an error.
    pub fn load(&self) -> Result<(), StoreError> {
        let Some(data_dir) = &self.data_dir else {
            return Ok(());
        };

        let mut tables = self.write()?;
        let webhooks_path = data_dir.join("webhooks.json");
        if webhooks_path.exists() {
            let content = std::fs::read_to_string(&webhooks_path)?;
            let items: Vec<Webhook> = serde_json::from_str(&content)?;
            for wh in items {
                tables.webhooks.insert(wh.id.clone(), wh);
            }
        }

        let requests_dir = data_dir.join("requests");
        if requests_dir.exists() {
            let ids: Vec<String> = tables.webhooks.keys().cloned().collect();
            for id in ids {
                let path = requests_dir.join(format!("{id}.json"));
                if !path.exists() {
                    continue;
                }
                let parsed = std::fs::read_to_string(&path)
                    .map_err(StoreError::from)
                    .and_then(|c| Ok(serde_json::from_str::<Vec<CapturedRequest>>(&c)?));
                match parsed {
                    Ok(items) => {
                        for item in &items {
                            tables.owners.insert(item.id.clone(), id.clone());
                        }
                        tables
                            .requests
                            .insert(id, items.into_iter().map(Arc::new).collect());
                    }
                    Err(e) => warn!(webhook_id = %id, error = %e, "skipping unreadable request history"),
                }
            }
        }

        debug!(webhooks = tables.webhooks.len(), "store loaded");
        Ok(())
    }

    pub fn save_webhooks(&self) -> Result<(), StoreError> {
        let Some(data_dir) = &self.data_dir else {
            return Ok(());
        };
        let content = {
            let tables = self.read()?;
            let mut items: Vec<&Webhook> = tables.webhooks.values().collect();
            items.sort_by(|a, b| a.id.cmp(&b.id));
            serde_json::to_string_pretty(&items)?
        };
        std::fs::create_dir_all(data_dir)?;
        std::fs::write(data_dir.join("webhooks.json"), content)?;
        Ok(())
    }

    /// Caller holds the webhook's file lock.
    fn save_requests(&self, webhook_id: &str, history: &[Arc<CapturedRequest>]) -> Result<(), StoreError> {
        let Some(data_dir) = &self.data_dir else {
            return Ok(());
        };
        let dir = data_dir.join("requests");
        std::fs::create_dir_all(&dir)?;
        let items: Vec<&CapturedRequest> = history.iter().map(Arc::as_ref).collect();
        let content = serde_json::to_string_pretty(&items)?;
        std::fs::write(dir.join(format!("{webhook_id}.json")), content)?;
        Ok(())
    }

    /// Insert or replace a webhook configuration.
    pub fn upsert_webhook(&self, wh: Webhook) -> Result<(), StoreError> {
        self.write()?.webhooks.insert(wh.id.clone(), wh);
        Ok(())
    }

    /// Remove a webhook together with its captured requests and their file.
    /// Returns whether the webhook existed.
    pub fn remove_webhook(&self, id: &str) -> Result<bool, StoreError> {
        let file_lock = self.file_lock(id);
        let _writing = lock_file(&file_lock)?;

        let removed = {
            let mut tables = self.write()?;
            let removed = tables.webhooks.remove(id).is_some();
            if let Some(history) = tables.requests.remove(id) {
                for item in history {
                    tables.owners.remove(&item.id);
                }
            }
            removed
        };

        if let Some(data_dir) = &self.data_dir {
            let path = data_dir.join("requests").join(format!("{id}.json"));
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(webhook_id = %id, error = %e, "failed to remove request history file"),
            }
        }
        Ok(removed)
    }
}

fn lock_file(lock: &Mutex<()>) -> Result<MutexGuard<'_, ()>, StoreError> {
    lock.lock()
        .map_err(|_| StoreError::Unavailable("history file lock poisoned".into()))
}

impl WebhookDirectory for MemoryStore {
    fn lookup_webhook(&self, id: &str) -> Result<Webhook, StoreError> {
        self.read()?
            .webhooks
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

impl RequestStore for MemoryStore {
    /// Appends the record, evicting the oldest beyond the retention cap. The
    /// record becomes visible only once the history file has been written.
    fn persist_captured_request(&self, record: &CapturedRequest) -> Result<(), StoreError> {
        let webhook_id = record.webhook_id.as_str();
        let file_lock = self.file_lock(webhook_id);
        let _writing = lock_file(&file_lock)?;

        let mut history = self.history(webhook_id)?;
        history.push(Arc::new(record.clone()));
        let overflow = history.len().saturating_sub(self.max_requests_per_webhook);
        let evicted: History = history.drain(..overflow).collect();

        self.save_requests(webhook_id, &history)?;

        let mut guard = self.write()?;
        let Tables {
            requests, owners, ..
        } = &mut *guard;
        for old in &evicted {
            owners.remove(&old.id);
        }
        owners.insert(record.id.clone(), webhook_id.to_string());
        requests.insert(webhook_id.to_string(), history);
        Ok(())
    }

    fn load_captured_request(&self, id: &str) -> Result<CapturedRequest, StoreError> {
        let tables = self.read()?;
        let webhook_id = tables.owners.get(id).ok_or(StoreError::NotFound)?;
        tables
            .requests
            .get(webhook_id)
            .and_then(|h| h.iter().find(|r| r.id == id))
            .map(|r| r.as_ref().clone())
            .ok_or(StoreError::NotFound)
    }

    fn list_captured_requests(&self, webhook_id: &str) -> Result<Vec<CapturedRequest>, StoreError> {
        Ok(self
            .read()?
            .requests
            .get(webhook_id)
            .map(|h| h.iter().rev().map(|r| r.as_ref().clone()).collect())
            .unwrap_or_default())
    }

    /// Idempotent. On a failed write the record stays in place.
    fn delete_captured_request(&self, id: &str) -> Result<(), StoreError> {
        let Some(webhook_id) = self.read()?.owners.get(id).cloned() else {
            return Ok(());
        };
        let file_lock = self.file_lock(&webhook_id);
        let _writing = lock_file(&file_lock)?;

        let mut history = self.history(&webhook_id)?;
        let before = history.len();
        history.retain(|r| r.id != id);
        if history.len() == before {
            // evicted or deleted while we waited for the lock
            return Ok(());
        }

        self.save_requests(&webhook_id, &history)?;

        let mut tables = self.write()?;
        tables.owners.remove(id);
        tables.requests.insert(webhook_id, history);
        Ok(())
    }
}
