//! Key/value storage for client state that outlives one run.
//!
//! The only record the chat client persists is the currently selected
//! chatbot, stored as JSON under [`SELECTED_CHATBOT_KEY`]. Unreadable or
//! unparsable records read as absent so a corrupt cache degrades into
//! "no chatbot selected" instead of an error.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use wire::Chatbot;

pub const SELECTED_CHATBOT_KEY: &str = "selectedChatbot";

/// Errors raised when writing client storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(String),
    #[error("storage encode failed: {0}")]
    Encode(String),
}

/// Raw string key/value storage, the native stand-in for `localStorage`.
pub trait ClientStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing medium cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing medium cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Load a JSON value stored under `key`.
pub fn load_json<T: DeserializeOwned>(storage: &dyn ClientStorage, key: &str) -> Option<T> {
    let raw = storage.get_item(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding unparsable stored value");
            None
        }
    }
}

/// Save a JSON value under `key`.
///
/// # Errors
///
/// Returns [`StorageError`] when encoding or writing fails.
pub fn save_json<T: Serialize>(storage: &dyn ClientStorage, key: &str, value: &T) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|e| StorageError::Encode(e.to_string()))?;
    storage.set_item(key, &raw)
}

/// The cached "currently selected" chatbot, if any.
pub fn load_selected_chatbot(storage: &dyn ClientStorage) -> Option<Chatbot> {
    load_json(storage, SELECTED_CHATBOT_KEY)
}

/// Cache `chatbot` as the currently selected one.
///
/// # Errors
///
/// Returns [`StorageError`] when the record cannot be written.
pub fn save_selected_chatbot(storage: &dyn ClientStorage, chatbot: &Chatbot) -> Result<(), StorageError> {
    save_json(storage, SELECTED_CHATBOT_KEY, chatbot)
}

/// In-process storage; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().map_err(|e| StorageError::Io(e.to_string()))?;
        items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().map_err(|e| StorageError::Io(e.to_string()))?;
        items.remove(key);
        Ok(())
    }
}

/// Storage backed by one JSON object file mapping keys to raw strings.
///
/// Every write rewrites the whole file; the store holds a handful of keys.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> HashMap<String, String> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "storage file unreadable; starting empty");
            HashMap::new()
        })
    }

    fn write_all(&self, items: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(items).map_err(|e| StorageError::Encode(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl ClientStorage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().ok()?;
        self.read_all().remove(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|e| StorageError::Io(e.to_string()))?;
        let mut items = self.read_all();
        items.insert(key.to_owned(), value.to_owned());
        self.write_all(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|e| StorageError::Io(e.to_string()))?;
        let mut items = self.read_all();
        if items.remove(key).is_some() {
            self.write_all(&items)?;
        }
        Ok(())
    }
}
