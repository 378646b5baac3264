use log::{ debug, warn };
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{ Path, PathBuf };
use std::sync::{ Arc, Mutex, PoisonError };
use thiserror::Error;

use super::{ Session, Theme };
use crate::models::chat::Message;

const MESSAGES_KEY: &str = "chatMessages";
const THEME_KEY: &str = "darkMode";
const ENDED_KEY: &str = "sessionEnded";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session file IO error: {0}")]
    Io(#[from] io::Error),
    #[error("session file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// String-keyed durable storage, the only thing the session layer needs from its medium.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// All entries kept in one JSON object on disk.
pub struct FileKeyValueStore {
    path: PathBuf,
}

impl FileKeyValueStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    fn read_entries(&self) -> Result<HashMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        // A corrupt file is replaced rather than blocking every later write.
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(key.to_string(), value.to_string());
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Best-effort persistence of a `Session`. Writes never fail the caller and reads
/// treat anything unexpected as "no prior session".
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn save(&self, session: &Session) {
        if let Err(e) = self.try_save(session) {
            warn!("Session save failed, continuing in memory: {}", e);
        }
    }

    fn try_save(&self, session: &Session) -> Result<(), StoreError> {
        let transcript = serde_json::to_string(&session.transcript)?;
        self.backend.set(MESSAGES_KEY, &transcript)?;
        self.backend.set(THEME_KEY, bool_flag(session.theme.is_dark()))?;
        self.backend.set(ENDED_KEY, bool_flag(session.ended))?;
        Ok(())
    }

    pub fn load(&self) -> Option<Session> {
        let raw = match self.backend.get(MESSAGES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                return None;
            }
            Err(e) => {
                warn!("Session load failed: {}", e);
                return None;
            }
        };

        let transcript: Vec<Message> = match serde_json::from_str(&raw) {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!("Discarding malformed stored transcript: {}", e);
                return None;
            }
        };
        if transcript.is_empty() {
            debug!("Stored transcript is empty, treating as no session");
            return None;
        }

        Some(Session {
            transcript,
            ended: self.read_flag(ENDED_KEY).unwrap_or(false),
            theme: self.load_theme(),
        })
    }

    pub fn load_theme(&self) -> Theme {
        Theme::from_dark_flag(self.read_flag(THEME_KEY).unwrap_or(false))
    }

    fn read_flag(&self, key: &str) -> Option<bool> {
        match self.backend.get(key) {
            Ok(Some(raw)) => serde_json::from_str::<bool>(raw.trim()).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("Reading '{}' from session store failed: {}", key, e);
                None
            }
        }
    }
}

fn bool_flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
