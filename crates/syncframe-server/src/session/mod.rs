//! Durable per-visitor sessions.
//!
//! A session outlives any single connection: it is keyed by the
//! `session_id` cookie, loaded on every GET and reloaded before every action.
//! One-shot flash messages live inside it until the next render drains them.

mod memory;

use async_trait::async_trait;
pub use memory::MemorySessionStore;
use serde_json::{Map, Value};

use crate::error::SessionError;

const FLASH_KEY: &str = "_flash_";

/// Session contents plus a dirty flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    data: Map<String, Value>,
    dirty: bool,
}

impl Session {
    /// Empty session.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), data: Map::new(), dirty: false }
    }

    /// Session restored from storage.
    pub fn from_data(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self { id: id.into(), data, dirty: false }
    }

    /// Session id (the cookie value).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Write a value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
        self.dirty = true;
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key);
        self.dirty |= removed.is_some();
        removed
    }

    /// All stored values.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// `true` if modified since load.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag after a save.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Store one flash message.
    pub fn flash(&mut self, key: impl Into<String>, value: Value) {
        let flash = self.data.entry(FLASH_KEY).or_insert_with(|| Value::Object(Map::new()));
        if !flash.is_object() {
            *flash = Value::Object(Map::new());
        }
        if let Value::Object(messages) = flash {
            messages.insert(key.into(), value);
        }
        self.dirty = true;
    }

    /// Take every pending flash message, leaving none behind.
    pub fn take_flash(&mut self) -> Map<String, Value> {
        match self.data.get_mut(FLASH_KEY) {
            Some(Value::Object(messages)) if !messages.is_empty() => {
                self.dirty = true;
                std::mem::take(messages)
            },
            _ => Map::new(),
        }
    }
}

/// Durable session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session. Unknown ids yield an empty session with that id.
    async fn load(&self, id: &str) -> Result<Session, SessionError>;

    /// Persist a session.
    async fn save(&self, session: &Session) -> Result<(), SessionError>;
}
