use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Session, SessionStore};
use crate::error::SessionError;

/// In-memory session store.
///
/// Uses `HashMap` keyed by session id, wrapped in `Arc<Mutex<>>` so clones
/// share the same sessions. Sessions are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<HashMap<String, Map<String, Value>>>>,
}

impl MemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` if nothing has been saved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Session, SessionError> {
        let sessions = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(match sessions.get(id) {
            Some(data) => Session::from_data(id, data.clone()),
            None => Session::new(id),
        })
    }

    async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let mut sessions = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session.id().to_string(), session.data().clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn save_then_load() {
        let store = MemorySessionStore::new();
        let mut session = store.load("abc").await.unwrap();
        assert!(session.data().is_empty());

        session.set("user", json!("ada"));
        store.save(&session).await.unwrap();

        let reloaded = store.load("abc").await.unwrap();
        assert_eq!(reloaded.get("user"), Some(&json!("ada")));
        assert!(!reloaded.is_dirty());
        assert_eq!(store.len(), 1);
    }
}
