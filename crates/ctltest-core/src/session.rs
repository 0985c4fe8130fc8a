//! Session manager with a pluggable provider and an in-memory backend

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use rand::Rng;
use serde_json::Value;

/// Handle to one session's values. Clones share the same storage.
#[derive(Clone)]
pub struct SessionStore {
    id: Arc<str>,
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl SessionStore {
    fn new(id: &str) -> Self {
        Self {
            id: Arc::from(id),
            values: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn delete(&self, key: &str) -> Option<Value> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Remove every value.
    pub fn flush(&self) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both handles point at the same session.
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}

/// Storage backend for sessions.
pub trait SessionProvider: Send + Sync {
    /// Open the session `sid`, creating it if absent.
    fn read(&self, sid: &str) -> SessionStore;
    /// Whether `sid` exists.
    fn exists(&self, sid: &str) -> bool;
    /// Drop the session `sid`.
    fn destroy(&self, sid: &str);
    /// Number of live sessions.
    fn count(&self) -> usize;
}

/// Process-local provider; nothing is persisted and nothing expires.
#[derive(Default)]
pub struct MemoryProvider {
    sessions: RwLock<HashMap<String, SessionStore>>,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionProvider for MemoryProvider {
    fn read(&self, sid: &str) -> SessionStore {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(sid.to_string())
            .or_insert_with(|| SessionStore::new(sid))
            .clone()
    }

    fn exists(&self, sid: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(sid)
    }

    fn destroy(&self, sid: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sid);
    }

    fn count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Issues session ids and opens sessions through a provider.
#[derive(Clone)]
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    cookie_name: String,
}

impl SessionManager {
    #[must_use]
    pub fn new(provider: Arc<dyn SessionProvider>, cookie_name: impl Into<String>) -> Self {
        Self {
            provider,
            cookie_name: cookie_name.into(),
        }
    }

    /// Manager backed by a fresh [`MemoryProvider`].
    #[must_use]
    pub fn memory(cookie_name: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryProvider::new()), cookie_name)
    }

    /// Cookie name carrying the session id (may be empty).
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Start a new session under a freshly generated id.
    #[must_use]
    pub fn regenerate_id(&self) -> SessionStore {
        loop {
            let sid = session_id();
            if !self.provider.exists(&sid) {
                return self.provider.read(&sid);
            }
        }
    }

    /// Open an existing session, or `None` if `sid` is unknown.
    #[must_use]
    pub fn open(&self, sid: &str) -> Option<SessionStore> {
        self.provider
            .exists(sid)
            .then(|| self.provider.read(sid))
    }

    pub fn destroy(&self, sid: &str) {
        self.provider.destroy(sid);
    }

    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.provider.count()
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("cookie_name", &self.cookie_name)
            .field("active_sessions", &self.active_sessions())
            .finish_non_exhaustive()
    }
}

/// 128 random bits, hex encoded.
fn session_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().r#gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
