use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use rand::RngCore;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Number of random bytes behind a session token (hex encoded to 64 chars).
const SESSION_ID_BYTES: usize = 32;

/// Opaque session token carried in the `session` cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh token from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub authenticated: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            authenticated: false,
            created_at: Utc::now(),
        }
    }
}

/// Thread-safe in-memory session registry.
/// Sessions live for the whole process; nothing expires them.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<SessionId, Session>>,
    auth_enabled: bool,
}

impl SessionStore {
    pub fn new(auth_enabled: bool) -> Self {
        info!("Initializing session store (auth enabled: {})", auth_enabled);
        Self {
            sessions: Arc::new(DashMap::new()),
            auth_enabled,
        }
    }

    /// Register a new unauthenticated session and return its id.
    pub fn new_session(&self) -> SessionId {
        loop {
            let id = SessionId::generate();
            // Entry API keeps the uniqueness check and insert atomic
            if let Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                slot.insert(Session::new(id.clone()));
                debug!("Created session {}", short(&id));
                return id;
            }
        }
    }

    /// Mark a session authenticated, creating it if the id is unknown.
    pub fn authenticate_session(&self, id: &SessionId) {
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| Session::new(id.clone()))
            .authenticated = true;
    }

    pub fn is_authenticated(&self, id: &SessionId) -> bool {
        self.sessions
            .get(id)
            .map(|session| session.authenticated)
            .unwrap_or(false)
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_enabled
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every session. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }
}

/// Log-safe prefix of a token.
fn short(id: &SessionId) -> &str {
    &id.as_str()[..8.min(id.as_str().len())]
}
