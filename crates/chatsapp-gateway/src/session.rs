//! Login sessions keyed by an opaque cookie token.

use crate::flash::Flash;
use chatsapp_core::types::{Identity, Roster};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default session lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Token length in bytes before hex encoding.
const TOKEN_BYTES: usize = 32;

/// A logged-in user's session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Cookie token.
    pub token: String,

    /// Identity returned by the account service.
    pub identity: Identity,

    /// Contacts and groups fetched at login.
    pub roster: Roster,

    /// Created timestamp.
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Expiry instant.
    pub expires_at: Instant,

    flash: Option<Flash>,
}

impl Session {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Store of live sessions.
///
/// Lookups hand out owned snapshots. Expired entries are treated as absent
/// and removed when touched or swept.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl SessionStore {
    /// Create a store whose sessions live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Session lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a session and return its token.
    pub fn create(&self, identity: Identity, roster: Roster) -> String {
        let token = hex::encode(rand::random::<[u8; TOKEN_BYTES]>());
        let session = Session {
            token: token.clone(),
            identity,
            roster,
            created_at: chrono::Utc::now(),
            expires_at: Instant::now() + self.ttl,
            flash: None,
        };

        debug!(user_id = %session.identity.user_id, "Session created");
        self.sessions.insert(token.clone(), session);
        token
    }

    /// Look up a live session. Does not extend its expiry.
    pub fn resolve(&self, token: &str) -> Option<Session> {
        let now = Instant::now();
        let session = self.sessions.get(token)?;
        if session.is_expired(now) {
            drop(session);
            self.remove_expired(token, now);
            return None;
        }
        Some(session.clone())
    }

    /// Look up a session for a page render, taking its pending flash.
    pub fn resolve_page(&self, token: &str) -> Option<(Session, Option<Flash>)> {
        let now = Instant::now();
        let mut session = self.sessions.get_mut(token)?;
        if session.is_expired(now) {
            drop(session);
            self.remove_expired(token, now);
            return None;
        }
        let flash = session.flash.take();
        Some((session.clone(), flash))
    }

    /// Remove a session. Unknown tokens are ignored.
    pub fn destroy(&self, token: &str) {
        if let Some((_, session)) = self.sessions.remove(token) {
            debug!(user_id = %session.identity.user_id, "Session destroyed");
        }
    }

    /// Store a message for the next page render. Returns `false` if the
    /// session does not exist.
    pub fn attach_flash(&self, token: &str, flash: Flash) -> bool {
        let now = Instant::now();
        match self.sessions.get_mut(token) {
            Some(mut session) if !session.is_expired(now) => {
                session.flash = Some(flash);
                true
            }
            _ => false,
        }
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        before.saturating_sub(self.sessions.len())
    }

    /// Purge expired sessions every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            info!(purged, remaining = store.len(), "Purged expired sessions");
                        }
                    }
                }
            }
            debug!("Session sweeper stopped");
        })
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn remove_expired(&self, token: &str, now: Instant) {
        self.sessions
            .remove_if(token, |_, session| session.is_expired(now));
    }
}
