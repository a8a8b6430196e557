//! Conversation sessions: the per-visitor dialogue state, where it is stored,
//! and the manager that serializes turns on the same session.

use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    booking::BookingState,
    clock::Clock,
    error::StoreError,
    support::SupportState,
    types::{DialogueStep, FlowKind, Language},
};

/// Where the session currently is. Each flow owns its own state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Flow {
    #[default]
    General,
    Booking(BookingState),
    Support(SupportState),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub id: String,
    pub language: Language,
    pub flow: Flow,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub revision: u64,
}

impl ConversationSession {
    pub fn new(id: impl Into<String>, language: Language, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            language,
            flow: Flow::General,
            created_at: now,
            last_activity_at: now,
            revision: 0,
        }
    }

    pub fn step(&self) -> DialogueStep {
        match &self.flow {
            Flow::General => DialogueStep::General,
            Flow::Booking(state) => state.step.into(),
            Flow::Support(state) => state.step.into(),
        }
    }

    pub fn flow_kind(&self) -> Option<FlowKind> {
        match self.flow {
            Flow::General => None,
            Flow::Booking(_) => Some(FlowKind::Booking),
            Flow::Support(_) => Some(FlowKind::Support),
        }
    }

    /// The fields collected so far, as shown to clients.
    pub fn collected(&self) -> Value {
        match &self.flow {
            Flow::General => Value::Object(Default::default()),
            Flow::Booking(state) => state.draft.collected(),
            Flow::Support(state) => state.draft.collected(),
        }
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle: chrono::Duration) -> bool {
        now - self.last_activity_at > idle
    }
}

/// Storage for sessions. Revisions guard against lost updates between processes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &ConversationSession) -> Result<(), StoreError>;
    async fn load(&self, id: &str) -> Result<Option<ConversationSession>, StoreError>;
    /// Writes `session` only if the stored revision still equals `expected`.
    async fn save(&self, session: &ConversationSession, expected: u64) -> Result<(), StoreError>;
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, ConversationSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: &ConversationSession) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<ConversationSession>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save(&self, session: &ConversationSession, expected: u64) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(current) if current.revision == expected => {
                *current = session.clone();
                Ok(())
            }
            _ => Err(StoreError::StaleRevision(session.id.clone())),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_activity_at >= cutoff);
        Ok((before - sessions.len()) as u64)
    }
}

/// Sessions in the `chat_sessions` table, the full state kept as JSON text.
#[derive(Clone)]
pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Fixed-width UTC so text comparison orders timestamps.
fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &ConversationSession) -> Result<(), StoreError> {
        let state = serde_json::to_string(session)?;
        sqlx::query(
            "INSERT INTO chat_sessions (id, language, state, revision, created_at, last_activity_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET language = $2, state = $3, revision = $4, created_at = $5, last_activity_at = $6",
        )
        .bind(&session.id)
        .bind(session.language.as_str())
        .bind(&state)
        .bind(session.revision as i64)
        .bind(stamp(session.created_at))
        .bind(stamp(session.last_activity_at))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<ConversationSession>, StoreError> {
        let row = sqlx::query("SELECT state FROM chat_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => {
                let state: String = row.get("state");
                Ok(Some(serde_json::from_str(&state)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &ConversationSession, expected: u64) -> Result<(), StoreError> {
        let state = serde_json::to_string(session)?;
        let updated = sqlx::query(
            "UPDATE chat_sessions SET language = $2, state = $3, revision = $4, last_activity_at = $5 \
             WHERE id = $1 AND revision = $6",
        )
        .bind(&session.id)
        .bind(session.language.as_str())
        .bind(&state)
        .bind(session.revision as i64)
        .bind(stamp(session.last_activity_at))
        .bind(expected as i64)
        .execute(&self.db)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::StaleRevision(session.id.clone()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let deleted = sqlx::query("DELETE FROM chat_sessions WHERE last_activity_at < $1")
            .bind(stamp(cutoff))
            .execute(&self.db)
            .await?;
        Ok(deleted.rows_affected())
    }
}

/// Result of looking a session up by id.
#[derive(Debug)]
pub enum Lookup {
    Found(ConversationSession),
    /// The id existed but sat idle past the timeout; it has been removed.
    Expired,
    Missing,
}

/// How a checked-out session came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Existing,
    Fresh,
    /// A new session replacing one that expired under the same id.
    Replaced,
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    idle_timeout: chrono::Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        idle_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            clock,
            idle_timeout: chrono::Duration::from_std(idle_timeout)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn create(&self, language: Language) -> Result<ConversationSession, StoreError> {
        let session = ConversationSession::new(Uuid::new_v4().to_string(), language, self.clock.now());
        self.store.insert(&session).await?;
        debug!(session_id = %session.id, language = language.as_str(), "session created");
        Ok(session)
    }

    /// Reads a session, removing it if it has been idle too long.
    pub async fn get(&self, id: &str) -> Result<Lookup, StoreError> {
        let Some(session) = self.store.load(id).await? else {
            return Ok(Lookup::Missing);
        };
        if session.is_idle(self.clock.now(), self.idle_timeout) {
            self.store.delete(id).await?;
            info!(session_id = %id, "session expired");
            return Ok(Lookup::Expired);
        }
        Ok(Lookup::Found(session))
    }

    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock(id).await;
        self.store.delete(id).await
    }

    async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Takes the session's turn lock and returns a working copy of it.
    pub async fn checkout(&self, id: &str) -> Result<Option<SessionLease<'_>>, StoreError> {
        let guard = self.lock(id).await;
        match self.get(id).await? {
            Lookup::Found(session) => Ok(Some(SessionLease {
                manager: self,
                _guard: guard,
                base_revision: Some(session.revision),
                session,
            })),
            Lookup::Expired | Lookup::Missing => Ok(None),
        }
    }

    /// Like [`checkout`](Self::checkout) but starts a new session under `id`
    /// when there is none. The new session is stored on commit.
    pub async fn checkout_or_start(
        &self,
        id: &str,
        language: Language,
    ) -> Result<(SessionLease<'_>, Origin), StoreError> {
        let guard = self.lock(id).await;
        let (session, base_revision, origin) = match self.get(id).await? {
            Lookup::Found(session) => {
                let revision = session.revision;
                (session, Some(revision), Origin::Existing)
            }
            Lookup::Expired => (
                ConversationSession::new(id, language, self.clock.now()),
                None,
                Origin::Replaced,
            ),
            Lookup::Missing => (
                ConversationSession::new(id, language, self.clock.now()),
                None,
                Origin::Fresh,
            ),
        };
        Ok((
            SessionLease {
                manager: self,
                _guard: guard,
                session,
                base_revision,
            },
            origin,
        ))
    }

    /// Applies `mutate` to an existing session and stores the result.
    pub async fn touch_and_mutate<R>(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut ConversationSession) -> R,
    ) -> Result<Option<R>, StoreError> {
        let Some(mut lease) = self.checkout(id).await? else {
            return Ok(None);
        };
        let out = mutate(&mut lease.session);
        lease.commit().await?;
        Ok(Some(out))
    }

    /// Drops idle sessions and turn locks nobody is holding.
    pub async fn sweep(&self) -> Result<u64, StoreError> {
        let cutoff = self.clock.now() - self.idle_timeout;
        let removed = self.store.delete_idle_since(cutoff).await?;
        self.locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        if removed > 0 {
            info!(removed, "expired sessions purged");
        }
        Ok(removed)
    }

    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = manager.sweep().await {
                    warn!(error = %err, "session sweep failed");
                }
            }
        })
    }
}

/// Exclusive hold on one session for the length of a turn. Dropping the lease
/// without committing discards the changes.
pub struct SessionLease<'a> {
    manager: &'a SessionManager,
    _guard: OwnedMutexGuard<()>,
    session: ConversationSession,
    base_revision: Option<u64>,
}

impl SessionLease<'_> {
    pub fn is_stored(&self) -> bool {
        self.base_revision.is_some()
    }

    /// Stamps the activity time and writes the session back.
    pub async fn commit(mut self) -> Result<ConversationSession, StoreError> {
        self.session.last_activity_at = self.manager.clock.now();
        match self.base_revision {
            Some(expected) => {
                self.session.revision = expected + 1;
                self.manager.store.save(&self.session, expected).await?;
            }
            None => {
                self.session.revision = 0;
                self.manager.store.insert(&self.session).await?;
            }
        }
        Ok(self.session)
    }

    /// Ends the session for good.
    pub async fn finish(self) -> Result<ConversationSession, StoreError> {
        if self.is_stored() {
            self.manager.store.delete(&self.session.id).await?;
        }
        Ok(self.session)
    }
}

impl Deref for SessionLease<'_> {
    type Target = ConversationSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl DerefMut for SessionLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::clock::ManualClock;

    fn setup() -> (Arc<SessionManager>, Arc<ManualClock>, Arc<InMemorySessionStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemorySessionStore::new());
        let manager = Arc::new(SessionManager::new(
            store.clone(),
            clock.clone(),
            std::time::Duration::from_secs(3600),
        ));
        (manager, clock, store)
    }

    #[tokio::test]
    async fn created_sessions_are_distinct_and_readable() {
        let (manager, _, _) = setup();
        let a = manager.create(Language::It).await.unwrap();
        let b = manager.create(Language::En).await.unwrap();
        assert_ne!(a.id, b.id);
        match manager.get(&b.id).await.unwrap() {
            Lookup::Found(s) => {
                assert_eq!(s.language, Language::En);
                assert_eq!(s.step(), DialogueStep::General);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn idle_sessions_expire_on_read() {
        let (manager, clock, _) = setup();
        let s = manager.create(Language::It).await.unwrap();
        clock.advance(Duration::minutes(59));
        assert!(matches!(manager.get(&s.id).await.unwrap(), Lookup::Found(_)));
        clock.advance(Duration::minutes(2));
        assert!(matches!(manager.get(&s.id).await.unwrap(), Lookup::Expired));
        assert!(matches!(manager.get(&s.id).await.unwrap(), Lookup::Missing));
    }

    #[tokio::test]
    async fn commit_touches_and_bumps_revision() {
        let (manager, clock, _) = setup();
        let s = manager.create(Language::It).await.unwrap();
        clock.advance(Duration::minutes(50));
        let touched = manager
            .touch_and_mutate(&s.id, |session| session.language = Language::En)
            .await
            .unwrap();
        assert!(touched.is_some());
        clock.advance(Duration::minutes(50));
        let Lookup::Found(after) = manager.get(&s.id).await.unwrap() else {
            panic!("session should still be alive");
        };
        assert_eq!(after.revision, 1);
        assert_eq!(after.language, Language::En);

        let missing = manager.touch_and_mutate("nope", |_| ()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn dropped_lease_discards_changes() {
        let (manager, _, _) = setup();
        let s = manager.create(Language::It).await.unwrap();
        {
            let mut lease = manager.checkout(&s.id).await.unwrap().unwrap();
            lease.language = Language::En;
        }
        let Lookup::Found(after) = manager.get(&s.id).await.unwrap() else {
            panic!("missing");
        };
        assert_eq!(after.language, Language::It);
        assert_eq!(after.revision, 0);
    }

    #[tokio::test]
    async fn stale_revisions_are_refused() {
        let store = InMemorySessionStore::new();
        let now = Utc::now();
        let mut s = ConversationSession::new("s1", Language::It, now);
        store.insert(&s).await.unwrap();
        s.revision = 1;
        store.save(&s, 0).await.unwrap();
        s.revision = 2;
        assert!(matches!(
            store.save(&s, 0).await,
            Err(StoreError::StaleRevision(_))
        ));
    }

    #[tokio::test]
    async fn checkout_or_start_reports_origin() {
        let (manager, clock, store) = setup();
        let (lease, origin) = manager.checkout_or_start("abc", Language::En).await.unwrap();
        assert_eq!(origin, Origin::Fresh);
        assert!(!lease.is_stored());
        lease.commit().await.unwrap();
        assert_eq!(store.len().await, 1);

        let (lease, origin) = manager.checkout_or_start("abc", Language::It).await.unwrap();
        assert_eq!(origin, Origin::Existing);
        assert_eq!(lease.language, Language::En);
        drop(lease);

        clock.advance(Duration::hours(2));
        let (lease, origin) = manager.checkout_or_start("abc", Language::It).await.unwrap();
        assert_eq!(origin, Origin::Replaced);
        let finished = lease.finish().await.unwrap();
        assert_eq!(finished.id, "abc");
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn turns_on_one_session_are_serialized() {
        let (manager, _, _) = setup();
        let s = manager.create(Language::It).await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let id = s.id.clone();
            handles.push(tokio::spawn(async move {
                let lease = manager.checkout(&id).await.unwrap().unwrap();
                tokio::task::yield_now().await;
                lease.commit().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let Lookup::Found(after) = manager.get(&s.id).await.unwrap() else {
            panic!("missing");
        };
        assert_eq!(after.revision, 8);
    }

    #[tokio::test]
    async fn sweep_purges_idle_sessions() {
        let (manager, clock, store) = setup();
        let old = manager.create(Language::It).await.unwrap();
        clock.advance(Duration::minutes(45));
        let fresh = manager.create(Language::It).await.unwrap();
        clock.advance(Duration::minutes(30));
        assert_eq!(manager.sweep().await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
        assert!(matches!(manager.get(&old.id).await.unwrap(), Lookup::Missing));
        assert!(matches!(manager.get(&fresh.id).await.unwrap(), Lookup::Found(_)));
    }
}
