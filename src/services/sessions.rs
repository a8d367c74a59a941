use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::Connection;
use tokio::sync::RwLock;

use crate::db::{self, queries};
use crate::models::ChatSession;

/// Keyed storage for chat sessions with a sliding idle timeout. Every `set`
/// pushes the expiry out to `last_activity + ttl`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<ChatSession>>;
    async fn set(&self, session: &ChatSession) -> anyhow::Result<()>;
    async fn expire(&self, session_id: &str) -> anyhow::Result<()>;
    /// Drops everything past its expiry. Returns how many sessions went.
    async fn purge_expired(&self) -> anyhow::Result<usize>;
}

pub struct InMemorySessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, (ChatSession, NaiveDateTime)>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<ChatSession>> {
        let now = Utc::now().naive_utc();
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(session, _)| session.clone()))
    }

    async fn set(&self, session: &ChatSession) -> anyhow::Result<()> {
        let expires_at = session.expires_at(self.ttl);
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), (session.clone(), expires_at));
        Ok(())
    }

    async fn expire(&self, session_id: &str) -> anyhow::Result<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let now = Utc::now().naive_utc();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(before - sessions.len())
    }
}

/// Sessions persisted in the `chat_sessions` table, so they survive restarts.
pub struct SqliteSessionStore {
    ttl: Duration,
    db: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    pub fn new(db: Arc<Mutex<Connection>>, ttl: Duration) -> Self {
        Self { ttl, db }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, session_id: &str) -> anyhow::Result<Option<ChatSession>> {
        let conn = db::lock(&self.db)?;
        queries::get_chat_session(&conn, session_id, &Utc::now().naive_utc())
    }

    async fn set(&self, session: &ChatSession) -> anyhow::Result<()> {
        let conn = db::lock(&self.db)?;
        queries::save_chat_session(&conn, session, &session.expires_at(self.ttl))
    }

    async fn expire(&self, session_id: &str) -> anyhow::Result<()> {
        let conn = db::lock(&self.db)?;
        queries::delete_chat_session(&conn, session_id)
    }

    async fn purge_expired(&self) -> anyhow::Result<usize> {
        let conn = db::lock(&self.db)?;
        queries::expire_old_sessions(&conn, &Utc::now().naive_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStep;

    fn stores() -> Vec<Box<dyn SessionStore>> {
        let conn = db::init_db(":memory:").unwrap();
        vec![
            Box::new(InMemorySessionStore::new(Duration::minutes(30))),
            Box::new(SqliteSessionStore::new(Arc::new(Mutex::new(conn)), Duration::minutes(30))),
        ]
    }

    #[tokio::test]
    async fn test_set_get_expire() {
        for store in stores() {
            let mut session = ChatSession::new("s1".to_string(), Some("user-1".to_string()));
            session.push("user", "hello");
            store.set(&session).await.unwrap();

            let loaded = store.get("s1").await.unwrap().unwrap();
            assert_eq!(loaded.user_id.as_deref(), Some("user-1"));
            assert_eq!(loaded.history.len(), 1);
            assert_eq!(loaded.step, BookingStep::Idle);

            store.expire("s1").await.unwrap();
            assert!(store.get("s1").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_idle_session_is_gone() {
        for store in stores() {
            let mut session = ChatSession::new("s2".to_string(), None);
            session.last_activity = Utc::now().naive_utc() - Duration::minutes(31);
            store.set(&session).await.unwrap();

            assert!(store.get("s2").await.unwrap().is_none());
            assert_eq!(store.purge_expired().await.unwrap(), 1);
            assert_eq!(store.purge_expired().await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_activity_slides_expiry() {
        for store in stores() {
            let mut session = ChatSession::new("s3".to_string(), None);
            session.last_activity = Utc::now().naive_utc() - Duration::minutes(29);
            store.set(&session).await.unwrap();
            assert!(store.get("s3").await.unwrap().is_some());

            session.last_activity = Utc::now().naive_utc();
            store.set(&session).await.unwrap();
            assert_eq!(store.purge_expired().await.unwrap(), 0);
            assert!(store.get("s3").await.unwrap().is_some());
        }
    }
}
