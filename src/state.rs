use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::{AppConfig, SessionBackend};
use crate::db;
use crate::services::ai::ollama::OllamaProvider;
use crate::services::ai::LlmProvider;
use crate::services::receipts::{ReceiptRenderer, TextReceiptRenderer};
use crate::services::sessions::{InMemorySessionStore, SessionStore, SqliteSessionStore};

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    /// `None` when no model is configured; chat then answers free-form
    /// questions with a fixed help text.
    pub llm: Option<Box<dyn LlmProvider>>,
    pub sessions: Box<dyn SessionStore>,
    pub receipts: Box<dyn ReceiptRenderer>,
}

impl AppState {
    /// Wires the collaborators selected by `config` around an open connection.
    pub fn new(conn: Connection, config: AppConfig) -> Self {
        let db = Arc::new(Mutex::new(conn));
        let ttl = chrono::Duration::from_std(config.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));

        let sessions: Box<dyn SessionStore> = match config.session_backend {
            SessionBackend::Memory => Box::new(InMemorySessionStore::new(ttl)),
            SessionBackend::Database => Box::new(SqliteSessionStore::new(Arc::clone(&db), ttl)),
        };

        let llm: Option<Box<dyn LlmProvider>> = if config.llm_enabled {
            tracing::info!(
                "using Ollama LLM provider (url: {}, model: {})",
                config.ollama_url,
                config.ollama_model
            );
            Some(Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
            )))
        } else {
            None
        };

        Self {
            db,
            config,
            llm,
            sessions,
            receipts: Box::new(TextReceiptRenderer),
        }
    }

    pub fn db(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        db::lock(&self.db)
    }
}
