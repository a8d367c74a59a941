use std::env;
use std::time::Duration;

/// Which parties a booking is checked against for double-booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictScope {
    /// A client may not hold two active appointments in the same slot.
    Client,
    /// Additionally, a consultancy may not be booked twice in the same slot.
    ClientAndConsultancy,
}

impl ConflictScope {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "client_and_consultancy" | "consultancy" | "both" => {
                ConflictScope::ClientAndConsultancy
            }
            _ => ConflictScope::Client,
        }
    }

    pub fn includes_consultancy(&self) -> bool {
        matches!(self, ConflictScope::ClientAndConsultancy)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionBackend {
    Memory,
    Database,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub llm_enabled: bool,
    pub ollama_url: String,
    pub ollama_model: String,
    pub session_backend: SessionBackend,
    pub session_ttl: Duration,
    pub chat_reply_delay: Duration,
    /// Zero disables the background sweep; expiry then happens on read only.
    pub sweep_interval: Duration,
    pub conflict_scope: ConflictScope,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "consultbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_default(),
            llm_enabled: env::var("LLM_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            session_backend: match env::var("SESSION_STORE").as_deref() {
                Ok("memory") => SessionBackend::Memory,
                _ => SessionBackend::Database,
            },
            session_ttl: Duration::from_secs(60 * env_u64("SESSION_TTL_MINUTES", 30)),
            chat_reply_delay: Duration::from_millis(env_u64("CHAT_REPLY_DELAY_MS", 600)),
            sweep_interval: Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 300)),
            conflict_scope: ConflictScope::parse(
                &env::var("CONFLICT_SCOPE").unwrap_or_default(),
            ),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
