pub mod http;
pub mod stub;

use async_trait::async_trait;
use helpdesk_schema::NewTicket;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use http::HttpTicketService;
pub use stub::StubTicketService;

/// Network or HTTP level failure reported by a [`TicketService`].
///
/// Independent of payload validity: a 200 response carrying a malformed
/// ticket is not a transport error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("ticket api error (timeout) [retryable]: request timed out")]
    Timeout,
    #[error("ticket api error (connect) [retryable]: {0}")]
    Connect(String),
    #[error("ticket api error ({status}){}: {body}", retryable_suffix(.status))]
    Status { status: u16, body: String },
    #[error("ticket api error (decode): {0}")]
    Decode(String),
    #[error("ticket api error: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Decode(_) | Self::Request(_) => false,
        }
    }

    pub fn not_found(ticket_id: &str) -> Self {
        Self::Status {
            status: 404,
            body: format!("ticket not found: {ticket_id}"),
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500..=599)
}

fn retryable_suffix(status: &u16) -> &'static str {
    if is_retryable_status(*status) {
        " [retryable]"
    } else {
        ""
    }
}

/// Backend collaborator. Every call returns the raw wire payload; callers
/// run it through the normalizer before use.
#[async_trait]
pub trait TicketService: Send + Sync {
    async fn create(&self, input: &NewTicket) -> Result<Value, TransportError>;
    async fn list(&self) -> Result<Vec<Value>, TransportError>;
    async fn get_thread(&self, ticket_id: &str) -> Result<Value, TransportError>;
    async fn append_followup(&self, ticket_id: &str, text: &str) -> Result<Value, TransportError>;
    async fn close(&self, ticket_id: &str) -> Result<Value, TransportError>;
    async fn health(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_history_limit() -> usize {
    50
}

/// Connection settings for the ticket backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Base URL of the ticket API (e.g., "http://localhost:8000")
    pub base_url: String,
    /// Bearer token sent with every request
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound for the history listing
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            history_limit: default_history_limit(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}
