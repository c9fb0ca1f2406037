use helpdesk_service::TransportError;
use thiserror::Error;

/// A payload that cannot become a canonical thread.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("similarity score {score} out of range [0, 1] for incident {incident_id}")]
    ScoreOutOfRange { incident_id: String, score: f64 },
    #[error("conflicting non-empty message lists under `thread` and `messages`")]
    ConflictingMessageLists,
    #[error("response is for ticket {actual}, expected {expected}")]
    TicketMismatch { expected: String, actual: String },
}

/// An action rejected before any network call is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidOperation {
    #[error("no ticket is loaded")]
    NoActiveThread,
    #[error("ticket {0} is closed")]
    TicketClosed(String),
    #[error("a follow-up is already pending for ticket {0}")]
    FollowupPending(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum HelpdeskError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    InvalidOperation(#[from] InvalidOperation),
}

impl HelpdeskError {
    /// Transport failures leave prior state untouched and may be retried by
    /// re-invoking the same action.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T, E = HelpdeskError> = std::result::Result<T, E>;
