//! The single active ticket thread and its load state machine.
//!
//! State transitions are plain functions on [`StoreState`]; the async store
//! only sequences them around network calls. The mutex guarding the state is
//! released before every `TicketService` await, so a slow response never
//! blocks a newer selection.

use std::collections::HashSet;
use std::sync::Arc;

use helpdesk_schema::{TicketStatus, TicketThread};
use helpdesk_service::TicketService;
use tokio::sync::Mutex;

use crate::error::{HelpdeskError, InvalidOperation, Result, ValidationError};
use crate::normalize::normalize;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading {
        ticket_id: String,
    },
    Loaded(TicketThread),
    Failed {
        ticket_id: String,
        error: HelpdeskError,
    },
}

impl LoadState {
    /// The ticket the view is currently about, whatever its load state.
    pub fn selected_ticket_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Loading { ticket_id } | Self::Failed { ticket_id, .. } => Some(ticket_id),
            Self::Loaded(thread) => Some(thread.ticket_id()),
        }
    }

    pub fn thread(&self) -> Option<&TicketThread> {
        match self {
            Self::Loaded(thread) => Some(thread),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading { .. } => "loading",
            Self::Loaded(_) => "loaded",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// The selection moved on, or a newer load of the same ticket already
    /// applied, before the response arrived.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowupOutcome {
    /// Blank text; nothing was sent.
    Ignored,
    Applied { appended: usize },
    /// The ticket was no longer active when the response arrived.
    Discarded,
}

/// Append-only merge of messages keyed by id; advisory panels and the answer
/// are replaced wholesale. Ticket metadata is left alone. Returns the number
/// of messages appended.
pub fn apply_server_snapshot(thread: &mut TicketThread, snapshot: TicketThread) -> usize {
    let known: HashSet<String> = thread.messages.iter().map(|m| m.id.clone()).collect();
    let before = thread.messages.len();
    thread.messages.extend(
        snapshot
            .messages
            .into_iter()
            .filter(|m| !known.contains(&m.id)),
    );

    thread.answer = snapshot.answer;
    thread.suggested_actions = snapshot.suggested_actions;
    thread.followup_questions = snapshot.followup_questions;
    thread.similar_incidents = snapshot.similar_incidents;

    thread.messages.len() - before
}

pub fn mark_closed(thread: &mut TicketThread) {
    thread.ticket.status = TicketStatus::Closed;
}

// ============================================================
// Pure transitions
// ============================================================

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    load: LoadState,
    pending_followups: HashSet<String>,
    /// Sequence of the last load issued, and of the last one applied.
    issued_loads: u64,
    applied_load: u64,
}

impl StoreState {
    fn is_selected(&self, ticket_id: &str) -> bool {
        self.load.selected_ticket_id() == Some(ticket_id)
    }

    /// Returns the sequence number of this request.
    fn begin_load(&mut self, ticket_id: &str) -> u64 {
        self.load = LoadState::Loading {
            ticket_id: ticket_id.to_string(),
        };
        self.issued_loads += 1;
        self.issued_loads
    }

    /// The ticket id is the request token: a result applies while that
    /// ticket is still selected, whether it is loading, loaded or failed.
    /// Among results for the same ticket, one older than the last applied is
    /// dropped.
    fn finish_load(
        &mut self,
        token: &str,
        seq: u64,
        result: std::result::Result<TicketThread, HelpdeskError>,
    ) -> Result<LoadOutcome> {
        if !self.is_selected(token) || seq < self.applied_load {
            tracing::warn!(ticket_id = token, seq, "discarding stale thread response");
            return Ok(LoadOutcome::Discarded);
        }
        self.applied_load = seq;

        let result = result.and_then(|thread| {
            if thread.ticket_id() == token {
                Ok(thread)
            } else {
                Err(ValidationError::TicketMismatch {
                    expected: token.to_string(),
                    actual: thread.ticket_id().to_string(),
                }
                .into())
            }
        });

        match result {
            Ok(thread) => {
                self.load = LoadState::Loaded(thread);
                Ok(LoadOutcome::Loaded)
            }
            Err(error) => {
                self.load = LoadState::Failed {
                    ticket_id: token.to_string(),
                    error: error.clone(),
                };
                Err(error)
            }
        }
    }

    fn install(&mut self, thread: TicketThread) {
        self.load = LoadState::Loaded(thread);
    }

    /// Returns the ticket id to send the follow-up for, or `None` for blank
    /// text.
    fn begin_followup(&mut self, text: &str) -> std::result::Result<Option<String>, InvalidOperation> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let thread = self.load.thread().ok_or(InvalidOperation::NoActiveThread)?;
        let ticket_id = thread.ticket_id().to_string();
        if !thread.is_open() {
            return Err(InvalidOperation::TicketClosed(ticket_id));
        }
        if !self.pending_followups.insert(ticket_id.clone()) {
            return Err(InvalidOperation::FollowupPending(ticket_id));
        }
        Ok(Some(ticket_id))
    }

    fn finish_followup(
        &mut self,
        ticket_id: &str,
        result: std::result::Result<TicketThread, HelpdeskError>,
    ) -> Result<FollowupOutcome> {
        self.pending_followups.remove(ticket_id);

        // Transport failures leave the thread exactly as it was.
        if let Err(error @ HelpdeskError::Transport(_)) = result {
            return Err(error);
        }

        let LoadState::Loaded(thread) = &mut self.load else {
            tracing::warn!(ticket_id, "follow-up resolved with no loaded thread, dropping");
            return Ok(FollowupOutcome::Discarded);
        };
        if thread.ticket_id() != ticket_id {
            tracing::warn!(ticket_id, "follow-up resolved after selection changed, dropping");
            return Ok(FollowupOutcome::Discarded);
        }

        let snapshot = result.and_then(|snapshot| {
            if snapshot.ticket_id() == ticket_id {
                Ok(snapshot)
            } else {
                Err(ValidationError::TicketMismatch {
                    expected: ticket_id.to_string(),
                    actual: snapshot.ticket_id().to_string(),
                }
                .into())
            }
        });

        match snapshot {
            Ok(snapshot) => Ok(FollowupOutcome::Applied {
                appended: apply_server_snapshot(thread, snapshot),
            }),
            Err(error) => {
                self.fail(ticket_id, error.clone());
                Err(error)
            }
        }
    }

    fn active_open_ticket(&self) -> std::result::Result<String, InvalidOperation> {
        let thread = self.load.thread().ok_or(InvalidOperation::NoActiveThread)?;
        if !thread.is_open() {
            return Err(InvalidOperation::TicketClosed(thread.ticket_id().to_string()));
        }
        Ok(thread.ticket_id().to_string())
    }

    fn mark_closed(&mut self, ticket_id: &str) -> bool {
        match &mut self.load {
            LoadState::Loaded(thread) if thread.ticket_id() == ticket_id => {
                mark_closed(thread);
                true
            }
            _ => false,
        }
    }

    fn fail(&mut self, ticket_id: &str, error: HelpdeskError) {
        self.load = LoadState::Failed {
            ticket_id: ticket_id.to_string(),
            error,
        };
    }
}

// ============================================================
// Store
// ============================================================

pub struct TicketThreadStore {
    service: Arc<dyn TicketService>,
    state: Mutex<StoreState>,
}

impl TicketThreadStore {
    pub fn new(service: Arc<dyn TicketService>) -> Self {
        Self {
            service,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub async fn load_state(&self) -> LoadState {
        self.state.lock().await.load.clone()
    }

    pub async fn active_thread(&self) -> Option<TicketThread> {
        self.state.lock().await.load.thread().cloned()
    }

    pub async fn selected_ticket_id(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .load
            .selected_ticket_id()
            .map(str::to_string)
    }

    pub async fn is_followup_pending(&self, ticket_id: &str) -> bool {
        self.state.lock().await.pending_followups.contains(ticket_id)
    }

    /// Select `ticket_id` and fetch its thread. A response that arrives after
    /// another ticket was selected is dropped and reported as
    /// [`LoadOutcome::Discarded`].
    pub async fn load(&self, ticket_id: &str) -> Result<LoadOutcome> {
        let seq = self.state.lock().await.begin_load(ticket_id);
        tracing::debug!(ticket_id, "loading thread");

        let result = match self.service.get_thread(ticket_id).await {
            Ok(raw) => normalize(&raw).map_err(HelpdeskError::from),
            Err(e) => Err(e.into()),
        };

        let outcome = self.state.lock().await.finish_load(ticket_id, seq, result);
        match &outcome {
            Ok(LoadOutcome::Loaded) => tracing::info!(ticket_id, "thread loaded"),
            Err(e) => tracing::warn!(ticket_id, error = %e, "thread load failed"),
            Ok(LoadOutcome::Discarded) => {}
        }
        outcome
    }

    /// Make a freshly created thread the active one.
    pub async fn install(&self, thread: TicketThread) {
        tracing::debug!(ticket_id = thread.ticket_id(), "installing thread");
        self.state.lock().await.install(thread);
    }

    /// Send a follow-up for the active ticket and merge the server's reply.
    pub async fn append_followup(&self, text: &str) -> Result<FollowupOutcome> {
        let Some(ticket_id) = self.state.lock().await.begin_followup(text)? else {
            return Ok(FollowupOutcome::Ignored);
        };

        let result = match self.service.append_followup(&ticket_id, text.trim()).await {
            Ok(raw) => normalize(&raw).map_err(HelpdeskError::from),
            Err(e) => Err(e.into()),
        };

        let outcome = self.state.lock().await.finish_followup(&ticket_id, result);
        match &outcome {
            Ok(FollowupOutcome::Applied { appended }) => {
                tracing::info!(ticket_id = %ticket_id, appended, "follow-up applied")
            }
            Err(e) => tracing::warn!(ticket_id = %ticket_id, error = %e, "follow-up failed"),
            Ok(_) => {}
        }
        outcome
    }

    /// Id of the active ticket, provided it is loaded and still open.
    pub async fn active_open_ticket(&self) -> Result<String> {
        Ok(self.state.lock().await.active_open_ticket()?)
    }

    /// Flip the active thread to closed if it is still `ticket_id`.
    pub async fn mark_closed(&self, ticket_id: &str) -> bool {
        self.state.lock().await.mark_closed(ticket_id)
    }

    /// Put the view into the failed state, if `ticket_id` is still selected.
    pub async fn fail(&self, ticket_id: &str, error: HelpdeskError) -> bool {
        let mut state = self.state.lock().await;
        if !state.is_selected(ticket_id) {
            return false;
        }
        state.fail(ticket_id, error);
        true
    }
}
