use std::sync::Arc;

use helpdesk_schema::{HistoryEntry, NewTicket, TicketThread};
use helpdesk_service::TicketService;
use tokio::sync::Mutex;

use crate::error::{HelpdeskError, Result};
use crate::history::HistoryIndex;
use crate::normalize::{confirm_closed, normalize, normalize_history_entry};
use crate::store::{FollowupOutcome, LoadOutcome, TicketThreadStore};

/// Drives create / select / follow-up / close against a [`TicketService`],
/// keeping the active thread and the history list consistent.
pub struct LifecycleController {
    service: Arc<dyn TicketService>,
    store: TicketThreadStore,
    history: Mutex<HistoryIndex>,
}

impl LifecycleController {
    pub fn new(service: Arc<dyn TicketService>) -> Self {
        Self {
            store: TicketThreadStore::new(service.clone()),
            service,
            history: Mutex::new(HistoryIndex::new()),
        }
    }

    pub fn store(&self) -> &TicketThreadStore {
        &self.store
    }

    /// History entries, most recent first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().await.iter().cloned().collect()
    }

    pub async fn history_entry(&self, ticket_id: &str) -> Option<HistoryEntry> {
        self.history.lock().await.get(ticket_id).cloned()
    }

    /// Rebuild the history list from the backend listing. Items that fail
    /// validation are skipped. Returns the number of entries kept.
    pub async fn refresh_history(&self) -> Result<usize> {
        let listing = self.service.list().await?;
        let entries: Vec<HistoryEntry> = listing
            .iter()
            .filter_map(|raw| match normalize_history_entry(raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping invalid history item");
                    None
                }
            })
            .collect();

        let index = HistoryIndex::from_listing(entries);
        let count = index.len();
        *self.history.lock().await = index;
        tracing::info!(count, "history refreshed");
        Ok(count)
    }

    /// Create a ticket. The new thread becomes active and its entry is
    /// prepended to the history.
    pub async fn create(&self, input: &NewTicket) -> Result<TicketThread> {
        let raw = self.service.create(input).await?;
        let thread = normalize(&raw)?;

        self.history
            .lock()
            .await
            .record_created(thread.history_entry());
        self.store.install(thread.clone()).await;

        tracing::info!(
            ticket_id = thread.ticket_id(),
            severity = %thread.ticket.severity,
            "ticket created"
        );
        Ok(thread)
    }

    /// Select a ticket from the history. A selection made while an earlier
    /// one is still loading wins; the earlier response is discarded.
    pub async fn select(&self, ticket_id: &str) -> Result<LoadOutcome> {
        self.store.load(ticket_id).await
    }

    pub async fn follow_up(&self, text: &str) -> Result<FollowupOutcome> {
        self.store.append_followup(text).await
    }

    /// Close the active ticket. Returns its id.
    pub async fn close(&self) -> Result<String> {
        let ticket_id = self.store.active_open_ticket().await?;
        let raw = self.service.close(&ticket_id).await?;

        if let Err(e) = confirm_closed(&raw, &ticket_id) {
            let error = HelpdeskError::from(e);
            self.store.fail(&ticket_id, error.clone()).await;
            tracing::warn!(ticket_id = %ticket_id, error = %error, "close response rejected");
            return Err(error);
        }

        // The backend has closed it regardless of what the view shows now.
        self.history.lock().await.mark_closed(&ticket_id);
        if !self.store.mark_closed(&ticket_id).await {
            tracing::debug!(ticket_id = %ticket_id, "closed ticket is no longer active");
        }
        tracing::info!(ticket_id = %ticket_id, "ticket closed");
        Ok(ticket_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_schema::{Severity, TicketStatus};
    use helpdesk_service::StubTicketService;

    use crate::error::InvalidOperation;
    use crate::store::LoadState;

    fn controller() -> LifecycleController {
        LifecycleController::new(Arc::new(StubTicketService::new()))
    }

    #[tokio::test]
    async fn create_installs_thread_and_prepends_history() {
        let ctl = controller();
        let first = ctl
            .create(&NewTicket::new("Printer jam", "tray 2"))
            .await
            .unwrap();
        let second = ctl
            .create(&NewTicket::new("VPN down", "tunnel drops").with_severity(Severity::High))
            .await
            .unwrap();

        let history = ctl.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].ticket_id, second.ticket_id());
        assert_eq!(history[1].ticket_id, first.ticket_id());
        assert_eq!(history[0].status, TicketStatus::Open);

        let active = ctl.store().active_thread().await.unwrap();
        assert_eq!(active.ticket_id(), second.ticket_id());
        assert_eq!(active.ticket.severity, Severity::High);
    }

    #[tokio::test]
    async fn follow_up_then_close_with_stub() {
        let ctl = controller();
        let other = ctl
            .create(&NewTicket::new("Printer jam", "tray 2").with_severity(Severity::Low))
            .await
            .unwrap();
        let created = ctl
            .create(&NewTicket::new("VPN down", "tunnel drops").with_severity(Severity::High))
            .await
            .unwrap();
        let history_before = ctl.history().await;
        let before = created.messages.len();

        let outcome = ctl.follow_up("still broken").await.unwrap();
        assert_eq!(outcome, FollowupOutcome::Applied { appended: 2 });
        let active = ctl.store().active_thread().await.unwrap();
        assert_eq!(active.messages.len(), before + 2);

        let closed = ctl.close().await.unwrap();
        assert_eq!(closed, created.ticket_id());
        let active = ctl.store().active_thread().await.unwrap();
        assert!(!active.is_open());
        let history = ctl.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].ticket_id, closed);
        assert_eq!(history[0].status, TicketStatus::Closed);
        assert_eq!(history[0].subject, "VPN down");
        assert_eq!(history[0].severity, Severity::High);
        assert_eq!(history[1], history_before[1]);
        assert_eq!(history[1].ticket_id, other.ticket_id());
        assert_eq!(history[1].status, TicketStatus::Open);
        assert_eq!(history[1].severity, Severity::Low);

        let err = ctl.follow_up("anything").await.unwrap_err();
        assert_eq!(
            err,
            HelpdeskError::InvalidOperation(InvalidOperation::TicketClosed(closed.clone()))
        );
        let err = ctl.close().await.unwrap_err();
        assert!(matches!(
            err,
            HelpdeskError::InvalidOperation(InvalidOperation::TicketClosed(_))
        ));
    }

    #[tokio::test]
    async fn close_without_thread_is_rejected() {
        let ctl = controller();
        let err = ctl.close().await.unwrap_err();
        assert_eq!(
            err,
            HelpdeskError::InvalidOperation(InvalidOperation::NoActiveThread)
        );
    }

    #[tokio::test]
    async fn refresh_history_rebuilds_from_listing() {
        let service = Arc::new(StubTicketService::new());
        let a = service.create(&NewTicket::new("first", "a")).await.unwrap();
        let b = service.create(&NewTicket::new("second", "b")).await.unwrap();

        let ctl = LifecycleController::new(service);
        assert_eq!(ctl.refresh_history().await.unwrap(), 2);
        let history = ctl.history().await;
        assert_eq!(history[0].ticket_id, b["ticket_id"].as_str().unwrap());
        assert_eq!(history[1].ticket_id, a["ticket_id"].as_str().unwrap());
    }

    #[tokio::test]
    async fn select_unknown_ticket_fails_load() {
        let ctl = controller();
        let err = ctl.select("TCK-NOPE").await.unwrap_err();
        assert!(err.is_transport());
        assert!(matches!(
            ctl.store().load_state().await,
            LoadState::Failed { ref ticket_id, .. } if ticket_id == "TCK-NOPE"
        ));
    }
}
