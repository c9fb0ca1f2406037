//! In-process backend for offline runs and demos.
//!
//! Emits payloads in the same wire shape as the HTTP backend: messages under
//! `thread` with a `timestamp` key, submitter as `user_upn`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use helpdesk_schema::NewTicket;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::{TicketService, TransportError};

const MAX_SIMILAR: usize = 3;

#[derive(Debug, Clone)]
struct StubTicket {
    ticket_id: String,
    subject: String,
    description: String,
    severity: String,
    submitter: Option<String>,
    created_at: String,
    status: String,
    thread: Vec<Value>,
}

#[derive(Default)]
struct StubState {
    tickets: HashMap<String, StubTicket>,
    order: Vec<String>,
}

#[derive(Default)]
pub struct StubTicketService {
    state: Mutex<StubState>,
}

impl StubTicketService {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn generate_ticket_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("TCK-{}", hex[..8].to_uppercase())
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}

fn similarity(a: &str, b: &str) -> f64 {
    let a = words(a);
    let b = words(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

fn agent_reply(subject: &str, text: &str) -> String {
    format!("[stub] Looking into \"{subject}\": {text}")
}

impl StubState {
    fn similar_to(&self, ticket: &StubTicket) -> Vec<Value> {
        let probe = format!("{} {}", ticket.subject, ticket.description);
        let mut scored: Vec<(f64, &StubTicket)> = self
            .tickets
            .values()
            .filter(|other| other.ticket_id != ticket.ticket_id)
            .map(|other| {
                let text = format!("{} {}", other.subject, other.description);
                (similarity(&probe, &text), other)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(MAX_SIMILAR)
            .map(|(score, other)| {
                json!({
                    "ticket_id": other.ticket_id,
                    "subject": other.subject,
                    "description": other.description,
                    "similarity_score": score,
                })
            })
            .collect()
    }

    fn payload(&self, ticket: &StubTicket) -> Value {
        let answer = ticket
            .thread
            .iter()
            .rev()
            .find(|m| m["role"] == "agent")
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string();
        json!({
            "ticket_id": ticket.ticket_id,
            "subject": ticket.subject,
            "description": ticket.description,
            "severity": ticket.severity,
            "user_upn": ticket.submitter,
            "created_at": ticket.created_at,
            "status": ticket.status,
            "answer": answer,
            "suggested_actions": [
                {
                    "title": "Collect diagnostics",
                    "steps": [
                        "Confirm the affected user and device",
                        "Capture the exact error message",
                    ],
                },
                "Check the service health dashboard",
            ],
            "followup_questions": [
                { "text": "When did the problem start?" },
                "Is anyone else affected?",
            ],
            "similar_incidents": self.similar_to(ticket),
            "thread": ticket.thread,
        })
    }
}

#[async_trait]
impl TicketService for StubTicketService {
    async fn create(&self, input: &NewTicket) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        let created_at = now_iso();
        let ticket = StubTicket {
            ticket_id: generate_ticket_id(),
            subject: input.subject.clone(),
            description: input.description.clone(),
            severity: input.severity.as_str().to_string(),
            submitter: input.submitter.clone(),
            created_at: created_at.clone(),
            status: "open".to_string(),
            thread: vec![
                json!({ "role": "user", "content": input.description, "timestamp": created_at }),
                json!({
                    "role": "agent",
                    "content": agent_reply(&input.subject, "initial triage started."),
                    "timestamp": now_iso(),
                }),
            ],
        };
        let payload = state.payload(&ticket);
        state.order.push(ticket.ticket_id.clone());
        state.tickets.insert(ticket.ticket_id.clone(), ticket);
        Ok(payload)
    }

    async fn list(&self) -> Result<Vec<Value>, TransportError> {
        let state = self.state.lock().await;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.tickets.get(id))
            .map(|t| {
                json!({
                    "ticket_id": t.ticket_id,
                    "subject": t.subject,
                    "severity": t.severity,
                    "user_upn": t.submitter,
                    "status": t.status,
                    "created_at": t.created_at,
                })
            })
            .collect())
    }

    async fn get_thread(&self, ticket_id: &str) -> Result<Value, TransportError> {
        let state = self.state.lock().await;
        let ticket = state
            .tickets
            .get(ticket_id)
            .ok_or_else(|| TransportError::not_found(ticket_id))?;
        Ok(state.payload(ticket))
    }

    async fn append_followup(&self, ticket_id: &str, text: &str) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        let ticket = state
            .tickets
            .get_mut(ticket_id)
            .ok_or_else(|| TransportError::not_found(ticket_id))?;
        let subject = ticket.subject.clone();
        ticket
            .thread
            .push(json!({ "role": "user", "content": text, "timestamp": now_iso() }));
        ticket.thread.push(json!({
            "role": "agent",
            "content": agent_reply(&subject, text),
            "timestamp": now_iso(),
        }));
        let ticket = ticket.clone();
        Ok(state.payload(&ticket))
    }

    async fn close(&self, ticket_id: &str) -> Result<Value, TransportError> {
        let mut state = self.state.lock().await;
        let ticket = state
            .tickets
            .get_mut(ticket_id)
            .ok_or_else(|| TransportError::not_found(ticket_id))?;
        ticket.status = "closed".to_string();
        Ok(json!({ "ticket_id": ticket_id, "status": "closed" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_thread_round_trips() {
        let service = StubTicketService::new();
        let created = service
            .create(&NewTicket::new("VPN down", "tunnel drops every hour"))
            .await
            .unwrap();
        let id = created["ticket_id"].as_str().unwrap().to_string();
        assert!(id.starts_with("TCK-"));
        assert_eq!(created["thread"].as_array().unwrap().len(), 2);

        let fetched = service.get_thread(&id).await.unwrap();
        assert_eq!(fetched["subject"], "VPN down");
    }

    #[tokio::test]
    async fn followup_appends_user_and_agent_turns() {
        let service = StubTicketService::new();
        let created = service
            .create(&NewTicket::new("Printer jam", "tray 2"))
            .await
            .unwrap();
        let id = created["ticket_id"].as_str().unwrap();
        let updated = service.append_followup(id, "still jammed").await.unwrap();
        let thread = updated["thread"].as_array().unwrap();
        assert_eq!(thread.len(), 4);
        assert_eq!(thread[2]["content"], "still jammed");
        assert_eq!(thread[3]["role"], "agent");
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let service = StubTicketService::new();
        service.create(&NewTicket::new("first", "a")).await.unwrap();
        service.create(&NewTicket::new("second", "b")).await.unwrap();
        let listed = service.list().await.unwrap();
        assert_eq!(listed[0]["subject"], "second");
        assert_eq!(listed[1]["subject"], "first");
    }

    #[tokio::test]
    async fn close_unknown_ticket_is_not_found() {
        let service = StubTicketService::new();
        let err = service.close("TCK-MISSING").await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn similar_incidents_reference_earlier_tickets() {
        let service = StubTicketService::new();
        service
            .create(&NewTicket::new("VPN disconnects", "vpn tunnel drops"))
            .await
            .unwrap();
        let second = service
            .create(&NewTicket::new("VPN down", "vpn tunnel unavailable"))
            .await
            .unwrap();
        let similar = second["similar_incidents"].as_array().unwrap();
        assert_eq!(similar.len(), 1);
        let score = similar[0]["similarity_score"].as_f64().unwrap();
        assert!(score > 0.0 && score <= 1.0);
    }

    #[test]
    fn similarity_is_bounded() {
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("vpn tunnel", "vpn tunnel"), 1.0);
    }
}
