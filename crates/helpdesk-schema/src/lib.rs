use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One turn of the ticket conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Canonical suggested action. `steps` is never empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestedAction {
    #[serde(default)]
    pub title: Option<String>,
    pub steps: Vec<String>,
}

impl SuggestedAction {
    pub fn single_step(step: impl Into<String>) -> Self {
        Self {
            title: None,
            steps: vec![step.into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowupQuestion {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarIncident {
    pub incident_id: String,
    pub subject: String,
    pub description: String,
    /// Always within `[0, 1]`.
    pub similarity_score: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub ticket_id: String,
    pub subject: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub submitter: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TicketStatus,
}

/// Canonical aggregate of one ticket: metadata, conversation and the
/// advisory panels from the most recent server response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketThread {
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Latest agent summary.
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub suggested_actions: Vec<SuggestedAction>,
    #[serde(default)]
    pub followup_questions: Vec<FollowupQuestion>,
    /// Sorted by descending score.
    #[serde(default)]
    pub similar_incidents: Vec<SimilarIncident>,
}

impl TicketThread {
    pub fn ticket_id(&self) -> &str {
        &self.ticket.ticket_id
    }

    pub fn is_open(&self) -> bool {
        self.ticket.status == TicketStatus::Open
    }

    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry::from(&self.ticket)
    }
}

/// Projection of a ticket used by the history list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub ticket_id: String,
    pub subject: String,
    pub severity: Severity,
    #[serde(default)]
    pub submitter: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TicketStatus,
}

impl From<&Ticket> for HistoryEntry {
    fn from(ticket: &Ticket) -> Self {
        Self {
            ticket_id: ticket.ticket_id.clone(),
            subject: ticket.subject.clone(),
            severity: ticket.severity,
            submitter: ticket.submitter.clone(),
            created_at: ticket.created_at,
            status: ticket.status,
        }
    }
}

/// Input for ticket creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTicket {
    pub subject: String,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<String>,
}

impl NewTicket {
    pub fn new(subject: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            description: description.into(),
            severity: Severity::default(),
            submitter: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ticket() -> Ticket {
        Ticket {
            ticket_id: "TCK-0001".to_string(),
            subject: "VPN down".to_string(),
            description: "Cannot connect".to_string(),
            severity: Severity::High,
            submitter: Some("alex@example.com".to_string()),
            created_at: None,
            status: TicketStatus::Open,
        }
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" low ".parse::<Severity>().unwrap(), Severity::Low);
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn status_defaults_to_open() {
        assert_eq!(TicketStatus::default(), TicketStatus::Open);
        let entry: HistoryEntry = serde_json::from_value(serde_json::json!({
            "ticket_id": "TCK-1",
            "subject": "Printer",
            "severity": "low"
        }))
        .unwrap();
        assert_eq!(entry.status, TicketStatus::Open);
    }

    #[test]
    fn thread_serializes_ticket_fields_flat() {
        let thread = TicketThread {
            ticket: sample_ticket(),
            answer: String::new(),
            messages: vec![],
            suggested_actions: vec![],
            followup_questions: vec![],
            similar_incidents: vec![],
        };
        let json = serde_json::to_value(&thread).unwrap();
        assert_eq!(json["ticket_id"], "TCK-0001");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["status"], "open");
        assert!(json["messages"].as_array().unwrap().is_empty());
    }

    #[test]
    fn history_entry_projects_ticket() {
        let ticket = sample_ticket();
        let entry = HistoryEntry::from(&ticket);
        assert_eq!(entry.ticket_id, ticket.ticket_id);
        assert_eq!(entry.subject, ticket.subject);
        assert_eq!(entry.submitter.as_deref(), Some("alex@example.com"));
        assert_eq!(entry.status, TicketStatus::Open);
    }

    #[test]
    fn new_ticket_omits_absent_submitter() {
        let input = NewTicket::new("VPN down", "...").with_severity(Severity::High);
        let json = serde_json::to_value(&input).unwrap();
        assert!(json.get("submitter").is_none());
        assert_eq!(json["severity"], "high");
    }
}
