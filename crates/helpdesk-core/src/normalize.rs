//! Wire payload normalization.
//!
//! The backend is not consistent about field names or shapes. Everything in
//! this module maps whatever arrives onto the canonical types from
//! `helpdesk_schema`; no other component looks at raw payloads.
//!
//! Key precedence (first non-null key wins):
//! - message list: `thread`, then `messages` (fallback only when `thread` is
//!   absent or empty)
//! - message / ticket timestamp: `created_at`, then `timestamp`
//! - submitter: `submitter`, then `user_upn`
//! - similar incident id: `incident_id`, then `ticket_id`

use chrono::{DateTime, NaiveDateTime, Utc};
use helpdesk_schema::{
    FollowupQuestion, HistoryEntry, Message, Role, Severity, SimilarIncident, SuggestedAction,
    Ticket, TicketStatus, TicketThread,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ValidationError;

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

// ============================================================
// Wire shapes
// ============================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(serde_json::Number),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireThread {
    ticket_id: Option<WireId>,
    subject: Option<String>,
    description: Option<String>,
    severity: Option<String>,
    submitter: Option<String>,
    user_upn: Option<String>,
    created_at: Option<Value>,
    timestamp: Option<Value>,
    status: Option<String>,
    answer: Option<String>,
    thread: Option<Vec<WireMessage>>,
    messages: Option<Vec<WireMessage>>,
    suggested_actions: Option<Vec<WireAction>>,
    followup_questions: Option<Vec<WireQuestion>>,
    similar_incidents: Option<Vec<WireIncident>>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: Option<WireId>,
    role: Option<String>,
    content: Option<String>,
    created_at: Option<Value>,
    timestamp: Option<Value>,
}

/// Suggested actions arrive either structured or as a bare step.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireAction {
    Bare(String),
    Structured {
        title: Option<String>,
        steps: Option<Vec<String>>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireQuestion {
    Bare(String),
    Structured { text: Option<String> },
}

#[derive(Debug, Deserialize)]
struct WireIncident {
    incident_id: Option<WireId>,
    ticket_id: Option<WireId>,
    subject: Option<String>,
    description: Option<String>,
    similarity_score: Option<f64>,
    created_at: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireHistoryEntry {
    ticket_id: Option<WireId>,
    subject: Option<String>,
    severity: Option<String>,
    submitter: Option<String>,
    user_upn: Option<String>,
    created_at: Option<Value>,
    timestamp: Option<Value>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCloseAck {
    ticket_id: Option<WireId>,
    status: Option<String>,
}

// ============================================================
// Public entry points
// ============================================================

/// Map a raw thread payload (creation, fetch or follow-up response) onto a
/// canonical [`TicketThread`].
///
/// Fails only when identity fields are missing or a value is out of its
/// domain; every other field is defaulted. Feeding the serialized output
/// back in yields the same thread.
pub fn normalize(raw: &Value) -> Result<TicketThread, ValidationError> {
    let wire: WireThread = decode(raw)?;

    let ticket_id = required_id(wire.ticket_id)?;
    let subject = required_text("subject", wire.subject)?;

    let ticket = Ticket {
        subject,
        description: wire.description.unwrap_or_default(),
        severity: parse_severity(wire.severity.as_deref())?,
        submitter: non_blank(wire.submitter.or(wire.user_upn)),
        created_at: first_timestamp(wire.created_at.as_ref(), wire.timestamp.as_ref()),
        status: parse_status(wire.status.as_deref())?,
        ticket_id,
    };

    let messages = select_messages(&ticket.ticket_id, wire.thread, wire.messages)?;
    let suggested_actions = collapse_actions(wire.suggested_actions.unwrap_or_default());
    let followup_questions = collapse_questions(wire.followup_questions.unwrap_or_default());
    let similar_incidents = rank_incidents(wire.similar_incidents.unwrap_or_default())?;

    Ok(TicketThread {
        ticket,
        answer: wire.answer.unwrap_or_default(),
        messages,
        suggested_actions,
        followup_questions,
        similar_incidents,
    })
}

/// Map one raw item of the history listing.
pub fn normalize_history_entry(raw: &Value) -> Result<HistoryEntry, ValidationError> {
    let wire: WireHistoryEntry = decode(raw)?;
    Ok(HistoryEntry {
        ticket_id: required_id(wire.ticket_id)?,
        subject: required_text("subject", wire.subject)?,
        severity: parse_severity(wire.severity.as_deref())?,
        submitter: non_blank(wire.submitter.or(wire.user_upn)),
        created_at: first_timestamp(wire.created_at.as_ref(), wire.timestamp.as_ref()),
        status: parse_status(wire.status.as_deref())?,
    })
}

/// Check a close response. The backend may answer with a bare
/// `{ticket_id, status}` acknowledgement or a full thread; either must name
/// the closed ticket and must say `closed`. A missing status reads as open,
/// as it does in [`normalize`], so it is rejected.
pub fn confirm_closed(raw: &Value, expected_ticket_id: &str) -> Result<(), ValidationError> {
    let ack: WireCloseAck = decode(raw)?;
    if let Some(id) = ack.ticket_id {
        let actual = id.into_string();
        if actual != expected_ticket_id {
            return Err(ValidationError::TicketMismatch {
                expected: expected_ticket_id.to_string(),
                actual,
            });
        }
    }
    let raw_status = ack
        .status
        .ok_or(ValidationError::MissingField("status"))?;
    match parse_status(Some(&raw_status))? {
        TicketStatus::Closed => Ok(()),
        TicketStatus::Open => Err(ValidationError::InvalidField {
            field: "status",
            value: raw_status,
        }),
    }
}

// ============================================================
// Field helpers
// ============================================================

fn decode<'a, T: Deserialize<'a>>(raw: &'a Value) -> Result<T, ValidationError> {
    if !raw.is_object() {
        return Err(ValidationError::NotAnObject);
    }
    T::deserialize(raw).map_err(|e| ValidationError::Malformed(e.to_string()))
}

fn required_id(id: Option<WireId>) -> Result<String, ValidationError> {
    let id = id.map(WireId::into_string).unwrap_or_default();
    if id.trim().is_empty() {
        return Err(ValidationError::MissingField("ticket_id"));
    }
    Ok(id)
}

fn required_text(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(field)),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_severity(raw: Option<&str>) -> Result<Severity, ValidationError> {
    match raw {
        None => Ok(Severity::default()),
        Some(s) => s.parse().map_err(|_| ValidationError::InvalidField {
            field: "severity",
            value: s.to_string(),
        }),
    }
}

fn parse_status(raw: Option<&str>) -> Result<TicketStatus, ValidationError> {
    match raw {
        None => Ok(TicketStatus::default()),
        Some(s) => s.parse().map_err(|_| ValidationError::InvalidField {
            field: "status",
            value: s.to_string(),
        }),
    }
}

/// Presence decides precedence: a present but unreadable primary key yields
/// no timestamp rather than consulting the secondary key.
fn first_timestamp(primary: Option<&Value>, secondary: Option<&Value>) -> Option<DateTime<Utc>> {
    let value = primary.or(secondary)?;
    let parsed = parse_timestamp(value);
    if parsed.is_none() {
        tracing::debug!(%value, "unreadable timestamp, leaving it unset");
    }
    parsed
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ============================================================
// Collections
// ============================================================

fn select_messages(
    ticket_id: &str,
    primary: Option<Vec<WireMessage>>,
    secondary: Option<Vec<WireMessage>>,
) -> Result<Vec<Message>, ValidationError> {
    let primary = convert_messages(ticket_id, primary.unwrap_or_default())?;
    let secondary = convert_messages(ticket_id, secondary.unwrap_or_default())?;

    if primary.is_empty() {
        return Ok(secondary);
    }
    if !secondary.is_empty() && secondary != primary {
        tracing::warn!(
            ticket_id,
            thread_len = primary.len(),
            messages_len = secondary.len(),
            "payload carries two different message lists"
        );
        return Err(ValidationError::ConflictingMessageLists);
    }
    Ok(primary)
}

/// Messages without an id get a positional one (`{ticket_id}#{index}`), so a
/// full-thread response lines up with the thread it extends.
fn convert_messages(
    ticket_id: &str,
    wire: Vec<WireMessage>,
) -> Result<Vec<Message>, ValidationError> {
    wire.into_iter()
        .enumerate()
        .map(|(index, m)| -> Result<Message, ValidationError> {
            let role = match m.role.as_deref() {
                None => Role::User,
                Some(r) => r.parse().map_err(|_| ValidationError::InvalidField {
                    field: "role",
                    value: r.to_string(),
                })?,
            };
            let id = m
                .id
                .map(WireId::into_string)
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("{ticket_id}#{index}"));
            Ok(Message {
                id,
                role,
                content: m.content.unwrap_or_default(),
                created_at: first_timestamp(m.created_at.as_ref(), m.timestamp.as_ref()),
            })
        })
        .collect()
}

fn collapse_actions(wire: Vec<WireAction>) -> Vec<SuggestedAction> {
    wire.into_iter()
        .filter_map(|action| match action {
            WireAction::Bare(step) => {
                let step = step.trim();
                (!step.is_empty()).then(|| SuggestedAction::single_step(step))
            }
            WireAction::Structured { title, steps } => {
                let title = non_blank(title.map(|t| t.trim().to_string()));
                let mut steps: Vec<String> = steps
                    .unwrap_or_default()
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if steps.is_empty() {
                    // A titled action with no steps keeps its title as the only step.
                    steps.push(title.clone()?);
                }
                Some(SuggestedAction { title, steps })
            }
        })
        .collect()
}

fn collapse_questions(wire: Vec<WireQuestion>) -> Vec<FollowupQuestion> {
    wire.into_iter()
        .filter_map(|question| {
            let text = match question {
                WireQuestion::Bare(text) => text,
                WireQuestion::Structured { text } => text?,
            };
            let text = text.trim();
            (!text.is_empty()).then(|| FollowupQuestion {
                text: text.to_string(),
            })
        })
        .collect()
}

fn rank_incidents(wire: Vec<WireIncident>) -> Result<Vec<SimilarIncident>, ValidationError> {
    let mut incidents = wire
        .into_iter()
        .map(|inc| {
            let incident_id = inc
                .incident_id
                .or(inc.ticket_id)
                .map(WireId::into_string)
                .unwrap_or_default();
            let score = inc.similarity_score.unwrap_or(0.0);
            if !(0.0..=1.0).contains(&score) {
                return Err(ValidationError::ScoreOutOfRange { incident_id, score });
            }
            Ok(SimilarIncident {
                incident_id,
                subject: inc.subject.unwrap_or_default(),
                description: inc.description.unwrap_or_default(),
                similarity_score: score,
                created_at: inc.created_at.as_ref().and_then(parse_timestamp),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // sort_by is stable: equal scores keep arrival order
    incidents.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    Ok(incidents)
}
