use std::fmt::Write;

use chrono::{DateTime, Utc};
use helpdesk_schema::{HistoryEntry, Role, TicketThread};

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn render_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return "No tickets.\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{:<14} {:<6} {:<6} {:<16} {}",
            entry.ticket_id,
            entry.status.as_str(),
            entry.severity.as_str(),
            format_time(entry.created_at),
            entry.subject
        );
    }
    out
}

pub fn render_thread(thread: &TicketThread) -> String {
    let ticket = &thread.ticket;
    let mut out = String::new();
    let _ = writeln!(out, "[{}] {}", ticket.ticket_id, ticket.subject);
    let _ = writeln!(
        out,
        "severity: {}  status: {}  submitter: {}  created: {}",
        ticket.severity,
        ticket.status,
        ticket.submitter.as_deref().unwrap_or("-"),
        format_time(ticket.created_at)
    );
    if !ticket.description.is_empty() {
        let _ = writeln!(out, "\n{}", ticket.description);
    }
    if !thread.answer.is_empty() {
        let _ = writeln!(out, "\nAnswer: {}", thread.answer);
    }

    if !thread.messages.is_empty() {
        let _ = writeln!(out, "\nConversation:");
        for message in &thread.messages {
            let who = match message.role {
                Role::User => "you",
                Role::Agent => "agent",
            };
            let _ = writeln!(
                out,
                "  {} {:>5}: {}",
                format_time(message.created_at),
                who,
                message.content
            );
        }
    }

    if !thread.suggested_actions.is_empty() {
        let _ = writeln!(out, "\nSuggested actions:");
        for (i, action) in thread.suggested_actions.iter().enumerate() {
            match &action.title {
                Some(title) => {
                    let _ = writeln!(out, "  {}. {}", i + 1, title);
                    for step in &action.steps {
                        let _ = writeln!(out, "     - {step}");
                    }
                }
                None => {
                    let _ = writeln!(out, "  {}. {}", i + 1, action.steps.join("; "));
                }
            }
        }
    }

    if !thread.followup_questions.is_empty() {
        let _ = writeln!(out, "\nFollow-up questions:");
        for question in &thread.followup_questions {
            let _ = writeln!(out, "  ? {}", question.text);
        }
    }

    if !thread.similar_incidents.is_empty() {
        let _ = writeln!(out, "\nSimilar incidents:");
        for incident in &thread.similar_incidents {
            let _ = writeln!(
                out,
                "  {:>3.0}%  {}  {}",
                incident.similarity_score * 100.0,
                incident.incident_id,
                incident.subject
            );
        }
    }
    out
}
