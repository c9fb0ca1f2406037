use std::collections::HashMap;

use helpdesk_schema::{HistoryEntry, TicketStatus};

/// Ticket summaries, most recently created first.
///
/// Entries are kept oldest-first internally so that prepending a new ticket is
/// a push; iteration reverses. Nothing is ever removed.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
    entries: Vec<HistoryEntry>,
    positions: HashMap<String, usize>,
}

impl HistoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a backend listing, which arrives most-recent-first.
    /// A ticket id listed twice keeps its first (most recent) occurrence.
    pub fn from_listing(listing: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let mut newest_first: Vec<HistoryEntry> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for entry in listing {
            if seen.insert(entry.ticket_id.clone()) {
                newest_first.push(entry);
            } else {
                tracing::warn!(ticket_id = %entry.ticket_id, "duplicate ticket in history listing");
            }
        }

        let mut index = Self::new();
        for entry in newest_first.into_iter().rev() {
            index.push(entry);
        }
        index
    }

    /// Prepend the entry of a freshly created ticket. If the id is already
    /// known the existing entry is updated in place.
    pub fn record_created(&mut self, entry: HistoryEntry) {
        match self.positions.get(&entry.ticket_id) {
            Some(&pos) => self.entries[pos] = entry,
            None => self.push(entry),
        }
    }

    pub fn get(&self, ticket_id: &str) -> Option<&HistoryEntry> {
        self.positions.get(ticket_id).map(|&pos| &self.entries[pos])
    }

    /// Returns false when the ticket is not in the index.
    pub fn set_status(&mut self, ticket_id: &str, status: TicketStatus) -> bool {
        match self.positions.get(ticket_id) {
            Some(&pos) => {
                self.entries[pos].status = status;
                true
            }
            None => false,
        }
    }

    pub fn mark_closed(&mut self, ticket_id: &str) -> bool {
        self.set_status(ticket_id, TicketStatus::Closed)
    }

    /// Most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.positions
            .insert(entry.ticket_id.clone(), self.entries.len());
        self.entries.push(entry);
    }
}
