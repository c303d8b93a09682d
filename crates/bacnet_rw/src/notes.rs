//! Timestamped journal of notable session events

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// One journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Journal shared by every call on a session
#[derive(Debug, Default)]
pub struct Notes {
    entries: Mutex<Vec<Note>>,
}

impl Notes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event
    pub fn note(&self, text: impl Into<String>) {
        let note = Note {
            timestamp: Utc::now(),
            text: text.into(),
        };
        tracing::debug!("Note: {}", note.text);
        self.entries.lock().push(note);
    }

    /// Snapshot of the journal, oldest first
    pub fn entries(&self) -> Vec<Note> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
