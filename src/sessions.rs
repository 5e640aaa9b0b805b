//! Session indexing
//!
//! Catalog session labels are arbitrary (scanner dates, accession numbers).
//! The BIDS output uses `<prefix><n>` instead, where `n` is the
//! chronological rank of the session within its subject. The index is built
//! explicitly from already-fetched session records and then used as a pure
//! lookup table.

use crate::error::CurateError;
use crate::types::{SessionRecord, Subject};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Project prefix used for canonical session labels
pub const DEFAULT_SESSION_PREFIX: &str = "EVO";

/// Original session label → canonical label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIndex {
    prefix: String,
    labels: HashMap<String, String>,
}

impl SessionIndex {
    /// Assign chronological ordinals per subject.
    ///
    /// Sessions are stably sorted by timestamp, so sessions sharing a
    /// timestamp keep their catalog order. A label that appears under more
    /// than one subject keeps the assignment from the later subject.
    pub fn build(prefix: &str, subjects: &[Subject]) -> Self {
        let mut labels = HashMap::new();

        for subject in subjects {
            let mut sessions: Vec<&SessionRecord> = subject.sessions.iter().collect();
            sessions.sort_by_key(|s| s.timestamp);

            for (idx, session) in sessions.into_iter().enumerate() {
                let canonical = format!("{}{}", prefix, idx + 1);
                if let Some(previous) = labels.insert(session.label.clone(), canonical) {
                    tracing::warn!(
                        subject = %subject.label,
                        session = %session.label,
                        previous = %previous,
                        "session label indexed more than once"
                    );
                }
            }
        }

        tracing::debug!(sessions = labels.len(), subjects = subjects.len(), "built session index");

        Self {
            prefix: prefix.to_string(),
            labels,
        }
    }

    /// Canonical label for an original session label
    pub fn lookup(&self, original: &str) -> Result<&str, CurateError> {
        self.labels
            .get(original)
            .map(String::as_str)
            .ok_or_else(|| CurateError::UnknownSession(original.to_string()))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Entries sorted by original label
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        entries.sort();
        entries
    }

    /// Load an index from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the index to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Build an index with the given prefix
pub fn build_index(prefix: &str, subjects: &[Subject]) -> SessionIndex {
    SessionIndex::build(prefix, subjects)
}

/// Rewrite an original session label through an index
pub fn lookup<'a>(index: &'a SessionIndex, original: &str) -> Result<&'a str, CurateError> {
    index.lookup(original)
}
