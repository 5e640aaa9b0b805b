//! Project catalog export
//!
//! Mirrors the project → subject → session → acquisition → file hierarchy
//! of the imaging data store. File metadata (`info`) is kept as raw JSON
//! since it is whatever the DICOM header extraction produced.

use crate::error::CurateError;
use crate::types::{SessionRecord, Subject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionSource;

/// Root of a catalog export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCatalog {
    pub label: String,
    #[serde(default)]
    pub subjects: Vec<SubjectNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectNode {
    pub label: String,
    #[serde(default)]
    pub sessions: Vec<SessionNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNode {
    pub label: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acquisitions: Vec<AcquisitionNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionNode {
    pub label: String,
    #[serde(default)]
    pub files: Vec<CatalogFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub info: serde_json::Map<String, serde_json::Value>,
}

impl ProjectCatalog {
    /// Parse a catalog export
    pub fn from_json(json: &str) -> Result<Self, CurateError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl SessionSource for ProjectCatalog {
    /// Sessions without a timestamp cannot be ranked and are left out
    fn subjects(&self) -> Result<Vec<Subject>, CurateError> {
        let subjects = self
            .subjects
            .iter()
            .map(|subject| Subject {
                label: subject.label.clone(),
                sessions: subject
                    .sessions
                    .iter()
                    .filter_map(|session| match session.timestamp {
                        Some(timestamp) => Some(SessionRecord {
                            label: session.label.clone(),
                            timestamp,
                        }),
                        None => {
                            tracing::warn!(
                                subject = %subject.label,
                                session = %session.label,
                                "session has no timestamp, not indexed"
                            );
                            None
                        }
                    })
                    .collect(),
            })
            .collect();

        Ok(subjects)
    }
}
