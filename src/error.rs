//! Error types for BIDS curation

use thiserror::Error;

/// Errors that can occur while building the rule set or routing records
#[derive(Debug, Error)]
pub enum CurateError {
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("Unknown session label: {0}")]
    UnknownSession(String),

    #[error("Duplicate category: {0}")]
    DuplicateCategory(String),

    #[error("Category not registered: {0}")]
    UnregisteredCategory(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse input: {0}")]
    ParseError(String),
}
