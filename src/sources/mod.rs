//! Collaborator interfaces
//!
//! The engine never fetches anything itself. Descriptors, session records
//! and the project catalog are produced by collaborators and handed over
//! fully materialized; this module defines those seams and JSON adapters
//! for exported catalog data.

mod catalog;
mod descriptors;

pub use catalog::{AcquisitionNode, CatalogFile, ProjectCatalog, SessionNode, SubjectNode};
pub use descriptors::{DescriptorAdapter, DescriptorIssue};

use crate::error::CurateError;
use crate::types::{ScanDescriptor, Subject};

/// Produces scan descriptors, once
pub trait DescriptorSource {
    fn descriptors(self) -> Result<Vec<ScanDescriptor>, CurateError>;
}

/// Produces subjects with their session records
pub trait SessionSource {
    fn subjects(&self) -> Result<Vec<Subject>, CurateError>;
}

impl DescriptorSource for Vec<ScanDescriptor> {
    fn descriptors(self) -> Result<Vec<ScanDescriptor>, CurateError> {
        Ok(self)
    }
}

impl SessionSource for [Subject] {
    fn subjects(&self) -> Result<Vec<Subject>, CurateError> {
        Ok(self.to_vec())
    }
}
