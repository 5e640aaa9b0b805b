//! Field map dependency resolution
//!
//! Field maps correct distortions in the primary scans acquired alongside
//! them. This module declares which primary categories each field map serves
//! and renders those as BIDS `IntendedFor` references. References are typed
//! by category, so a declaration that names an unregistered key fails when
//! the map is built rather than at export time.

use crate::error::CurateError;
use crate::keys::KeyRegistry;
use crate::types::Category;
use serde::Serialize;

/// Declared field map → primary scan pairs
const FIELD_MAP_DEPENDENCIES: &[(Category, &[Category])] = &[
    (
        Category::FmapFmriAp,
        &[Category::Rest, Category::Er40, Category::Socialapproach],
    ),
    (
        Category::FmapFmriPa,
        &[Category::Rest, Category::Er40, Category::Socialapproach],
    ),
    (Category::FmapDwiPa, &[Category::Dwi]),
];

/// A primary scan a field map applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependent {
    pub category: Category,
    /// Reference relative to the subject directory, with file extension
    pub template: String,
}

/// Static auxiliary → primary mapping
#[derive(Debug, Clone, Serialize)]
pub struct DependencyMap {
    entries: Vec<(Category, Vec<Dependent>)>,
}

impl DependencyMap {
    /// Build the standard field map declarations against a registry
    pub fn standard(registry: &KeyRegistry) -> Result<Self, CurateError> {
        Self::from_declarations(registry, FIELD_MAP_DEPENDENCIES)
    }

    /// Build from explicit declarations, validating every category
    pub fn from_declarations(
        registry: &KeyRegistry,
        declarations: &[(Category, &[Category])],
    ) -> Result<Self, CurateError> {
        let mut entries: Vec<(Category, Vec<Dependent>)> = Vec::with_capacity(declarations.len());

        for (auxiliary, primaries) in declarations {
            registry.key(*auxiliary)?;
            if entries.iter().any(|(c, _)| c == auxiliary) {
                return Err(CurateError::DuplicateCategory(format!(
                    "{} declared twice in dependency map",
                    auxiliary
                )));
            }

            let mut dependents: Vec<Dependent> = Vec::with_capacity(primaries.len());
            for primary in primaries.iter() {
                if dependents.iter().any(|d| d.category == *primary) {
                    continue;
                }
                let key = registry.key(*primary)?;
                dependents.push(Dependent {
                    category: *primary,
                    template: format!(
                        "{}.{}",
                        key.template.relative_to_subject(),
                        key.primary_format().extension()
                    ),
                });
            }

            entries.push((*auxiliary, dependents));
        }

        Ok(Self { entries })
    }

    fn dependents(&self, category: Category) -> &[Dependent] {
        self.entries
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, deps)| deps.as_slice())
            .unwrap_or_default()
    }

    /// Reference templates for the primary scans a category serves
    pub fn dependents_of(&self, category: Category) -> Vec<&str> {
        self.dependents(category)
            .iter()
            .map(|d| d.template.as_str())
            .collect()
    }

    /// Concrete `IntendedFor` paths for one subject and session
    pub fn intended_for(&self, category: Category, subject: &str, session: &str) -> Vec<String> {
        self.dependents(category)
            .iter()
            .map(|d| {
                d.template
                    .replace("{subject}", subject)
                    .replace("{session}", session)
            })
            .collect()
    }

    /// Auxiliary categories with declared dependents
    pub fn auxiliaries(&self) -> impl Iterator<Item = Category> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }
}
