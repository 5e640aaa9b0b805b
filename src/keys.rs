//! Category key registry
//!
//! Declares the fixed set of BIDS output categories. Each key carries a
//! parameterized naming template, the output encodings to produce and an
//! optional annotation tag. The registry is built once at startup and never
//! mutated afterwards.

use crate::error::CurateError;
use crate::types::{Category, OutputFormat};
use serde::Serialize;

/// Output encoding used when a key does not name one
pub const DEFAULT_OUTPUT_FORMAT: OutputFormat = OutputFormat::NiiGz;

/// Placeholders a template may reference
pub const ALLOWED_PLACEHOLDERS: [&str; 5] = ["subject", "session", "item", "seqitem", "subindex"];

/// Placeholders every template must reference
const REQUIRED_PLACEHOLDERS: [&str; 2] = ["subject", "session"];

/// Prefix of the subject directory in every output path
const SUBJECT_DIR_PREFIX: &str = "sub-{subject}/";

/// A validated naming template such as `sub-{subject}/{session}/anat/...`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Template(String);

impl Template {
    /// Parse and validate a template string
    pub fn parse(raw: &str) -> Result<Self, CurateError> {
        if raw.trim().is_empty() {
            return Err(CurateError::InvalidTemplate(
                "template must be a non-empty format string".to_string(),
            ));
        }

        let placeholders = placeholders(raw)?;

        if let Some(unknown) = placeholders
            .iter()
            .find(|p| !ALLOWED_PLACEHOLDERS.contains(&p.as_str()))
        {
            return Err(CurateError::InvalidTemplate(format!(
                "{}: unknown placeholder {{{}}}",
                raw, unknown
            )));
        }

        for required in REQUIRED_PLACEHOLDERS {
            if !placeholders.iter().any(|p| p == required) {
                return Err(CurateError::InvalidTemplate(format!(
                    "{}: missing {{{}}} placeholder",
                    raw, required
                )));
            }
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute subject and session; other placeholders are left in place
    pub fn render(&self, subject: &str, session: &str) -> String {
        self.0
            .replace("{subject}", subject)
            .replace("{session}", session)
    }

    /// Template relative to the subject directory, e.g. `{session}/anat/...`
    pub fn relative_to_subject(&self) -> &str {
        self.0.strip_prefix(SUBJECT_DIR_PREFIX).unwrap_or(&self.0)
    }
}

/// Extract placeholder names, rejecting unbalanced or empty braces
fn placeholders(raw: &str) -> Result<Vec<String>, CurateError> {
    let mut names = Vec::new();
    let mut open: Option<usize> = None;

    for (idx, c) in raw.char_indices() {
        match (c, open) {
            ('{', None) => open = Some(idx + 1),
            ('}', Some(start)) => {
                let name = &raw[start..idx];
                if name.is_empty() {
                    return Err(CurateError::InvalidTemplate(format!(
                        "{}: empty placeholder",
                        raw
                    )));
                }
                names.push(name.to_string());
                open = None;
            }
            ('{', Some(_)) | ('}', None) => {
                return Err(CurateError::InvalidTemplate(format!(
                    "{}: unbalanced braces",
                    raw
                )));
            }
            _ => {}
        }
    }

    if open.is_some() {
        return Err(CurateError::InvalidTemplate(format!(
            "{}: unterminated placeholder",
            raw
        )));
    }

    Ok(names)
}

/// Immutable output category definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryKey {
    pub category: Category,
    pub template: Template,
    pub output_formats: Vec<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation_tag: Option<String>,
}

impl CategoryKey {
    /// Validate a template and build a key from it.
    ///
    /// An empty `output_formats` list falls back to [`DEFAULT_OUTPUT_FORMAT`].
    pub fn register(
        category: Category,
        template: &str,
        output_formats: &[OutputFormat],
        annotation_tag: Option<&str>,
    ) -> Result<Self, CurateError> {
        let template = Template::parse(template)?;
        let output_formats = if output_formats.is_empty() {
            vec![DEFAULT_OUTPUT_FORMAT]
        } else {
            output_formats.to_vec()
        };

        Ok(Self {
            category,
            template,
            output_formats,
            annotation_tag: annotation_tag.map(str::to_string),
        })
    }

    /// Primary output format
    pub fn primary_format(&self) -> OutputFormat {
        self.output_formats
            .first()
            .copied()
            .unwrap_or(DEFAULT_OUTPUT_FORMAT)
    }

    /// Render the output path stem for a subject and session
    pub fn render(&self, subject: &str, session: &str) -> String {
        self.template.render(subject, session)
    }
}

/// The declared set of category keys
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct KeyRegistry {
    keys: Vec<CategoryKey>,
}

impl KeyRegistry {
    /// Build a registry, rejecting duplicate categories
    pub fn new(keys: Vec<CategoryKey>) -> Result<Self, CurateError> {
        for (idx, key) in keys.iter().enumerate() {
            if keys[..idx].iter().any(|k| k.category == key.category) {
                return Err(CurateError::DuplicateCategory(key.category.to_string()));
            }
        }
        Ok(Self { keys })
    }

    /// The standard Evolution study key set
    pub fn standard() -> Result<Self, CurateError> {
        let declared: [(Category, &str); 13] = [
            (
                Category::T1w,
                "sub-{subject}/{session}/anat/sub-{subject}_{session}_T1w",
            ),
            (
                Category::Rest,
                "sub-{subject}/{session}/func/sub-{subject}_{session}_task-rest_dir-AP_bold",
            ),
            (
                Category::Er40,
                "sub-{subject}/{session}/func/sub-{subject}_{session}_task-er40_dir-AP_bold",
            ),
            (
                Category::Socialapproach,
                "sub-{subject}/{session}/func/sub-{subject}_{session}_task-socialapproach_dir-AP_bold",
            ),
            (
                Category::FmapFmriAp,
                "sub-{subject}/{session}/fmap/sub-{subject}_{session}_acq-fmri_dir-AP_epi",
            ),
            (
                Category::FmapFmriPa,
                "sub-{subject}/{session}/fmap/sub-{subject}_{session}_acq-fmri_dir-PA_epi",
            ),
            (
                Category::FmapDwiAp,
                "sub-{subject}/{session}/fmap/sub-{subject}_{session}_acq-dwi_dir-AP_epi",
            ),
            (
                Category::FmapDwiPa,
                "sub-{subject}/{session}/fmap/sub-{subject}_{session}_acq-dwi_dir-PA_epi",
            ),
            (
                Category::Perf,
                "sub-{subject}/{session}/perf/sub-{subject}_{session}_acq-se_asl",
            ),
            (
                Category::Dwi,
                "sub-{subject}/{session}/dwi/sub-{subject}_{session}_dwi",
            ),
            (
                Category::T2starw,
                "sub-{subject}/{session}/anat/sub-{subject}_{session}_T2starw",
            ),
            (
                Category::T2w,
                "sub-{subject}/{session}/anat/sub-{subject}_{session}_T2w",
            ),
            (
                Category::T2wAbcd,
                "sub-{subject}/{session}/anat/sub-{subject}_{session}_acq-ABCD_T2w",
            ),
        ];

        let keys = declared
            .iter()
            .map(|(category, template)| CategoryKey::register(*category, template, &[], None))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(keys)
    }

    pub fn get(&self, category: Category) -> Option<&CategoryKey> {
        self.keys.iter().find(|k| k.category == category)
    }

    /// Look up a key, failing if the category was never registered
    pub fn key(&self, category: Category) -> Result<&CategoryKey, CurateError> {
        self.get(category)
            .ok_or_else(|| CurateError::UnregisteredCategory(category.to_string()))
    }

    pub fn contains(&self, category: Category) -> bool {
        self.get(category).is_some()
    }

    /// Keys in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &CategoryKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
