//! Core types for BIDS curation
//!
//! This module defines the data structures that flow through the engine:
//! scan descriptors coming in, canonical categories and unrecognized reports
//! going out, plus the session and file records used for relabeling and
//! tabulation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical output category identity
///
/// Variant order is the order buckets appear in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    T1w,
    Rest,
    Er40,
    Socialapproach,
    FmapFmriAp,
    FmapFmriPa,
    FmapDwiAp,
    FmapDwiPa,
    Perf,
    Dwi,
    T2starw,
    T2w,
    T2wAbcd,
}

impl Category {
    /// Every category, in report order
    pub const ALL: [Category; 13] = [
        Category::T1w,
        Category::Rest,
        Category::Er40,
        Category::Socialapproach,
        Category::FmapFmriAp,
        Category::FmapFmriPa,
        Category::FmapDwiAp,
        Category::FmapDwiPa,
        Category::Perf,
        Category::Dwi,
        Category::T2starw,
        Category::T2w,
        Category::T2wAbcd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::T1w => "t1w",
            Category::Rest => "rest",
            Category::Er40 => "er40",
            Category::Socialapproach => "socialapproach",
            Category::FmapFmriAp => "fmap_fmri_ap",
            Category::FmapFmriPa => "fmap_fmri_pa",
            Category::FmapDwiAp => "fmap_dwi_ap",
            Category::FmapDwiPa => "fmap_dwi_pa",
            Category::Perf => "perf",
            Category::Dwi => "dwi",
            Category::T2starw => "t2starw",
            Category::T2w => "t2w",
            Category::T2wAbcd => "t2w_abcd",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output encoding produced for a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Compressed NIfTI image
    #[serde(rename = "nii.gz")]
    NiiGz,
    /// Uncompressed NIfTI image
    #[serde(rename = "nii")]
    Nii,
    /// Original DICOM series
    #[serde(rename = "dicom")]
    Dicom,
}

impl OutputFormat {
    /// File extension without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::NiiGz => "nii.gz",
            OutputFormat::Nii => "nii",
            OutputFormat::Dicom => "dcm",
        }
    }
}

/// One raw acquisition record as produced by the DICOM scan of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDescriptor {
    /// Unique series identifier within the session; empty when absent
    #[serde(default)]
    pub series_id: String,
    /// Scanner protocol name; required, absence marks the record malformed
    #[serde(default)]
    pub protocol_name: Option<String>,
    /// Free-text series description
    #[serde(default)]
    pub series_description: String,
    /// Directory the DICOM files were read from
    #[serde(default)]
    pub dcm_dir_name: String,
    /// Phase-encoding direction (e.g. "j" or "j-")
    #[serde(
        default,
        alias = "PhaseEncodingDirection",
        skip_serializing_if = "Option::is_none"
    )]
    pub phase_encoding_direction: Option<String>,
    /// True for derived/secondary reconstructions
    #[serde(default)]
    pub is_derived: bool,
}

impl ScanDescriptor {
    /// Create a descriptor with the given id and protocol name
    pub fn new(series_id: impl Into<String>, protocol_name: impl Into<String>) -> Self {
        Self {
            series_id: series_id.into(),
            protocol_name: Some(protocol_name.into()),
            series_description: String::new(),
            dcm_dir_name: String::new(),
            phase_encoding_direction: None,
            is_derived: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.series_description = description.into();
        self
    }

    pub fn with_dcm_dir(mut self, dcm_dir_name: impl Into<String>) -> Self {
        self.dcm_dir_name = dcm_dir_name.into();
        self
    }

    pub fn with_phase_encoding(mut self, direction: impl Into<String>) -> Self {
        self.phase_encoding_direction = Some(direction.into());
        self
    }

    pub fn derived(mut self) -> Self {
        self.is_derived = true;
        self
    }

    /// Protocol name, or empty string when absent
    pub fn protocol(&self) -> &str {
        self.protocol_name.as_deref().unwrap_or_default()
    }
}

/// Why a descriptor was left out of every bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnrecognizedReason {
    /// No rule predicate matched
    NoRuleMatched,
    /// Diffusion field map without a phase-encoding direction
    IndeterminatePolarity,
    /// Functional field map without an AP/PA marker
    UnknownFieldMapDirection,
    /// Field map that is neither functional nor diffusion
    UnknownFieldMapPurpose,
    /// Deprecated acquisition variant that is deliberately not converted
    ExcludedVariant,
}

impl UnrecognizedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnrecognizedReason::NoRuleMatched => "no_rule_matched",
            UnrecognizedReason::IndeterminatePolarity => "indeterminate_polarity",
            UnrecognizedReason::UnknownFieldMapDirection => "unknown_field_map_direction",
            UnrecognizedReason::UnknownFieldMapPurpose => "unknown_field_map_purpose",
            UnrecognizedReason::ExcludedVariant => "excluded_variant",
        }
    }
}

/// A descriptor that needs manual triage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnrecognizedDescriptor {
    pub series_id: String,
    pub protocol_name: String,
    pub dcm_dir_name: String,
    pub reason: UnrecognizedReason,
}

impl UnrecognizedDescriptor {
    pub(crate) fn from_descriptor(descriptor: &ScanDescriptor, reason: UnrecognizedReason) -> Self {
        Self {
            series_id: descriptor.series_id.clone(),
            protocol_name: descriptor.protocol().to_string(),
            dcm_dir_name: descriptor.dcm_dir_name.clone(),
            reason,
        }
    }
}

/// One imaging session of a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session label as stored in the data catalog
    pub label: String,
    /// Session acquisition time
    pub timestamp: DateTime<Utc>,
}

/// A subject with its sessions, in catalog order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub label: String,
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
}

/// One row of the flat scan table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRow {
    pub file_id: String,
    pub subject: String,
    pub session: String,
    pub acquisition: String,
    pub filename: String,
    pub series_number: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}
