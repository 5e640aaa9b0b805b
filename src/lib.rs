//! BIDS Curate - Deterministic routing of MRI acquisitions into BIDS names
//!
//! Curate turns raw scan descriptors exported from a DICOM catalog into a
//! BIDS layout through a fixed pipeline: key registry → ordered rule chain
//! → category buckets, with field map `IntendedFor` references and
//! chronological session relabeling alongside.
//!
//! ## Modules
//!
//! - **Classification**: route descriptors to categories, report the rest
//! - **Sessions**: rank sessions per subject and rewrite their labels
//! - **Tabulation**: flatten a project catalog into per-file rows

pub mod classifier;
pub mod dependencies;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod sessions;
pub mod sink;
pub mod sources;
pub mod tabulate;
pub mod types;

pub use classifier::{BucketMap, Classification, SequenceClassifier};
pub use dependencies::DependencyMap;
pub use error::CurateError;
pub use keys::{CategoryKey, KeyRegistry};
pub use pipeline::{classify_to_report, ClassificationReport, Curator};
pub use sessions::{build_index, lookup, SessionIndex};
pub use sink::{CollectingSink, ReportSink, TracingSink};
pub use tabulate::tabulate;

/// Curate version embedded in all reports
pub const CURATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "bids-curate";
