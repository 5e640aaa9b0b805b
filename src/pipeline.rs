//! Pipeline orchestration
//!
//! This module provides the public API for BIDS curation. It wires the key
//! registry, classifier, dependency map and session index together and
//! renders classification results as JSON reports.

use crate::classifier::{Classification, SequenceClassifier};
use crate::dependencies::DependencyMap;
use crate::error::CurateError;
use crate::keys::KeyRegistry;
use crate::sessions::{SessionIndex, DEFAULT_SESSION_PREFIX};
use crate::sink::{ReportSink, TracingSink};
use crate::sources::{DescriptorSource, SessionSource};
use crate::types::{Category, OutputFormat, UnrecognizedDescriptor};
use crate::{CURATE_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification output for one descriptor batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub run_id: Uuid,
    pub producer: String,
    pub version: String,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub buckets: Vec<BucketReport>,
    pub unrecognized: Vec<UnrecognizedDescriptor>,
}

/// One category of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketReport {
    pub category: Category,
    /// Output path stem; rendered when subject and session are known
    pub path: String,
    pub output_formats: Vec<OutputFormat>,
    pub series_ids: Vec<String>,
    /// Primary scans this category's field maps apply to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intended_for: Vec<String>,
}

/// Classify a descriptor export and return a JSON report (stateless, one-shot).
///
/// # Arguments
/// * `descriptors_json` - JSON array or NDJSON of scan descriptors
///
/// # Returns
/// JSON-encoded [`ClassificationReport`] with unrendered templates
///
/// # Example
/// ```ignore
/// let report_json = classify_to_report(seqinfo_json)?;
/// ```
pub fn classify_to_report(descriptors_json: String) -> Result<String, CurateError> {
    let mut curator = Curator::new()?;
    let report = curator.report(descriptors_json.as_str(), None, None)?;
    Ok(serde_json::to_string(&report)?)
}

/// Stateful curator holding the rule set and an optional session index.
///
/// Build once, then classify any number of descriptor batches.
pub struct Curator<S: ReportSink = TracingSink> {
    registry: KeyRegistry,
    dependencies: DependencyMap,
    sink: S,
    session_prefix: String,
    session_index: Option<SessionIndex>,
}

impl Curator<TracingSink> {
    /// Standard keys and dependencies, logging unrecognized scans
    pub fn new() -> Result<Self, CurateError> {
        Self::with_registry(KeyRegistry::standard()?, TracingSink)
    }
}

impl<S: ReportSink> Curator<S> {
    /// Build around a registry, validating the rule chain and dependency map against it
    pub fn with_registry(registry: KeyRegistry, sink: S) -> Result<Self, CurateError> {
        SequenceClassifier::new(&registry)?;
        let dependencies = DependencyMap::standard(&registry)?;

        Ok(Self {
            registry,
            dependencies,
            sink,
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            session_index: None,
        })
    }

    /// Replace the reporting sink
    pub fn with_sink<T: ReportSink>(self, sink: T) -> Curator<T> {
        Curator {
            registry: self.registry,
            dependencies: self.dependencies,
            sink,
            session_prefix: self.session_prefix,
            session_index: self.session_index,
        }
    }

    /// Use a different canonical session prefix
    pub fn with_session_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_prefix = prefix.into();
        self
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn session_index(&self) -> Option<&SessionIndex> {
        self.session_index.as_ref()
    }

    /// Build the session index from a session source, replacing any previous one
    pub fn index_sessions<T: SessionSource + ?Sized>(
        &mut self,
        source: &T,
    ) -> Result<&SessionIndex, CurateError> {
        let subjects = source.subjects()?;
        let index = SessionIndex::build(&self.session_prefix, &subjects);
        Ok(&*self.session_index.insert(index))
    }

    /// Load a previously saved session index
    pub fn load_session_index(&mut self, json: &str) -> Result<(), CurateError> {
        self.session_index = Some(
            SessionIndex::from_json(json).map_err(|e| CurateError::ParseError(e.to_string()))?,
        );
        Ok(())
    }

    /// Save the session index to JSON
    pub fn save_session_index(&self) -> Result<Option<String>, CurateError> {
        self.session_index
            .as_ref()
            .map(|index| index.to_json().map_err(CurateError::from))
            .transpose()
    }

    /// Canonical label for an original session label.
    ///
    /// Fails with `UnknownSession` when no index has been built or the label
    /// was not part of it.
    pub fn relabel_session(&self, original: &str) -> Result<&str, CurateError> {
        match &self.session_index {
            Some(index) => index.lookup(original),
            None => Err(CurateError::UnknownSession(format!(
                "{} (no session index built)",
                original
            ))),
        }
    }

    /// Classify a descriptor batch, forwarding unrecognized scans to the sink
    pub fn classify<D: DescriptorSource>(&mut self, source: D) -> Result<Classification, CurateError> {
        let descriptors = source.descriptors()?;
        let classification = SequenceClassifier::new(&self.registry)?.classify(&descriptors)?;

        for event in &classification.unrecognized {
            self.sink.report(event);
        }

        tracing::info!(
            descriptors = descriptors.len(),
            assigned = classification.buckets.assigned(),
            unrecognized = classification.unrecognized.len(),
            "classified series"
        );

        Ok(classification)
    }

    /// Classify a batch and build a report.
    ///
    /// With both `subject` and `session`, paths and `IntendedFor` entries are
    /// rendered; the session label is rewritten through the session index
    /// when one has been built.
    pub fn report<D: DescriptorSource>(
        &mut self,
        source: D,
        subject: Option<&str>,
        session: Option<&str>,
    ) -> Result<ClassificationReport, CurateError> {
        let session = match (session, &self.session_index) {
            (Some(label), Some(index)) => Some(index.lookup(label)?.to_string()),
            (Some(label), None) => Some(label.to_string()),
            (None, _) => None,
        };

        let classification = self.classify(source)?;

        let buckets = self
            .registry
            .iter()
            .map(|key| {
                let (path, intended_for) = match (subject, session.as_deref()) {
                    (Some(sub), Some(ses)) => (
                        key.render(sub, ses),
                        self.dependencies.intended_for(key.category, sub, ses),
                    ),
                    _ => (
                        key.template.as_str().to_string(),
                        self.dependencies
                            .dependents_of(key.category)
                            .into_iter()
                            .map(str::to_string)
                            .collect(),
                    ),
                };

                BucketReport {
                    category: key.category,
                    path,
                    output_formats: key.output_formats.clone(),
                    series_ids: classification.buckets.get(key.category).to_vec(),
                    intended_for,
                }
            })
            .collect();

        Ok(ClassificationReport {
            run_id: Uuid::new_v4(),
            producer: PRODUCER_NAME.to_string(),
            version: CURATE_VERSION.to_string(),
            generated_at: Utc::now(),
            subject: subject.map(str::to_string),
            session,
            buckets,
            unrecognized: classification.unrecognized,
        })
    }
}
