//! Sequence classification
//!
//! Routes scan descriptors to BIDS categories through an ordered list of
//! rules. Each rule pairs a predicate with a route; the first rule whose
//! predicate matches decides the outcome and no later rule is consulted.
//! Descriptors that no rule can place are reported, never dropped.

use crate::error::CurateError;
use crate::keys::KeyRegistry;
use crate::types::{Category, ScanDescriptor, UnrecognizedDescriptor, UnrecognizedReason};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};

/// Calibration scans carry this marker in their series description
const CALIBRATION_MARKER: &str = "navsetter";

/// Outcome of a matching rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Bucket(Category),
    Unrecognized(UnrecognizedReason),
}

/// Lowercased view of a descriptor used by rule predicates
pub(crate) struct Probe<'a> {
    protocol: String,
    description: String,
    descriptor: &'a ScanDescriptor,
}

impl<'a> Probe<'a> {
    fn new(descriptor: &'a ScanDescriptor) -> Self {
        Self {
            protocol: descriptor.protocol().to_lowercase(),
            description: descriptor.series_description.to_lowercase(),
            descriptor,
        }
    }

    fn protocol_has(&self, marker: &str) -> bool {
        self.protocol.contains(marker)
    }

    fn is_calibration(&self) -> bool {
        self.description.contains(CALIBRATION_MARKER)
    }
}

/// One entry of the rule chain
pub struct Rule {
    /// Short rule name used in logs
    pub name: &'static str,
    /// Every category this rule can route to
    pub targets: &'static [Category],
    predicate: fn(&Probe) -> bool,
    route: fn(&Probe) -> Route,
}

impl Rule {
    /// Whether the rule's predicate accepts the descriptor
    pub fn matches(&self, descriptor: &ScanDescriptor) -> bool {
        (self.predicate)(&Probe::new(descriptor))
    }
}

/// The rule chain, in precedence order
pub static RULES: &[Rule] = &[
    Rule {
        name: "t1w",
        targets: &[Category::T1w],
        predicate: |p| p.protocol_has("mprage") && !p.is_calibration(),
        route: |_| Route::Bucket(Category::T1w),
    },
    Rule {
        name: "task-rest",
        targets: &[Category::Rest],
        predicate: |p| p.protocol_has("task-rest"),
        route: |_| Route::Bucket(Category::Rest),
    },
    Rule {
        name: "task-er40",
        targets: &[Category::Er40],
        predicate: |p| p.protocol_has("task-er40"),
        route: |_| Route::Bucket(Category::Er40),
    },
    Rule {
        name: "task-socialapproach",
        targets: &[Category::Socialapproach],
        predicate: |p| p.protocol_has("task-socialapproach"),
        route: |_| Route::Bucket(Category::Socialapproach),
    },
    Rule {
        name: "fmap",
        targets: &[
            Category::FmapFmriAp,
            Category::FmapFmriPa,
            Category::FmapDwiAp,
            Category::FmapDwiPa,
        ],
        predicate: |p| p.protocol_has("fmap"),
        route: route_field_map,
    },
    Rule {
        name: "perf",
        targets: &[Category::Perf],
        predicate: |p| p.protocol_has("pcasl") && !p.descriptor.is_derived,
        route: |_| Route::Bucket(Category::Perf),
    },
    Rule {
        name: "dwi",
        targets: &[Category::Dwi],
        predicate: |p| p.protocol_has("dwi-multishell"),
        route: |_| Route::Bucket(Category::Dwi),
    },
    Rule {
        name: "t2starw",
        targets: &[Category::T2starw],
        predicate: |p| p.protocol_has("t2star"),
        route: |_| Route::Bucket(Category::T2starw),
    },
    Rule {
        name: "t2w",
        targets: &[Category::T2w, Category::T2wAbcd],
        predicate: |p| p.protocol_has("t2w") && !p.is_calibration(),
        route: route_t2w,
    },
];

/// Field maps split by purpose, then by direction
fn route_field_map(p: &Probe) -> Route {
    if p.protocol_has("acq-fmri") {
        if p.protocol_has("dir-ap") {
            Route::Bucket(Category::FmapFmriAp)
        } else if p.protocol_has("dir-pa") {
            Route::Bucket(Category::FmapFmriPa)
        } else {
            Route::Unrecognized(UnrecognizedReason::UnknownFieldMapDirection)
        }
    } else if p.protocol_has("acq-dwi") {
        // j- is PA, j is AP
        match p.descriptor.phase_encoding_direction.as_deref() {
            Some(direction) if direction.contains('-') => Route::Bucket(Category::FmapDwiPa),
            Some(_) => Route::Bucket(Category::FmapDwiAp),
            None => Route::Unrecognized(UnrecognizedReason::IndeterminatePolarity),
        }
    } else {
        Route::Unrecognized(UnrecognizedReason::UnknownFieldMapPurpose)
    }
}

/// Legacy ABCD T2w gets its own key; the SPC variant is not converted
fn route_t2w(p: &Probe) -> Route {
    if p.protocol_has("abcd") {
        Route::Bucket(Category::T2wAbcd)
    } else if p.protocol_has("spc") {
        Route::Unrecognized(UnrecognizedReason::ExcludedVariant)
    } else {
        Route::Bucket(Category::T2w)
    }
}

/// Route a single descriptor, returning the matching rule name if any
pub fn route(descriptor: &ScanDescriptor) -> (Option<&'static str>, Route) {
    let probe = Probe::new(descriptor);
    RULES
        .iter()
        .find(|rule| (rule.predicate)(&probe))
        .map(|rule| (Some(rule.name), (rule.route)(&probe)))
        .unwrap_or((None, Route::Unrecognized(UnrecognizedReason::NoRuleMatched)))
}

/// Category → series ids, in arrival order
///
/// Every registered category is present, even when its bucket is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketMap {
    buckets: BTreeMap<Category, Vec<String>>,
}

impl BucketMap {
    /// Empty buckets for every registered category
    pub fn for_registry(registry: &KeyRegistry) -> Self {
        Self {
            buckets: registry.iter().map(|k| (k.category, Vec::new())).collect(),
        }
    }

    /// Series ids routed to a category
    pub fn get(&self, category: Category) -> &[String] {
        self.buckets
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The category a series id was routed to
    pub fn category_of(&self, series_id: &str) -> Option<Category> {
        self.buckets
            .iter()
            .find(|(_, ids)| ids.iter().any(|id| id == series_id))
            .map(|(category, _)| *category)
    }

    /// Buckets in category order
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[String])> {
        self.buckets.iter().map(|(c, ids)| (*c, ids.as_slice()))
    }

    /// Total number of bucketed series
    pub fn assigned(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    fn push(&mut self, category: Category, series_id: String) {
        self.buckets.entry(category).or_default().push(series_id);
    }
}

impl Serialize for BucketMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.buckets.len()))?;
        for (category, ids) in &self.buckets {
            map.serialize_entry(category.as_str(), ids)?;
        }
        map.end()
    }
}

/// Result of one classification run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub buckets: BucketMap,
    pub unrecognized: Vec<UnrecognizedDescriptor>,
}

/// Classifier bound to a key registry
pub struct SequenceClassifier<'r> {
    registry: &'r KeyRegistry,
}

impl<'r> SequenceClassifier<'r> {
    /// Bind the rule chain to a registry, checking every rule target is registered
    pub fn new(registry: &'r KeyRegistry) -> Result<Self, CurateError> {
        for rule in RULES {
            for target in rule.targets {
                if !registry.contains(*target) {
                    return Err(CurateError::UnregisteredCategory(format!(
                        "{} (target of rule {})",
                        target, rule.name
                    )));
                }
            }
        }
        Ok(Self { registry })
    }

    /// Classify descriptors in input order.
    ///
    /// Fails when a descriptor lacks a series id or protocol name, or when a
    /// series id repeats; in that case no bucket is built for the batch.
    pub fn classify(&self, descriptors: &[ScanDescriptor]) -> Result<Classification, CurateError> {
        check_batch(descriptors)?;

        let mut buckets = BucketMap::for_registry(self.registry);
        let mut unrecognized = Vec::new();

        for descriptor in descriptors {
            match route(descriptor) {
                (rule, Route::Bucket(category)) => {
                    tracing::debug!(
                        series_id = %descriptor.series_id,
                        rule = rule.unwrap_or_default(),
                        category = %category,
                        "routed series"
                    );
                    buckets.push(category, descriptor.series_id.clone());
                }
                (rule, Route::Unrecognized(reason)) => {
                    tracing::debug!(
                        series_id = %descriptor.series_id,
                        rule = rule.unwrap_or("none"),
                        reason = reason.as_str(),
                        "series left unrouted"
                    );
                    unrecognized.push(UnrecognizedDescriptor::from_descriptor(descriptor, reason));
                }
            }
        }

        Ok(Classification {
            buckets,
            unrecognized,
        })
    }
}

fn check_batch(descriptors: &[ScanDescriptor]) -> Result<(), CurateError> {
    let mut seen = HashSet::new();
    for (idx, descriptor) in descriptors.iter().enumerate() {
        if descriptor.series_id.is_empty() {
            return Err(CurateError::MalformedDescriptor(format!(
                "descriptor {} has no series_id",
                idx
            )));
        }
        if descriptor.protocol_name.is_none() {
            return Err(CurateError::MalformedDescriptor(format!(
                "series {} has no protocol_name",
                descriptor.series_id
            )));
        }
        if !seen.insert(descriptor.series_id.as_str()) {
            return Err(CurateError::MalformedDescriptor(format!(
                "duplicate series_id {}",
                descriptor.series_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    /// One input per rule that should be accepted by that rule alone
    fn representatives() -> Vec<(&'static str, ScanDescriptor)> {
        vec![
            ("t1w", ScanDescriptor::new("1", "ABCD_MPRAGE").with_description("standard")),
            ("task-rest", ScanDescriptor::new("2", "func_task-rest_dir-AP")),
            ("task-er40", ScanDescriptor::new("3", "func_task-er40_dir-AP")),
            ("task-socialapproach", ScanDescriptor::new("4", "func_task-socialapproach_dir-AP")),
            (
                "fmap",
                ScanDescriptor::new("5", "fmap_acq-fmri_dir-AP").with_phase_encoding("j"),
            ),
            ("perf", ScanDescriptor::new("6", "pCASL_se_3d")),
            ("dwi", ScanDescriptor::new("7", "dwi-multishell_dir-AP")),
            ("t2starw", ScanDescriptor::new("8", "T2star_gre")),
            ("t2w", ScanDescriptor::new("9", "anat_T2w").with_description("standard")),
        ]
    }

    fn classify(descriptors: &[ScanDescriptor]) -> Classification {
        let registry = KeyRegistry::standard().unwrap();
        let classifier = SequenceClassifier::new(&registry).unwrap();
        classifier.classify(descriptors).unwrap()
    }

    fn routed(descriptor: ScanDescriptor) -> Route {
        route(&descriptor).1
    }

    #[test]
    fn test_every_rule_has_a_representative() {
        let names: Vec<&str> = RULES.iter().map(|r| r.name).collect();
        let covered: Vec<&str> = representatives().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, covered);
    }

    #[test]
    fn test_rules_are_mutually_exclusive_on_representatives() {
        for (expected, descriptor) in representatives() {
            let matching: Vec<&str> = RULES
                .iter()
                .filter(|r| r.matches(&descriptor))
                .map(|r| r.name)
                .collect();
            assert_eq!(matching, vec![expected], "protocol {}", descriptor.protocol());
        }
    }

    #[test]
    fn test_structural_t1w() {
        let descriptor = ScanDescriptor::new("1", "MPRAGE_T1").with_description("standard");
        assert_eq!(routed(descriptor), Route::Bucket(Category::T1w));
    }

    #[test]
    fn test_t1w_calibration_is_not_structural() {
        let descriptor = ScanDescriptor::new("1", "MPRAGE_T1").with_description("ABCD_vNav_setter navsetter");
        assert_eq!(
            routed(descriptor),
            Route::Unrecognized(UnrecognizedReason::NoRuleMatched)
        );
    }

    #[test]
    fn test_task_runs() {
        assert_eq!(
            routed(ScanDescriptor::new("1", "fMRI_TASK-REST_dir-AP")),
            Route::Bucket(Category::Rest)
        );
        assert_eq!(
            routed(ScanDescriptor::new("2", "fMRI_task-er40")),
            Route::Bucket(Category::Er40)
        );
        assert_eq!(
            routed(ScanDescriptor::new("3", "fMRI_task-socialapproach")),
            Route::Bucket(Category::Socialapproach)
        );
    }

    #[test]
    fn test_fmri_field_maps() {
        assert_eq!(
            routed(ScanDescriptor::new("1", "fmap_acq-fmri_dir-AP")),
            Route::Bucket(Category::FmapFmriAp)
        );
        assert_eq!(
            routed(ScanDescriptor::new("2", "fmap_acq-fmri_dir-PA")),
            Route::Bucket(Category::FmapFmriPa)
        );
        assert_eq!(
            routed(ScanDescriptor::new("3", "fmap_acq-fmri")),
            Route::Unrecognized(UnrecognizedReason::UnknownFieldMapDirection)
        );
    }

    #[test]
    fn test_dwi_field_map_polarity() {
        let pa = ScanDescriptor::new("1", "fmap_acq-dwi_dir-PA").with_phase_encoding("j-");
        assert_eq!(routed(pa), Route::Bucket(Category::FmapDwiPa));

        let ap = ScanDescriptor::new("2", "fmap_acq-dwi_dir-AP").with_phase_encoding("j");
        assert_eq!(routed(ap), Route::Bucket(Category::FmapDwiAp));
    }

    #[test]
    fn test_dwi_field_map_without_phase_encoding_is_indeterminate() {
        let descriptor = ScanDescriptor::new("1", "fmap_acq-dwi_dir-PA");
        assert_eq!(
            routed(descriptor),
            Route::Unrecognized(UnrecognizedReason::IndeterminatePolarity)
        );
    }

    #[test]
    fn test_field_map_without_purpose() {
        assert_eq!(
            routed(ScanDescriptor::new("1", "fmap_dir-AP")),
            Route::Unrecognized(UnrecognizedReason::UnknownFieldMapPurpose)
        );
    }

    #[test]
    fn test_derived_perfusion_is_not_bucketed() {
        assert_eq!(
            routed(ScanDescriptor::new("1", "pcasl_se")),
            Route::Bucket(Category::Perf)
        );
        assert_eq!(
            routed(ScanDescriptor::new("2", "pcasl_se").derived()),
            Route::Unrecognized(UnrecognizedReason::NoRuleMatched)
        );
    }

    #[test]
    fn test_t2_variants() {
        assert_eq!(
            routed(ScanDescriptor::new("1", "T2w_ABCD")),
            Route::Bucket(Category::T2wAbcd)
        );
        assert_eq!(
            routed(ScanDescriptor::new("2", "T2w_SPC")),
            Route::Unrecognized(UnrecognizedReason::ExcludedVariant)
        );
        assert_eq!(
            routed(ScanDescriptor::new("3", "anat_T2w")),
            Route::Bucket(Category::T2w)
        );
        assert_eq!(
            routed(ScanDescriptor::new("4", "anat_T2w").with_description("navsetter")),
            Route::Unrecognized(UnrecognizedReason::NoRuleMatched)
        );
        assert_eq!(
            routed(ScanDescriptor::new("5", "T2star_gre")),
            Route::Bucket(Category::T2starw)
        );
    }

    #[test]
    fn test_unknown_sequence_is_reported() {
        let descriptor = ScanDescriptor::new("42", "unknown_sequence_xyz").with_dcm_dir("42-unknown");
        let result = classify(&[descriptor]);

        assert_eq!(result.buckets.assigned(), 0);
        assert_eq!(
            result.unrecognized,
            vec![UnrecognizedDescriptor {
                series_id: "42".to_string(),
                protocol_name: "unknown_sequence_xyz".to_string(),
                dcm_dir_name: "42-unknown".to_string(),
                reason: UnrecognizedReason::NoRuleMatched,
            }]
        );
    }

    #[test]
    fn test_every_category_present_when_empty() {
        let result = classify(&[]);
        let categories: Vec<Category> = result.buckets.iter().map(|(c, _)| c).collect();
        assert_eq!(categories, Category::ALL.to_vec());
        assert!(result.buckets.iter().all(|(_, ids)| ids.is_empty()));
        assert!(result.unrecognized.is_empty());
    }

    #[test]
    fn test_bucket_preserves_arrival_order() {
        let result = classify(&[
            ScanDescriptor::new("9", "task-rest_run2"),
            ScanDescriptor::new("3", "task-rest_run1"),
            ScanDescriptor::new("5", "task-rest_run3"),
        ]);
        assert_eq!(result.buckets.get(Category::Rest), ["9", "3", "5"]);
    }

    #[test]
    fn test_partition_and_order_independence() {
        let mut descriptors: Vec<ScanDescriptor> =
            representatives().into_iter().map(|(_, d)| d).collect();
        descriptors.push(ScanDescriptor::new("10", "localizer"));
        descriptors.push(ScanDescriptor::new("11", "T2w_SPC"));
        descriptors.push(ScanDescriptor::new("12", "fmap_acq-dwi_dir-AP"));

        let forward = classify(&descriptors);
        descriptors.reverse();
        let backward = classify(&descriptors);

        let mut seen = HashSet::new();
        for (_, ids) in forward.buckets.iter() {
            for id in ids {
                assert!(seen.insert(id.clone()), "{} bucketed twice", id);
            }
        }
        for u in &forward.unrecognized {
            assert!(seen.insert(u.series_id.clone()), "{} reported twice", u.series_id);
        }
        assert_eq!(seen.len(), descriptors.len());

        for descriptor in &descriptors {
            assert_eq!(
                forward.buckets.category_of(&descriptor.series_id),
                backward.buckets.category_of(&descriptor.series_id)
            );
        }
    }

    #[test]
    fn test_missing_protocol_fails_batch() {
        let mut malformed = ScanDescriptor::new("2", "ignored");
        malformed.protocol_name = None;

        let registry = KeyRegistry::standard().unwrap();
        let classifier = SequenceClassifier::new(&registry).unwrap();
        let result = classifier.classify(&[ScanDescriptor::new("1", "MPRAGE"), malformed]);

        assert!(matches!(result, Err(CurateError::MalformedDescriptor(_))));
    }

    #[test]
    fn test_duplicate_series_id_fails_batch() {
        let registry = KeyRegistry::standard().unwrap();
        let classifier = SequenceClassifier::new(&registry).unwrap();
        let result = classifier.classify(&[
            ScanDescriptor::new("7", "MPRAGE_T1"),
            ScanDescriptor::new("7", "task-rest"),
        ]);

        match result {
            Err(CurateError::MalformedDescriptor(message)) => {
                assert!(message.contains("duplicate series_id 7"), "{}", message);
            }
            other => panic!("expected MalformedDescriptor, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_series_id_fails_batch() {
        let descriptors: Vec<ScanDescriptor> =
            serde_json::from_str(r#"[{"protocol_name": "MPRAGE"}]"#).unwrap();
        assert_eq!(descriptors[0].series_id, "");

        let registry = KeyRegistry::standard().unwrap();
        let classifier = SequenceClassifier::new(&registry).unwrap();

        assert!(matches!(
            classifier.classify(&descriptors),
            Err(CurateError::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn test_classifier_requires_rule_targets_registered() {
        let key = crate::keys::CategoryKey::register(
            Category::T1w,
            "sub-{subject}/{session}/anat/sub-{subject}_{session}_T1w",
            &[],
            None,
        )
        .unwrap();
        let registry = KeyRegistry::new(vec![key]).unwrap();

        assert!(matches!(
            SequenceClassifier::new(&registry),
            Err(CurateError::UnregisteredCategory(_))
        ));
    }
}
