//! JSON adapter for scan descriptors
//!
//! Accepts either a JSON array of descriptors or NDJSON (one descriptor per
//! line), as exported from a DICOM session scan.

use crate::error::CurateError;
use crate::types::ScanDescriptor;

use super::DescriptorSource;

/// Adapter for parsing descriptor exports
pub struct DescriptorAdapter;

impl DescriptorAdapter {
    /// Parse a JSON string containing an array of descriptors
    pub fn parse_array(json: &str) -> Result<Vec<ScanDescriptor>, CurateError> {
        let descriptors: Vec<ScanDescriptor> = serde_json::from_str(json)?;
        Ok(descriptors)
    }

    /// Parse NDJSON containing one descriptor per line
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<ScanDescriptor>, CurateError> {
        let mut descriptors = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ScanDescriptor>(trimmed) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => {
                    return Err(CurateError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(descriptors)
    }

    /// Report descriptors that would fail classification
    pub fn validate(descriptors: &[ScanDescriptor]) -> Vec<DescriptorIssue> {
        let mut issues = Vec::new();
        for (idx, descriptor) in descriptors.iter().enumerate() {
            if descriptor.series_id.is_empty() {
                issues.push(DescriptorIssue {
                    index: idx,
                    series_id: String::new(),
                    message: "missing series_id".to_string(),
                });
                continue;
            }
            if descriptor.protocol_name.is_none() {
                issues.push(DescriptorIssue {
                    index: idx,
                    series_id: descriptor.series_id.clone(),
                    message: "missing protocol_name".to_string(),
                });
            }
            if descriptors[..idx]
                .iter()
                .any(|d| d.series_id == descriptor.series_id)
            {
                issues.push(DescriptorIssue {
                    index: idx,
                    series_id: descriptor.series_id.clone(),
                    message: "duplicate series_id".to_string(),
                });
            }
        }
        issues
    }
}

/// A problem found while validating a descriptor batch
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DescriptorIssue {
    pub index: usize,
    pub series_id: String,
    pub message: String,
}

impl DescriptorSource for &str {
    /// Array if the input starts with `[`, NDJSON otherwise
    fn descriptors(self) -> Result<Vec<ScanDescriptor>, CurateError> {
        if self.trim_start().starts_with('[') {
            DescriptorAdapter::parse_array(self)
        } else {
            DescriptorAdapter::parse_ndjson(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_array() {
        let json = r#"[
            {"series_id": "1-MPRAGE", "protocol_name": "ABCD_MPRAGE", "series_description": "ABCD_MPRAGE", "dcm_dir_name": "1-MPRAGE", "is_derived": false},
            {"series_id": "7-fmap", "protocol_name": "fmap_acq-dwi_dir-PA", "PhaseEncodingDirection": "j-"}
        ]"#;

        let descriptors = DescriptorAdapter::parse_array(json).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].protocol(), "ABCD_MPRAGE");
        assert_eq!(descriptors[1].phase_encoding_direction.as_deref(), Some("j-"));
        assert!(!descriptors[1].is_derived);
        assert_eq!(descriptors[1].series_description, "");
    }

    #[test]
    fn test_parse_ndjson() {
        let ndjson = r#"{"series_id": "1", "protocol_name": "task-rest"}

{"series_id": "2", "protocol_name": null}"#;

        let descriptors = DescriptorAdapter::parse_ndjson(ndjson).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert!(descriptors[1].protocol_name.is_none());
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let ndjson = "{\"series_id\": \"1\", \"protocol_name\": \"x\"}\nnot json";
        let err = DescriptorAdapter::parse_ndjson(ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_validate() {
        let mut missing = ScanDescriptor::new("2", "x");
        missing.protocol_name = None;
        let descriptors = vec![
            ScanDescriptor::new("1", "MPRAGE"),
            missing,
            ScanDescriptor::new("1", "task-rest"),
        ];

        let issues = DescriptorAdapter::validate(&descriptors);
        let summary: Vec<(usize, &str)> = issues.iter().map(|i| (i.index, i.message.as_str())).collect();
        assert_eq!(
            summary,
            vec![(1, "missing protocol_name"), (2, "duplicate series_id")]
        );
    }

    #[test]
    fn test_validate_missing_series_id() {
        let descriptors =
            DescriptorAdapter::parse_ndjson(r#"{"protocol_name": "MPRAGE"}"#).unwrap();

        let issues = DescriptorAdapter::validate(&descriptors);
        assert_eq!(
            issues,
            vec![DescriptorIssue {
                index: 0,
                series_id: String::new(),
                message: "missing series_id".to_string(),
            }]
        );
    }

    #[test]
    fn test_str_source_detects_format() {
        let array = r#"[{"series_id": "1", "protocol_name": "MPRAGE"}]"#;
        let ndjson = r#"{"series_id": "1", "protocol_name": "MPRAGE"}"#;

        assert_eq!(array.descriptors().unwrap(), ndjson.descriptors().unwrap());
    }
}
