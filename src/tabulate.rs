//! Scan tabulation
//!
//! Flattens a project catalog into one row per NIfTI file with the
//! metadata needed to audit a conversion: subject, session, acquisition,
//! series number and acquisition time.

use crate::sources::{CatalogFile, ProjectCatalog};
use crate::types::ScanRow;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// File type tabulated from the catalog
const NIFTI_FILE_TYPE: &str = "nifti";

/// One row per NIfTI file, in catalog order
pub fn tabulate(catalog: &ProjectCatalog) -> Vec<ScanRow> {
    let mut rows = Vec::new();

    for subject in &catalog.subjects {
        for session in &subject.sessions {
            for acquisition in &session.acquisitions {
                for file in &acquisition.files {
                    if file.file_type.as_deref() != Some(NIFTI_FILE_TYPE) {
                        continue;
                    }

                    rows.push(ScanRow {
                        file_id: file.id.clone(),
                        subject: subject.label.clone(),
                        session: session.label.clone(),
                        acquisition: acquisition.label.clone(),
                        filename: file.name.clone(),
                        series_number: series_number(file),
                        timestamp: acquisition_time(file),
                    });
                }
            }
        }
    }

    tracing::debug!(project = %catalog.label, rows = rows.len(), "tabulated scans");
    rows
}

fn series_number(file: &CatalogFile) -> Option<i64> {
    file.info.get("SeriesNumber").and_then(|v| v.as_i64())
}

/// `AcquisitionDateTime`, falling back to `AcquisitionDate` at midnight
fn acquisition_time(file: &CatalogFile) -> Option<DateTime<Utc>> {
    if let Some(raw) = file.info.get("AcquisitionDateTime").and_then(|v| v.as_str()) {
        if let Some(ts) = parse_datetime(raw) {
            return Some(ts);
        }
        tracing::warn!(file_id = %file.id, value = raw, "unparseable AcquisitionDateTime");
    }

    let raw = file.info.get("AcquisitionDate").and_then(|v| v.as_str())?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        Err(_) => {
            tracing::warn!(file_id = %file.id, value = raw, "unparseable AcquisitionDate");
            None
        }
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC
fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn catalog() -> ProjectCatalog {
        ProjectCatalog::from_json(
            r#"{
                "label": "Evolution_833922",
                "subjects": [
                    {"label": "1001", "sessions": [{
                        "label": "20210301",
                        "timestamp": "2021-03-01T09:00:00Z",
                        "acquisitions": [
                            {"label": "ABCD_MPRAGE", "files": [
                                {"id": "f1", "name": "mprage.nii.gz", "type": "nifti",
                                 "info": {"AcquisitionDateTime": "2021-03-01T09:12:30.500000", "SeriesNumber": 3}},
                                {"id": "f2", "name": "mprage.dicom.zip", "type": "dicom"}
                            ]},
                            {"label": "task-rest", "files": [
                                {"id": "f3", "name": "rest.nii.gz", "type": "nifti",
                                 "info": {"AcquisitionDate": "2021-03-01"}}
                            ]}
                        ]
                    }]},
                    {"label": "1002", "sessions": [{
                        "label": "20210402",
                        "acquisitions": [{"label": "t2w", "files": [
                            {"id": "f4", "name": "t2.nii.gz", "type": "nifti",
                             "info": {"AcquisitionDateTime": "2021-04-02T11:00:00+02:00"}},
                            {"id": "f5", "name": "notes.txt"}
                        ]}]
                    }]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_only_nifti_files_are_tabulated() {
        let rows = tabulate(&catalog());
        let ids: Vec<&str> = rows.iter().map(|r| r.file_id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f3", "f4"]);
    }

    #[test]
    fn test_row_metadata() {
        let rows = tabulate(&catalog());

        assert_eq!(
            rows[0],
            ScanRow {
                file_id: "f1".to_string(),
                subject: "1001".to_string(),
                session: "20210301".to_string(),
                acquisition: "ABCD_MPRAGE".to_string(),
                filename: "mprage.nii.gz".to_string(),
                series_number: Some(3),
                timestamp: Some(
                    Utc.with_ymd_and_hms(2021, 3, 1, 9, 12, 30).unwrap()
                        + chrono::Duration::milliseconds(500)
                ),
            }
        );
    }

    #[test]
    fn test_timestamp_fallbacks() {
        let rows = tabulate(&catalog());

        assert_eq!(
            rows[1].timestamp,
            Some(Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(rows[1].series_number, None);
        assert_eq!(
            rows[2].timestamp,
            Some(Utc.with_ymd_and_hms(2021, 4, 2, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_missing_dates() {
        let file = CatalogFile {
            id: "x".to_string(),
            name: "x.nii.gz".to_string(),
            file_type: Some("nifti".to_string()),
            info: serde_json::Map::new(),
        };
        assert_eq!(acquisition_time(&file), None);
    }
}
