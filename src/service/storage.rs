use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::ServiceError;

/// Durable blob storage returning a retrievable URL per object.
pub trait ObjectStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, ServiceError>;
}

/// One completed analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub patient_name: String,
    pub patient_age: String,
    pub diagnosis: String,
    /// Percent, rounded to two decimals.
    pub confidence: f32,
    pub audio_url: String,
    pub spectrogram_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Report records keyed by patient and report id.
pub trait ReportStore {
    fn append(&self, report: &Report) -> Result<(), ServiceError>;
    /// Newest first, across all patients.
    fn recent(&self, limit: usize) -> Result<Vec<Report>, ServiceError>;
    fn delete(&self, patient: &str, report_id: &str) -> Result<(), ServiceError>;
}

/// Reject anything that would not stay a single path component.
pub(crate) fn validate_segment(field: &'static str, value: &str) -> Result<(), ServiceError> {
    let invalid = |message: &str| ServiceError::InvalidInput {
        field,
        message: format!("{message}: {value:?}"),
    };
    if value.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value == "." || value == ".." {
        return Err(invalid("reserved name"));
    }
    if value.contains(['/', '\\', '\0']) {
        return Err(invalid("must not contain path separators"));
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<(), ServiceError> {
    key.split('/').try_for_each(|segment| validate_segment("object key", segment))
}

fn sort_newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
}

/// Objects written under a local directory.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url,
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, ServiceError> {
        validate_key(key)?;
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ServiceError::io(parent, e))?;
        }
        write_file(&path, bytes)?;
        log::debug!("Stored {} ({} bytes, {})", path.display(), bytes.len(), content_type);

        Ok(match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("file://{}", path.display()),
        })
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ServiceError> {
    let mut file = File::create(path).map_err(|e| ServiceError::io(path, e))?;
    file.write_all(bytes).map_err(|e| ServiceError::io(path, e))?;
    file.sync_all().map_err(|e| ServiceError::io(path, e))
}

/// In-process object store.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|(_, bytes)| bytes.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|(content_type, _)| content_type.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, ServiceError> {
        validate_key(key)?;
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (content_type.to_string(), bytes.to_vec()));
        Ok(format!("memory://{key}"))
    }
}

/// One JSON file per report at `root/patients/<patient>/reports/<id>.json`.
pub struct FileReportStore {
    root: PathBuf,
}

impl FileReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn patients_dir(&self) -> PathBuf {
        self.root.join("patients")
    }

    fn report_path(&self, patient: &str, report_id: &str) -> PathBuf {
        self.patients_dir()
            .join(patient)
            .join("reports")
            .join(format!("{report_id}.json"))
    }

    fn read_report(path: &Path) -> Result<Report, ServiceError> {
        let content = std::fs::read_to_string(path).map_err(|e| ServiceError::io(path, e))?;
        serde_json::from_str(&content).map_err(|source| ServiceError::Record {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ReportStore for FileReportStore {
    fn append(&self, report: &Report) -> Result<(), ServiceError> {
        validate_segment("patient name", &report.patient_name)?;
        validate_segment("report id", &report.id)?;

        let path = self.report_path(&report.patient_name, &report.id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ServiceError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(report).map_err(|source| ServiceError::Record {
            path: path.clone(),
            source,
        })?;
        write_file(&path, &json)?;
        log::info!("Saved report {} for {}", report.id, report.patient_name);
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<Report>, ServiceError> {
        let patients_dir = self.patients_dir();
        if !patients_dir.exists() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        let patients =
            std::fs::read_dir(&patients_dir).map_err(|e| ServiceError::io(&patients_dir, e))?;
        for patient in patients {
            let patient = patient.map_err(|e| ServiceError::io(&patients_dir, e))?;
            let reports_dir = patient.path().join("reports");
            if !reports_dir.is_dir() {
                continue;
            }
            let entries =
                std::fs::read_dir(&reports_dir).map_err(|e| ServiceError::io(&reports_dir, e))?;
            for entry in entries {
                let path = entry.map_err(|e| ServiceError::io(&reports_dir, e))?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                reports.push(Self::read_report(&path)?);
            }
        }

        sort_newest_first(&mut reports);
        reports.truncate(limit);
        Ok(reports)
    }

    fn delete(&self, patient: &str, report_id: &str) -> Result<(), ServiceError> {
        validate_segment("patient name", patient)?;
        validate_segment("report id", report_id)?;

        let path = self.report_path(patient, report_id);
        if !path.is_file() {
            return Err(ServiceError::NotFound {
                patient: patient.to_string(),
                report_id: report_id.to_string(),
            });
        }
        std::fs::remove_file(&path).map_err(|e| ServiceError::io(&path, e))?;
        log::info!("Deleted report {} for {}", report_id, patient);
        Ok(())
    }
}

/// In-process report store.
#[derive(Default)]
pub struct MemoryReportStore {
    reports: RwLock<Vec<Report>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for MemoryReportStore {
    fn append(&self, report: &Report) -> Result<(), ServiceError> {
        self.reports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<Report>, ServiceError> {
        let mut reports = self.reports.read().unwrap_or_else(PoisonError::into_inner).clone();
        sort_newest_first(&mut reports);
        reports.truncate(limit);
        Ok(reports)
    }

    fn delete(&self, patient: &str, report_id: &str) -> Result<(), ServiceError> {
        let mut reports = self.reports.write().unwrap_or_else(PoisonError::into_inner);
        let before = reports.len();
        reports.retain(|r| !(r.patient_name == patient && r.id == report_id));
        if reports.len() == before {
            return Err(ServiceError::NotFound {
                patient: patient.to_string(),
                report_id: report_id.to_string(),
            });
        }
        Ok(())
    }
}
