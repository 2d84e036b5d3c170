//! Collaborators around the engine: inference, blob storage, report records.

pub mod analysis;
pub mod inference;
pub mod storage;

use std::path::PathBuf;
use thiserror::Error;

use crate::error::FeatureError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Inference request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed report record {path}: {source}")]
    Record {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Report {report_id} for patient {patient} not found")]
    NotFound { patient: String, report_id: String },
    #[error("Invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub use analysis::{AnalysisService, PatientInfo};
pub use inference::{Classifier, FixedClassifier, HttpClassifier, Prediction};
pub use storage::{
    FileReportStore, LocalObjectStore, MemoryObjectStore, MemoryReportStore, ObjectStore, Report,
    ReportStore,
};
