use time::OffsetDateTime;
use uuid::Uuid;

use super::inference::Classifier;
use super::storage::{validate_segment, ObjectStore, Report, ReportStore};
use super::ServiceError;
use crate::pipeline::FeaturePipeline;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientInfo {
    pub name: String,
    pub age: String,
}

/// Extract, classify, persist. Nothing is stored unless extraction and
/// classification both succeed.
pub struct AnalysisService<C, O, R> {
    pipeline: FeaturePipeline,
    classifier: C,
    objects: O,
    reports: R,
}

impl<C, O, R> AnalysisService<C, O, R>
where
    C: Classifier,
    O: ObjectStore,
    R: ReportStore,
{
    pub fn new(pipeline: FeaturePipeline, classifier: C, objects: O, reports: R) -> Self {
        Self {
            pipeline,
            classifier,
            objects,
            reports,
        }
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn objects(&self) -> &O {
        &self.objects
    }

    pub fn reports(&self) -> &R {
        &self.reports
    }

    /// `extension` names the upload's container (`"wav"` when unknown) and is
    /// used both as a decode hint and for the stored recording's key.
    pub fn analyze(
        &self,
        audio: &[u8],
        extension: Option<&str>,
        patient: &PatientInfo,
    ) -> Result<Report, ServiceError> {
        validate_segment("patient name", &patient.name)?;
        let id = Uuid::new_v4().to_string();
        let ext = extension.unwrap_or("wav").to_ascii_lowercase();

        log::info!("Analysis {}: extracting spectrogram", id);
        let image = self.pipeline.extract_with_hint(audio, Some(&ext))?;
        let png = image.to_png()?;

        let prediction = self.classifier.classify(&image, &png)?;

        log::info!("Analysis {}: uploading artifacts", id);
        let audio_url = self
            .objects
            .put(&format!("recordings/{id}.{ext}"), audio, &audio_content_type(&ext))?;
        let spectrogram_url = self
            .objects
            .put(&format!("spectrograms/{id}.png"), &png, "image/png")?;

        let report = Report {
            id,
            patient_name: patient.name.clone(),
            patient_age: patient.age.clone(),
            diagnosis: prediction.label,
            confidence: round_percent(prediction.confidence),
            audio_url,
            spectrogram_url,
            timestamp: OffsetDateTime::now_utc(),
        };
        self.reports.append(&report)?;
        Ok(report)
    }

    pub fn history(&self, limit: usize) -> Result<Vec<Report>, ServiceError> {
        self.reports.recent(limit)
    }

    pub fn delete(&self, patient: &str, report_id: &str) -> Result<(), ServiceError> {
        self.reports.delete(patient, report_id)
    }
}

fn round_percent(confidence: f32) -> f32 {
    (confidence * 10_000.0).round() / 100.0
}

fn audio_content_type(ext: &str) -> String {
    match ext {
        "wav" => "audio/wav".into(),
        "mp3" => "audio/mpeg".into(),
        "m4a" | "aac" => "audio/aac".into(),
        other => format!("audio/{other}"),
    }
}
