//! Analysis workflow against in-memory and on-disk collaborators.

use std::f32::consts::PI;
use std::io::Cursor;
use std::sync::Mutex;

use respiro::config::{FeatureConfig, RenderConfig};
use respiro::service::{
    AnalysisService, Classifier, FileReportStore, FixedClassifier, LocalObjectStore,
    MemoryObjectStore, MemoryReportStore, PatientInfo, Prediction, ReportStore, ServiceError,
};
use respiro::{FeatureError, FeaturePipeline, SpectrogramImage};

struct OfflineClassifier;

impl Classifier for OfflineClassifier {
    fn classify(&self, _image: &SpectrogramImage, _png: &[u8]) -> Result<Prediction, ServiceError> {
        Err(ServiceError::Inference("endpoint unreachable".into()))
    }
}

/// Keeps every PNG payload it is asked to classify.
#[derive(Default)]
struct RecordingClassifier {
    seen: Mutex<Vec<Vec<u8>>>,
}

impl Classifier for RecordingClassifier {
    fn classify(&self, image: &SpectrogramImage, png: &[u8]) -> Result<Prediction, ServiceError> {
        assert_eq!(png, image.to_png().unwrap().as_slice());
        self.seen.lock().unwrap().push(png.to_vec());
        Ok(Prediction {
            label: "healthy".into(),
            confidence: 0.5,
        })
    }
}

fn cough_wav() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..8000 {
            let t = i as f32 / 16_000.0;
            let envelope = (-t * 8.0).exp();
            let tone = 0.4 * (2.0 * PI * 300.0 * t).sin() + 0.2 * (2.0 * PI * 1800.0 * t).sin();
            let s = envelope * tone;
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn pipeline() -> FeaturePipeline {
    FeaturePipeline::new(FeatureConfig::default(), RenderConfig::default()).unwrap()
}

fn patient(name: &str) -> PatientInfo {
    PatientInfo {
        name: name.to_string(),
        age: "34".to_string(),
    }
}

#[test]
fn test_analyze_stores_artifacts_and_report() {
    let service = AnalysisService::new(
        pipeline(),
        FixedClassifier::new("healthy", 0.93),
        MemoryObjectStore::new(),
        MemoryReportStore::new(),
    );
    let audio = cough_wav();

    let report = service.analyze(&audio, Some("wav"), &patient("alice")).unwrap();
    assert_eq!(report.diagnosis, "healthy");
    assert_eq!(report.confidence, 93.0);
    assert_eq!(report.patient_name, "alice");
    assert_eq!(report.patient_age, "34");
    assert_eq!(report.audio_url, format!("memory://recordings/{}.wav", report.id));
    assert_eq!(report.spectrogram_url, format!("memory://spectrograms/{}.png", report.id));

    let objects = service.objects();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects.get(&format!("recordings/{}.wav", report.id)).unwrap(), audio);
    let png = objects.get(&format!("spectrograms/{}.png", report.id)).unwrap();
    let expected = service.pipeline().extract(&audio).unwrap().to_png().unwrap();
    assert_eq!(png, expected);

    let history = service.history(20).unwrap();
    assert_eq!(history, vec![report]);
}

#[test]
fn test_classifier_sees_stored_png() {
    let service = AnalysisService::new(
        pipeline(),
        RecordingClassifier::default(),
        MemoryObjectStore::new(),
        MemoryReportStore::new(),
    );
    let report = service.analyze(&cough_wav(), Some("wav"), &patient("frank")).unwrap();

    let stored = service
        .objects()
        .get(&format!("spectrograms/{}.png", report.id))
        .unwrap();
    let seen = service.classifier().seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], stored);
}

#[test]
fn test_ids_are_unique_per_request() {
    let service = AnalysisService::new(
        pipeline(),
        FixedClassifier::new("asthma", 0.5),
        MemoryObjectStore::new(),
        MemoryReportStore::new(),
    );
    let audio = cough_wav();
    let a = service.analyze(&audio, None, &patient("bob")).unwrap();
    let b = service.analyze(&audio, None, &patient("bob")).unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(service.objects().len(), 4);
    assert_eq!(service.history(1).unwrap().len(), 1);
}

#[test]
fn test_inference_failure_stores_nothing() {
    let service = AnalysisService::new(
        pipeline(),
        OfflineClassifier,
        MemoryObjectStore::new(),
        MemoryReportStore::new(),
    );
    let err = service.analyze(&cough_wav(), Some("wav"), &patient("carol")).unwrap_err();
    assert!(matches!(err, ServiceError::Inference(_)));
    assert!(service.objects().is_empty());
    assert!(service.history(20).unwrap().is_empty());
}

#[test]
fn test_undecodable_upload_is_reported() {
    let service = AnalysisService::new(
        pipeline(),
        FixedClassifier::new("healthy", 0.9),
        MemoryObjectStore::new(),
        MemoryReportStore::new(),
    );
    let err = service.analyze(b"not audio at all", Some("wav"), &patient("dave")).unwrap_err();
    assert!(matches!(err, ServiceError::Feature(FeatureError::Decode { .. })));
    assert!(service.objects().is_empty());
}

#[test]
fn test_rejects_path_like_patient_names() {
    let service = AnalysisService::new(
        pipeline(),
        FixedClassifier::new("healthy", 0.9),
        MemoryObjectStore::new(),
        MemoryReportStore::new(),
    );
    let err = service.analyze(&cough_wav(), None, &patient("../etc")).unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput { .. }));
}

#[test]
fn test_on_disk_history_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let service = AnalysisService::new(
        pipeline(),
        FixedClassifier::new("covid", 0.8765),
        LocalObjectStore::new(dir.path().join("objects"), None),
        FileReportStore::new(dir.path()),
    );

    let report = service.analyze(&cough_wav(), Some("wav"), &patient("erin")).unwrap();
    assert_eq!(report.confidence, 87.65);

    let image_path = dir.path().join("objects").join(format!("spectrograms/{}.png", report.id));
    let image = image::open(&image_path).unwrap();
    assert_eq!((image.width(), image.height()), (400, 400));
    assert!(dir
        .path()
        .join("patients/erin/reports")
        .join(format!("{}.json", report.id))
        .is_file());

    let history = service.history(20).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, report.id);

    service.delete("erin", &report.id).unwrap();
    assert!(service.reports().recent(20).unwrap().is_empty());
    assert!(matches!(
        service.delete("erin", &report.id),
        Err(ServiceError::NotFound { .. })
    ));
}
