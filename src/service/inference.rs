use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::ServiceError;
use crate::render::SpectrogramImage;

/// Winning label of a classification and its score in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

/// Image classifier trained on rendered spectrograms.
///
/// `png` is the encoding of `image` that gets stored alongside the report,
/// so remote classifiers see exactly the persisted bytes.
pub trait Classifier {
    fn classify(&self, image: &SpectrogramImage, png: &[u8]) -> Result<Prediction, ServiceError>;
}

/// Always answers with the same prediction.
#[derive(Clone, Debug)]
pub struct FixedClassifier {
    prediction: Prediction,
}

impl FixedClassifier {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            prediction: Prediction {
                label: label.into(),
                confidence,
            },
        }
    }
}

impl Classifier for FixedClassifier {
    fn classify(&self, _image: &SpectrogramImage, _png: &[u8]) -> Result<Prediction, ServiceError> {
        Ok(self.prediction.clone())
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
}

#[derive(Debug, Serialize)]
struct PredictInstance {
    content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PredictResponse {
    #[serde(default)]
    predictions: Vec<ScoredLabels>,
}

#[derive(Debug, Deserialize)]
struct ScoredLabels {
    #[serde(rename = "displayNames", alias = "display_names", default)]
    display_names: Vec<String>,
    #[serde(default)]
    confidences: Vec<f32>,
}

/// Remote classifier behind a JSON prediction endpoint.
///
/// Sends `{"instances": [{"content": <base64 PNG>}]}` and expects
/// `{"predictions": [{"displayNames": [...], "confidences": [...]}]}`.
pub struct HttpClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpClassifier {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }
}

impl Classifier for HttpClassifier {
    fn classify(&self, _image: &SpectrogramImage, png: &[u8]) -> Result<Prediction, ServiceError> {
        let body = PredictRequest {
            instances: vec![PredictInstance {
                content: BASE64.encode(png),
            }],
        };

        log::info!("Requesting prediction from {}", self.endpoint);
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?.error_for_status()?;
        let parsed: PredictResponse = response.json()?;
        let prediction = select_prediction(parsed)?;
        log::info!(
            "Prediction: {} ({:.2}%)",
            prediction.label,
            prediction.confidence * 100.0
        );
        Ok(prediction)
    }
}

/// Highest-scoring label of the first prediction.
pub(crate) fn select_prediction(response: PredictResponse) -> Result<Prediction, ServiceError> {
    let scored = response
        .predictions
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::Inference("response contains no predictions".into()))?;

    if scored.confidences.is_empty() {
        return Err(ServiceError::Inference("prediction has no scores".into()));
    }
    if scored.confidences.len() != scored.display_names.len() {
        return Err(ServiceError::Inference(format!(
            "{} labels for {} scores",
            scored.display_names.len(),
            scored.confidences.len()
        )));
    }
    if let Some(bad) = scored
        .confidences
        .iter()
        .find(|c| !(c.is_finite() && (0.0..=1.0).contains(*c)))
    {
        return Err(ServiceError::Inference(format!("score {bad} outside [0, 1]")));
    }

    // First label wins ties.
    let mut best = 0;
    for (i, &c) in scored.confidences.iter().enumerate().skip(1) {
        if c > scored.confidences[best] {
            best = i;
        }
    }

    Ok(Prediction {
        label: scored.display_names[best].clone(),
        confidence: scored.confidences[best],
    })
}
