use thiserror::Error;

/// Failures of the feature extraction engine.
///
/// `stage` names the component that rejected its input so configuration
/// mistakes can be told apart from bad recordings.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Failed to decode audio: {message}")]
    Decode { message: String },
    #[error("Invalid {stage} configuration: {message}")]
    InvalidConfig { stage: &'static str, message: String },
    #[error("Failed to encode spectrogram image: {source}")]
    Encode {
        #[from]
        source: image::ImageError,
    },
}

impl FeatureError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn invalid_config(stage: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            stage,
            message: message.into(),
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

pub type Result<T, E = FeatureError> = std::result::Result<T, E>;
