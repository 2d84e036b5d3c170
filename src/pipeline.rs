//! Raw audio bytes to spectrogram raster.

use crate::audio::db::to_db;
use crate::audio::decode::{decode_bytes, SampleBuffer};
use crate::audio::features::Matrix;
use crate::audio::frame::frame;
use crate::audio::mel::MelFilterbank;
use crate::audio::spectrum::SpectralEstimator;
use crate::config::{FeatureConfig, RenderConfig};
use crate::error::Result;
use crate::render::{render, RenderOptions, SpectrogramImage};

/// Decibel-scaled mel spectrogram of one recording.
#[derive(Clone, Debug)]
pub struct MelSpectrogram {
    pub sample_rate: u32,
    /// Filterbank upper edge actually used, after clamping to Nyquist.
    pub f_max: f32,
    pub floor_db: f32,
    /// `[n_mels][num_frames]`, every cell in `[floor_db, 0]`.
    pub db: Matrix,
}

impl MelSpectrogram {
    pub fn n_mels(&self) -> usize {
        self.db.rows()
    }

    pub fn num_frames(&self) -> usize {
        self.db.cols()
    }
}

/// Validated extraction parameters.
///
/// Holds no per-request state, so one pipeline can serve any number of
/// concurrent callers; only the filterbank cache is shared between them.
#[derive(Clone, Debug)]
pub struct FeaturePipeline {
    features: FeatureConfig,
    render: RenderOptions,
}

impl FeaturePipeline {
    pub fn new(features: FeatureConfig, render: RenderConfig) -> Result<Self> {
        features.validate()?;
        render.validate()?;
        Ok(Self {
            render: render.options(),
            features,
        })
    }

    pub fn extract(&self, bytes: &[u8]) -> Result<SpectrogramImage> {
        self.extract_with_hint(bytes, None)
    }

    /// Like [`extract`](Self::extract) with a container hint such as `"wav"`.
    pub fn extract_with_hint(
        &self,
        bytes: &[u8],
        extension: Option<&str>,
    ) -> Result<SpectrogramImage> {
        let buffer = decode_bytes(bytes, extension)?;
        let mel = self.mel_spectrogram(&buffer)?;
        self.render(&mel)
    }

    pub fn mel_spectrogram(&self, buffer: &SampleBuffer) -> Result<MelSpectrogram> {
        let cfg = &self.features;
        let sample_rate = buffer.sample_rate();

        let frames = frame(buffer.samples(), cfg.frame_length, cfg.hop_length)?;

        let mut estimator = SpectralEstimator::new(cfg.frame_length)?;
        let power = estimator.power_spectrogram(&frames)?;

        let filterbank = MelFilterbank::cached(
            sample_rate,
            cfg.frame_length,
            cfg.n_mels,
            cfg.f_max_for(sample_rate),
        )?;
        let energy = filterbank.project(&power)?;

        let db = to_db(&energy, cfg.floor_db);

        log::info!(
            "Mel spectrogram: {:.2}s @ {}Hz -> {} bands x {} frames (f_max={}Hz)",
            buffer.duration_secs(),
            sample_rate,
            db.rows(),
            db.cols(),
            filterbank.f_max()
        );

        Ok(MelSpectrogram {
            sample_rate,
            f_max: filterbank.f_max(),
            floor_db: cfg.floor_db,
            db,
        })
    }

    pub fn render(&self, mel: &MelSpectrogram) -> Result<SpectrogramImage> {
        render(&mel.db, mel.floor_db, &self.render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn pipeline(features: FeatureConfig) -> FeaturePipeline {
        FeaturePipeline::new(features, RenderConfig::default()).unwrap()
    }

    fn sine(freq: f32, sample_rate: u32, secs: f32) -> SampleBuffer {
        let n = (sample_rate as f32 * secs) as usize;
        let samples = (0..n)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        SampleBuffer::new(samples, sample_rate).unwrap()
    }

    #[test]
    fn test_new_fails_fast_on_bad_config() {
        let err = FeaturePipeline::new(
            FeatureConfig { n_mels: 0, ..Default::default() },
            RenderConfig::default(),
        )
        .unwrap_err();
        assert!(err.is_invalid_config());
    }

    #[test]
    fn test_silence_is_entirely_floor() {
        let buffer = SampleBuffer::new(vec![0.0; 4000], 16_000).unwrap();
        let mel = pipeline(FeatureConfig::default()).mel_spectrogram(&buffer).unwrap();
        assert_eq!(mel.n_mels(), 128);
        assert!(mel.db.iter().all(|&v| v == -80.0));
    }

    #[test]
    fn test_short_clip_produces_one_frame() {
        let buffer = SampleBuffer::new(vec![0.1; 100], 16_000).unwrap();
        let mel = pipeline(FeatureConfig::default()).mel_spectrogram(&buffer).unwrap();
        assert_eq!(mel.num_frames(), 1);
        assert!(mel.db.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_f_max_above_nyquist_is_clamped() {
        let features = FeatureConfig { f_max: Some(16_000.0), ..Default::default() };
        let mel = pipeline(features).mel_spectrogram(&sine(1000.0, 16_000, 0.5)).unwrap();
        assert_eq!(mel.f_max, 8000.0);
    }

    #[test]
    fn test_output_shape() {
        let features = FeatureConfig { n_mels: 40, ..Default::default() };
        let mel = pipeline(features).mel_spectrogram(&sine(300.0, 16_000, 1.0)).unwrap();
        assert_eq!(mel.n_mels(), 40);
        assert_eq!(mel.num_frames(), 28);
        assert_eq!(mel.db.max(), Some(0.0));
    }
}
