use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use super::features::Matrix;
use super::frame::FrameSet;
use crate::error::{FeatureError, Result};

/// Real-input power spectrum estimator for a fixed frame length.
///
/// Holds its FFT plan and scratch buffers, so one estimator serves every
/// frame of an invocation without reallocating.
pub struct SpectralEstimator {
    frame_length: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralEstimator {
    pub fn new(frame_length: usize) -> Result<Self> {
        if frame_length == 0 {
            return Err(FeatureError::invalid_config(
                "spectrum",
                "frame_length must be > 0",
            ));
        }
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(frame_length);
        Ok(Self {
            frame_length,
            input: plan.make_input_vec(),
            output: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            plan,
        })
    }

    /// `frame_length / 2 + 1`
    pub fn num_bins(&self) -> usize {
        self.frame_length / 2 + 1
    }

    /// `|X[k]|²` for the non-negative frequency bins of one windowed frame.
    pub fn power_spectrum(&mut self, frame: &[f32]) -> Result<Vec<f32>> {
        let mut power = vec![0.0f32; self.num_bins()];
        self.power_spectrum_into(frame, &mut power)?;
        Ok(power)
    }

    fn power_spectrum_into(&mut self, frame: &[f32], power: &mut [f32]) -> Result<()> {
        if frame.len() != self.frame_length {
            return Err(FeatureError::invalid_config(
                "spectrum",
                format!(
                    "frame has {} samples, estimator expects {}",
                    frame.len(),
                    self.frame_length
                ),
            ));
        }

        // The transform uses its input as workspace.
        self.input.copy_from_slice(frame);
        self.plan
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
            .map_err(|e| FeatureError::invalid_config("spectrum", format!("FFT failed: {e}")))?;

        for (p, c) in power.iter_mut().zip(&self.output) {
            *p = c.norm_sqr();
        }
        Ok(())
    }

    /// Power spectrogram of every frame, shaped `[num_bins][num_frames]`.
    pub fn power_spectrogram(&mut self, frames: &FrameSet) -> Result<Matrix> {
        let num_frames = frames.len();
        let num_bins = self.num_bins();
        let mut spectrogram = Matrix::zeros(num_bins, num_frames);
        let mut column = vec![0.0f32; num_bins];

        for (t, frame) in frames.iter().enumerate() {
            self.power_spectrum_into(frame, &mut column)?;
            for (k, &p) in column.iter().enumerate() {
                spectrogram.set(k, t, p);
            }
        }

        Ok(spectrogram)
    }
}
