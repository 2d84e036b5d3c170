use std::f32::consts::PI;

use crate::error::{FeatureError, Result};

/// Windowed analysis frames, stored back to back.
#[derive(Clone, Debug)]
pub struct FrameSet {
    frame_length: usize,
    data: Vec<f32>,
}

impl FrameSet {
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.frame_length
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn frame(&self, index: usize) -> &[f32] {
        let start = index * self.frame_length;
        &self.data[start..start + self.frame_length]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.frame_length)
    }
}

/// Number of frames produced for `len` samples. Never less than one.
pub fn num_frames(len: usize, frame_length: usize, hop_length: usize) -> usize {
    if len < frame_length {
        1
    } else {
        (len - frame_length) / hop_length + 1
    }
}

/// Symmetric Hann window, `w[n] = 0.5 - 0.5 cos(2πn / (N - 1))`.
pub fn hann_window(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    let denom = (size - 1) as f32;
    (0..size)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / denom).cos())
        .collect()
}

/// Slice `samples` into Hann-windowed frames of `frame_length`, advancing by
/// `hop_length`. Clips shorter than one frame are zero-padded to one frame.
pub fn frame(samples: &[f32], frame_length: usize, hop_length: usize) -> Result<FrameSet> {
    if frame_length == 0 {
        return Err(FeatureError::invalid_config("frame", "frame_length must be > 0"));
    }
    if hop_length == 0 {
        return Err(FeatureError::invalid_config("frame", "hop_length must be > 0"));
    }
    if hop_length > frame_length {
        return Err(FeatureError::invalid_config(
            "frame",
            format!("hop_length {hop_length} exceeds frame_length {frame_length}"),
        ));
    }

    let window = hann_window(frame_length);
    let count = num_frames(samples.len(), frame_length, hop_length);
    let mut data = vec![0.0f32; count * frame_length];

    for (index, out) in data.chunks_exact_mut(frame_length).enumerate() {
        let start = index * hop_length;
        let end = (start + frame_length).min(samples.len());
        if start < end {
            for (dst, (&s, &w)) in out.iter_mut().zip(samples[start..end].iter().zip(&window)) {
                *dst = s * w;
            }
        }
    }

    log::debug!(
        "Framed {} samples into {} frames (length={}, hop={})",
        samples.len(),
        count,
        frame_length,
        hop_length
    );

    Ok(FrameSet { frame_length, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_endpoints_and_peak() {
        let w = hann_window(9);
        assert_eq!(w.len(), 9);
        assert!(w[0].abs() < 1e-7);
        assert!(w[8].abs() < 1e-6);
        assert!((w[4] - 1.0).abs() < 1e-6);
        for n in 0..9 {
            assert!((w[n] - w[8 - n]).abs() < 1e-6, "window not symmetric at {n}");
        }
    }

    #[test]
    fn test_frame_count_formula() {
        assert_eq!(num_frames(16_000, 2048, 512), 28);
        assert_eq!(num_frames(2048, 2048, 512), 1);
        assert_eq!(num_frames(2560, 2048, 512), 2);
        assert_eq!(num_frames(2559, 2048, 512), 1);
    }

    #[test]
    fn test_at_least_one_frame() {
        for len in [0usize, 1, 7, 100, 511, 2047] {
            for (frame_length, hop) in [(2048, 512), (16, 16), (8, 1), (1, 1)] {
                let samples = vec![1.0f32; len];
                let frames = frame(&samples, frame_length, hop).unwrap();
                assert!(frames.len() >= 1, "len={len} frame={frame_length} hop={hop}");
            }
        }
    }

    #[test]
    fn test_short_clip_is_zero_padded() {
        let samples = vec![1.0f32; 3];
        let frames = frame(&samples, 8, 4).unwrap();
        assert_eq!(frames.len(), 1);
        let window = hann_window(8);
        let first = frames.frame(0);
        assert_eq!(&first[..3], &window[..3]);
        assert!(first[3..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_frames_follow_hop() {
        let samples: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let frames = frame(&samples, 8, 4).unwrap();
        assert_eq!(frames.len(), 4);
        let window = hann_window(8);
        for (i, f) in frames.iter().enumerate() {
            for n in 0..8 {
                assert_eq!(f[n], samples[i * 4 + n] * window[n]);
            }
        }
    }

    #[test]
    fn test_invalid_lengths() {
        assert!(frame(&[0.0; 4], 0, 1).unwrap_err().is_invalid_config());
        assert!(frame(&[0.0; 4], 4, 0).unwrap_err().is_invalid_config());
        assert!(frame(&[0.0; 4], 4, 8).unwrap_err().is_invalid_config());
    }
}
