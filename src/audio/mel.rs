//! Triangular mel filterbank and the process-wide filterbank cache.

use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::features::Matrix;
use crate::error::{FeatureError, Result};

/// HTK mel scale: `2595 · log10(1 + f / 700)`.
pub fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// `[n_mels][frame_length / 2 + 1]` triangular filter weights.
#[derive(Debug)]
pub struct MelFilterbank {
    sample_rate: u32,
    frame_length: usize,
    n_mels: usize,
    f_max: f32,
    weights: Matrix,
    /// Non-zero bin range of each filter.
    support: Vec<Range<usize>>,
}

impl MelFilterbank {
    /// Build filters evenly spaced on the mel scale between 0 Hz and `f_max`.
    ///
    /// `f_max` above Nyquist is clamped to Nyquist. A filter too narrow to
    /// contain any FFT bin puts unit weight on the bin nearest its center, so
    /// no band is ever identically zero.
    pub fn build(sample_rate: u32, frame_length: usize, n_mels: usize, f_max: f32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(FeatureError::invalid_config("mel", "sample rate must be > 0"));
        }
        if frame_length == 0 {
            return Err(FeatureError::invalid_config("mel", "frame_length must be > 0"));
        }
        if n_mels == 0 {
            return Err(FeatureError::invalid_config("mel", "n_mels must be > 0"));
        }
        if !(f_max.is_finite() && f_max > 0.0) {
            return Err(FeatureError::invalid_config(
                "mel",
                format!("f_max must be a positive frequency, got {f_max}"),
            ));
        }

        let f_max = clamp_to_nyquist(sample_rate, f_max);
        let num_bins = frame_length / 2 + 1;
        let bin_hz = sample_rate as f64 / frame_length as f64;

        let mel_max = hz_to_mel(f_max as f64);
        let edges: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
            .collect();

        let mut weights = Matrix::zeros(n_mels, num_bins);
        let mut support = Vec::with_capacity(n_mels);
        let mut fallbacks = 0usize;

        for m in 0..n_mels {
            let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
            let row = weights.row_mut(m);

            let mut first = num_bins;
            let mut last = 0;
            for (k, w) in row.iter_mut().enumerate() {
                let freq = k as f64 * bin_hz;
                let value = if freq > left && freq <= center {
                    (freq - left) / (center - left)
                } else if freq > center && freq < right {
                    (right - freq) / (right - center)
                } else {
                    0.0
                };
                if value > 0.0 {
                    *w = value as f32;
                    first = first.min(k);
                    last = k;
                }
            }

            if first == num_bins {
                let nearest = ((center / bin_hz).round() as usize).min(num_bins - 1);
                row[nearest] = 1.0;
                first = nearest;
                last = nearest;
                fallbacks += 1;
            }
            support.push(first..last + 1);
        }

        if fallbacks > 0 {
            log::warn!(
                "{} of {} mel filters narrower than one FFT bin ({:.2}Hz); \
                 using nearest-bin weights. Consider a larger frame_length or fewer bands",
                fallbacks,
                n_mels,
                bin_hz
            );
        }

        Ok(Self {
            sample_rate,
            frame_length,
            n_mels,
            f_max,
            weights,
            support,
        })
    }

    /// Shared filterbank for this parameter set. Concurrent first callers share one
    /// build; at most [`MAX_CACHED_FILTERBANKS`] parameter sets are retained.
    pub fn cached(
        sample_rate: u32,
        frame_length: usize,
        n_mels: usize,
        f_max: f32,
    ) -> Result<Arc<Self>> {
        FilterbankCache::global().get(sample_rate, frame_length, n_mels, f_max)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    /// Effective upper edge after clamping.
    pub fn f_max(&self) -> f32 {
        self.f_max
    }

    pub fn num_bins(&self) -> usize {
        self.weights.cols()
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    /// Mel energies `[n_mels][frames]` from a power spectrogram `[bins][frames]`.
    pub fn project(&self, power: &Matrix) -> Result<Matrix> {
        if power.rows() != self.num_bins() {
            return Err(FeatureError::invalid_config(
                "mel",
                format!(
                    "power spectrogram has {} bins, filterbank expects {}",
                    power.rows(),
                    self.num_bins()
                ),
            ));
        }

        let num_frames = power.cols();
        let mut mel = Matrix::zeros(self.n_mels, num_frames);

        for (m, range) in self.support.iter().enumerate() {
            let filter = self.weights.row(m);
            let out = mel.row_mut(m);
            for k in range.clone() {
                let w = filter[k];
                if w == 0.0 {
                    continue;
                }
                for (acc, &p) in out.iter_mut().zip(power.row(k)) {
                    *acc += w * p;
                }
            }
        }

        Ok(mel)
    }
}

fn clamp_to_nyquist(sample_rate: u32, f_max: f32) -> f32 {
    let nyquist = sample_rate as f32 / 2.0;
    if f_max > nyquist {
        log::debug!("Clamping f_max {}Hz to Nyquist {}Hz", f_max, nyquist);
        nyquist
    } else {
        f_max
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct FilterbankKey {
    sample_rate: u32,
    frame_length: usize,
    n_mels: usize,
    f_max_bits: u32,
}

/// Upper bound on retained filterbanks; about 0.5 MB each at 128 bands x 2048.
pub const MAX_CACHED_FILTERBANKS: usize = 16;

struct FilterbankCache {
    capacity: usize,
    state: RwLock<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<FilterbankKey, Arc<MelFilterbank>>,
    /// Insertion order, oldest first.
    order: VecDeque<FilterbankKey>,
}

impl FilterbankCache {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: RwLock::new(CacheState::default()),
        }
    }

    fn global() -> &'static FilterbankCache {
        static INSTANCE: OnceLock<FilterbankCache> = OnceLock::new();
        INSTANCE.get_or_init(|| FilterbankCache::with_capacity(MAX_CACHED_FILTERBANKS))
    }

    fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    fn get(
        &self,
        sample_rate: u32,
        frame_length: usize,
        n_mels: usize,
        f_max: f32,
    ) -> Result<Arc<MelFilterbank>> {
        // Keyed on the clamped value so f_max=sr and f_max=sr/2 share one entry.
        let effective = if f_max.is_finite() && f_max > 0.0 && sample_rate > 0 {
            clamp_to_nyquist(sample_rate, f_max)
        } else {
            f_max
        };
        let key = FilterbankKey {
            sample_rate,
            frame_length,
            n_mels,
            f_max_bits: effective.to_bits(),
        };

        // Entries are immutable, so a poisoned lock still guards valid data.
        if let Some(existing) = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(&key)
        {
            return Ok(Arc::clone(existing));
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = state.entries.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let built = Arc::new(MelFilterbank::build(
            sample_rate,
            frame_length,
            n_mels,
            effective,
        )?);
        log::debug!(
            "Built mel filterbank: sr={}Hz frame={} bands={} f_max={}Hz",
            sample_rate,
            frame_length,
            n_mels,
            built.f_max()
        );

        while state.entries.len() >= self.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            log::debug!("Evicted mel filterbank for sr={}Hz", oldest.sample_rate);
        }
        state.entries.insert(key, Arc::clone(&built));
        state.order.push_back(key);
        Ok(built)
    }
}
