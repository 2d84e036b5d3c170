//! Mel-spectrogram feature extraction for short respiratory recordings.
//!
//! [`FeaturePipeline::extract`] turns an encoded audio file into a fixed-format
//! RGB raster for an image classifier; [`service`] wires that raster to an
//! inference endpoint and to blob/report storage.

pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod service;

pub use error::{FeatureError, Result};
pub use pipeline::{FeaturePipeline, MelSpectrogram};
pub use render::SpectrogramImage;
