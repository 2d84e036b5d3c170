pub mod colormap;
pub mod raster;
pub mod spectrogram;

pub use colormap::ColorMap;
pub use raster::SpectrogramImage;
pub use spectrogram::{render, RenderOptions, Resolution};
