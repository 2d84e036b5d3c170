use super::colormap::ColorMap;
use super::raster::SpectrogramImage;
use crate::audio::features::Matrix;
use crate::error::{FeatureError, Result};

/// Output raster size policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// One pixel per cell: `num_frames` wide, `n_mels` tall.
    Native,
    /// Nearest-neighbour resampling to a canonical size.
    Fixed { width: u32, height: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    pub resolution: Resolution,
    pub color_map: ColorMap,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            resolution: Resolution::Fixed {
                width: 400,
                height: 400,
            },
            color_map: ColorMap::Magma,
        }
    }
}

/// Render a `[n_mels][frames]` decibel matrix.
///
/// Time runs left to right and mel band 0 sits on the bottom row. Values map
/// linearly from `floor_db` (darkest) to 0 dB (brightest). No axes, labels or
/// padding are drawn.
pub fn render(db: &Matrix, floor_db: f32, options: &RenderOptions) -> Result<SpectrogramImage> {
    let (n_mels, num_frames) = db.shape();
    if n_mels == 0 || num_frames == 0 {
        return Err(FeatureError::invalid_config(
            "render",
            format!("cannot render an empty {n_mels}x{num_frames} matrix"),
        ));
    }
    if !(floor_db.is_finite() && floor_db < 0.0) {
        return Err(FeatureError::invalid_config(
            "render",
            format!("floor_db must be finite and negative, got {floor_db}"),
        ));
    }

    let (width, height) = match options.resolution {
        Resolution::Native => (num_frames as u32, n_mels as u32),
        Resolution::Fixed { width, height } => (width, height),
    };
    if width == 0 || height == 0 {
        return Err(FeatureError::invalid_config(
            "render",
            format!("output size {width}x{height} has no pixels"),
        ));
    }

    let columns: Vec<usize> = (0..width as usize)
        .map(|x| x * num_frames / width as usize)
        .collect();

    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height as usize {
        let band = (height as usize - 1 - y) * n_mels / height as usize;
        let row = db.row(band);
        for &frame in &columns {
            let t = (row[frame] - floor_db) / -floor_db;
            pixels.extend_from_slice(&options.color_map.rgb(t));
        }
    }

    Ok(SpectrogramImage::from_pixels(width, height, pixels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(resolution: Resolution) -> RenderOptions {
        RenderOptions {
            resolution,
            color_map: ColorMap::Gray,
        }
    }

    #[test]
    fn test_native_orientation() {
        // Band 0 is loud only in the last frame; band 2 only in the first.
        let db = Matrix::from_rows(vec![
            vec![-80.0, -80.0, 0.0],
            vec![-80.0, -80.0, -80.0],
            vec![0.0, -80.0, -80.0],
        ]);
        let image = render(&db, -80.0, &gray(Resolution::Native)).unwrap();
        assert_eq!((image.width(), image.height()), (3, 3));
        assert_eq!(image.pixel(2, 2), [255, 255, 255]);
        assert_eq!(image.pixel(0, 2), [0, 0, 0]);
        assert_eq!(image.pixel(0, 0), [255, 255, 255]);
        assert_eq!(image.pixel(2, 0), [0, 0, 0]);
    }

    #[test]
    fn test_fixed_resolution_nearest_neighbour() {
        let db = Matrix::from_rows(vec![vec![-80.0, 0.0], vec![-40.0, -20.0]]);
        let image = render(
            &db,
            -80.0,
            &gray(Resolution::Fixed {
                width: 4,
                height: 4,
            }),
        )
        .unwrap();
        assert_eq!(image.pixels().len(), 4 * 4 * 3);
        // Bottom half is band 0, left half is frame 0.
        assert_eq!(image.pixel(0, 3), [0, 0, 0]);
        assert_eq!(image.pixel(3, 3), [255, 255, 255]);
        assert_eq!(image.pixel(1, 0), [128, 128, 128]);
        assert_eq!(image.pixel(2, 1), [191, 191, 191]);
    }

    #[test]
    fn test_fixed_size_independent_of_input_shape() {
        let options = RenderOptions::default();
        for (bands, frames) in [(128, 1), (128, 28), (64, 500)] {
            let image = render(&Matrix::filled(bands, frames, -10.0), -80.0, &options).unwrap();
            assert_eq!((image.width(), image.height()), (400, 400));
        }
    }

    #[test]
    fn test_rejects_empty_and_bad_floor() {
        let options = RenderOptions::default();
        assert!(render(&Matrix::zeros(0, 0), -80.0, &options)
            .unwrap_err()
            .is_invalid_config());
        assert!(render(&Matrix::zeros(2, 2), 0.0, &options)
            .unwrap_err()
            .is_invalid_config());
        let empty = gray(Resolution::Fixed {
            width: 0,
            height: 10,
        });
        assert!(render(&Matrix::zeros(2, 2), -80.0, &empty)
            .unwrap_err()
            .is_invalid_config());
    }
}
