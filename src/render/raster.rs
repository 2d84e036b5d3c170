use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::error::Result;

/// Packed RGB8 raster, row-major with the top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpectrogramImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl SpectrogramImage {
    pub(crate) fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    /// Lossless PNG encoding of the raster.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out).write_image(
            &self.pixels,
            self.width,
            self.height,
            ExtendedColorType::Rgb8,
        )?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_addressing() {
        let pixels = (0..2 * 3 * 3).map(|v| v as u8).collect();
        let image = SpectrogramImage::from_pixels(2, 3, pixels);
        assert_eq!(image.pixel(0, 0), [0, 1, 2]);
        assert_eq!(image.pixel(1, 0), [3, 4, 5]);
        assert_eq!(image.pixel(1, 2), [15, 16, 17]);
    }

    #[test]
    fn test_png_encoding() {
        let image = SpectrogramImage::from_pixels(4, 2, vec![200; 4 * 2 * 3]);
        let png = image.to_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 2));
        assert_eq!(decoded.as_raw(), image.pixels());
    }
}
