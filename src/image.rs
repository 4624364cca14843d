use anyhow::{bail, Context as AnyhowContext, Result};
use ::image::codecs::png::PngEncoder;
use ::image::{ExtendedColorType, ImageEncoder, ImageFormat};

use crate::my_types::*;

/// Row-major grayscale image storage
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Create an image filled with a single value
    pub fn filled(width: usize, height: usize, value: u8) -> Image {
        Image {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the size for a chosen dimension
    pub fn size(&self, dim: usize) -> usize {
        if dim == 0 {
            self.width
        } else {
            self.height
        }
    }

    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline(always)]
    pub fn value_i32(&self, x: i32, y: i32) -> u8 {
        self.data[y as usize * self.width + x as usize]
    }

    #[inline(always)]
    pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// Copy `patch` so that its top-left corner lands on (x, y). Pixels falling
    /// outside this image are dropped.
    pub fn set_sub_image_i32(&mut self, x: i32, y: i32, patch: &Image) {
        for py in 0..patch.height as i32 {
            for px in 0..patch.width as i32 {
                let (tx, ty) = (x + px, y + py);
                if tx < 0 || ty < 0 || tx >= self.width as i32 || ty >= self.height as i32 {
                    continue;
                }
                self.set_value(tx as usize, ty as usize, patch.value_i32(px, py));
            }
        }
    }

    /// Encode as a single channel png
    pub fn to_png(&self) -> Result<Vec<u8>> {
        if self.data.len() != self.width * self.height {
            bail!(
                "image buffer holds {} bytes but shape is {} x {}",
                self.data.len(),
                self.width,
                self.height
            );
        }
        let mut bytes = vec![];
        PngEncoder::new(&mut bytes)
            .write_image(
                &self.data,
                self.width as u32,
                self.height as u32,
                ExtendedColorType::L8,
            )
            .context("png encoding failed")?;
        Ok(bytes)
    }

    pub fn from_png(bytes: &[u8]) -> Result<Image> {
        let decoded = ::image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .context("png decoding failed")?
            .into_luma8();
        let (width, height) = decoded.dimensions();
        Ok(Image {
            data: decoded.into_raw(),
            width: width as usize,
            height: height as usize,
        })
    }
}

/// Sample the image at a subpixel location. Coordinates outside the image are
/// clamped to the border.
pub fn bilinear(image: &Image, point: Vector2d) -> f64 {
    let x_max = (image.width - 1) as f64;
    let y_max = (image.height - 1) as f64;
    let x = point[0].clamp(0., x_max);
    let y = point[1].clamp(0., y_max);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = usize::min(x0 + 1, image.width - 1);
    let y1 = usize::min(y0 + 1, image.height - 1);
    let ax = x - x0 as f64;
    let ay = y - y0 as f64;

    let v = |x: usize, y: usize| image.value(x, y) as f64;
    (1. - ay) * ((1. - ax) * v(x0, y0) + ax * v(x1, y0)) + ay * ((1. - ax) * v(x0, y1) + ax * v(x1, y1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilinear() {
        let image = Image {
            data: vec![0, 10, 20, 30],
            width: 2,
            height: 2,
        };
        assert_eq!(bilinear(&image, Vector2d::new(0., 0.)), 0.);
        assert_eq!(bilinear(&image, Vector2d::new(1., 1.)), 30.);
        assert!((bilinear(&image, Vector2d::new(0.5, 0.5)) - 15.).abs() < 1e-12);
        assert!((bilinear(&image, Vector2d::new(0.25, 0.)) - 2.5).abs() < 1e-12);
        // clamped to the border
        assert_eq!(bilinear(&image, Vector2d::new(-3., 5.)), 20.);
    }

    #[test]
    fn test_png() {
        let mut image = Image::filled(12, 7, 3);
        image.set_value(4, 5, 250);
        let bytes = image.to_png().unwrap();
        assert_eq!(Image::from_png(&bytes).unwrap(), image);

        let broken = Image {
            data: vec![1, 2, 3],
            width: 2,
            height: 2,
        };
        assert!(broken.to_png().is_err());
    }

    #[test]
    fn test_set_sub_image() {
        let mut image = Image::filled(4, 4, 0);
        let patch = Image::filled(2, 2, 9);
        image.set_sub_image_i32(3, -1, &patch);
        assert_eq!(image.value(3, 0), 9);
        assert_eq!(image.value(2, 0), 0);
        assert_eq!(image.data.iter().filter(|v| **v == 9).count(), 1);
    }
}
