//! Image decoding into `[1, C, H, W]` input tensors.
//!
//! Bytes may be PNG, JPEG, BMP or GIF. The image is resized to the requested
//! size and pixel values are normalised to `[0, 1]`.

use image::imageops::FilterType;

use crate::error::DataError;
use crate::math::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageChannels {
    Grayscale,
    Rgb,
}

impl ImageChannels {
    pub fn count(self) -> usize {
        match self {
            ImageChannels::Grayscale => 1,
            ImageChannels::Rgb => 3,
        }
    }
}

/// Decodes `bytes` into a single-sample batch ready for a Conv2d stack.
///
/// RGB images are laid out planar (all red, then green, then blue).
pub fn image_to_tensor(bytes: &[u8], width: u32, height: u32, channels: ImageChannels) -> Result<Tensor, DataError> {
    let img = image::load_from_memory(bytes)?;
    let resized = img.resize_exact(width, height, FilterType::Lanczos3);
    let (w, h) = (width as usize, height as usize);

    let data = match channels {
        ImageChannels::Grayscale => resized.to_luma8()
            .pixels()
            .map(|p| p.0[0] as f64 / 255.0)
            .collect(),
        ImageChannels::Rgb => {
            let rgb = resized.to_rgb8();
            let mut planar = vec![0.0; 3 * h * w];
            for (i, p) in rgb.pixels().enumerate() {
                for c in 0..3 {
                    planar[c * h * w + i] = p.0[c] as f64 / 255.0;
                }
            }
            planar
        }
    };
    Ok(Tensor::from_vec(&[1, channels.count(), h, w], data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    fn png(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb(pixel));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn rgb_is_planar_and_normalised() {
        let t = image_to_tensor(&png(4, 4, [255, 0, 51]), 2, 2, ImageChannels::Rgb).unwrap();
        assert_eq!(t.shape, vec![1, 3, 2, 2]);
        assert!(t.data[..4].iter().all(|&v| (v - 1.0).abs() < 1e-9));
        assert!(t.data[4..8].iter().all(|&v| v.abs() < 1e-9));
        assert!(t.data[8..].iter().all(|&v| (v - 0.2).abs() < 1e-9));
    }

    #[test]
    fn grayscale_has_one_channel() {
        let t = image_to_tensor(&png(3, 5, [10, 10, 10]), 3, 5, ImageChannels::Grayscale).unwrap();
        assert_eq!(t.shape, vec![1, 1, 5, 3]);
    }

    #[test]
    fn garbage_bytes_are_an_image_error() {
        assert!(matches!(
            image_to_tensor(b"not an image", 2, 2, ImageChannels::Rgb),
            Err(DataError::Image(_))
        ));
    }
}
