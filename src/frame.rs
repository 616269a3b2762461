//! Owned 8-bit, 3-channel pixel buffers with an explicit channel order
//!
//! Decoders hand us RGB while some inference tooling works in BGR, so the
//! order travels with the pixels and every conversion is an explicit swap.

use std::path::Path;

use image::{DynamicImage, RgbImage};
use thiserror::Error;

const CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("image has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height}x3")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A request-owned image. Never shared between pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl ImageFrame {
    pub fn new(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, order, data })
    }

    /// A frame filled with a single color given in RGB.
    #[cfg(test)]
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self, FrameError> {
        let data = rgb.repeat(width as usize * height as usize);
        Self::new(width, height, ChannelOrder::Rgb, data)
    }

    pub fn from_rgb_image(image: RgbImage) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        Self::new(width, height, ChannelOrder::Rgb, image.into_raw())
    }

    pub fn from_dynamic(image: &DynamicImage) -> Result<Self, FrameError> {
        Self::from_rgb_image(image.to_rgb8())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let image = image::open(path)?;
        Self::from_dynamic(&image)
    }

    pub fn from_memory(bytes: &[u8]) -> Result<Self, FrameError> {
        let image = image::load_from_memory(bytes)?;
        Self::from_dynamic(&image)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at (x, y) in the frame's own channel order
    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Pixel at (x, y) as RGB regardless of storage order
    #[cfg(test)]
    pub fn rgb_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let [a, b, c] = self.pixel(x, y)?;
        Some(match self.order {
            ChannelOrder::Rgb => [a, b, c],
            ChannelOrder::Bgr => [c, b, a],
        })
    }

    /// Reorder channels, swapping R and B when the order changes.
    pub fn into_order(mut self, order: ChannelOrder) -> Self {
        if self.order != order {
            for px in self.data.chunks_exact_mut(CHANNELS) {
                px.swap(0, 2);
            }
            self.order = order;
        }
        self
    }

    pub fn to_order(&self, order: ChannelOrder) -> Self {
        self.clone().into_order(order)
    }

    pub fn into_rgb_image(self) -> RgbImage {
        let (width, height) = (self.width, self.height);
        let data = self.into_order(ChannelOrder::Rgb).data;
        // Length was validated on construction
        RgbImage::from_raw(width, height, data).unwrap_or_else(|| RgbImage::new(width, height))
    }

    /// Expand to opaque RGBA in RGB order for the rasterizer.
    pub(crate) fn to_rgba_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() / CHANNELS * 4);
        for px in self.data.chunks_exact(CHANNELS) {
            match self.order {
                ChannelOrder::Rgb => out.extend_from_slice(&[px[0], px[1], px[2], 255]),
                ChannelOrder::Bgr => out.extend_from_slice(&[px[2], px[1], px[0], 255]),
            }
        }
        out
    }

    /// Inverse of [`Self::to_rgba_bytes`]: drop alpha and store in `order`.
    pub(crate) fn from_rgba_bytes(width: u32, height: u32, rgba: &[u8], order: ChannelOrder) -> Result<Self, FrameError> {
        let mut data = Vec::with_capacity(rgba.len() / 4 * CHANNELS);
        for px in rgba.chunks_exact(4) {
            match order {
                ChannelOrder::Rgb => data.extend_from_slice(&[px[0], px[1], px[2]]),
                ChannelOrder::Bgr => data.extend_from_slice(&[px[2], px[1], px[0]]),
            }
        }
        Self::new(width, height, order, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_buffers() {
        assert!(matches!(
            ImageFrame::new(0, 4, ChannelOrder::Rgb, Vec::new()),
            Err(FrameError::Empty { .. })
        ));
        assert!(matches!(
            ImageFrame::new(2, 2, ChannelOrder::Rgb, vec![0; 11]),
            Err(FrameError::BufferSize { expected: 12, actual: 11, .. })
        ));
    }

    #[test]
    fn test_channel_swap() {
        let frame = ImageFrame::new(1, 1, ChannelOrder::Rgb, vec![10, 20, 30]).unwrap();
        let bgr = frame.to_order(ChannelOrder::Bgr);
        assert_eq!(bgr.order(), ChannelOrder::Bgr);
        assert_eq!(bgr.as_raw(), &[30, 20, 10]);
        assert_eq!(bgr.rgb_pixel(0, 0), Some([10, 20, 30]));

        // Same order is a no-op
        let same = frame.to_order(ChannelOrder::Rgb);
        assert_eq!(same, frame);
    }

    #[test]
    fn test_rgba_round_trip_keeps_order() {
        let frame = ImageFrame::new(2, 1, ChannelOrder::Bgr, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let rgba = frame.to_rgba_bytes();
        assert_eq!(rgba, vec![3, 2, 1, 255, 6, 5, 4, 255]);

        let back = ImageFrame::from_rgba_bytes(2, 1, &rgba, ChannelOrder::Bgr).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_rgb_image_conversion() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, image::Rgb([7, 8, 9]));
        let frame = ImageFrame::from_rgb_image(img.clone()).unwrap();
        assert_eq!(frame.pixel(2, 1), Some([7, 8, 9]));
        assert_eq!(frame.pixel(3, 0), None);

        let back = frame.into_order(ChannelOrder::Bgr).into_rgb_image();
        assert_eq!(back, img);
    }
}
