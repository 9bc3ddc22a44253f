//! A decoded image, as held by the cache.
//!
//! Decoding is somebody else's job.  This only describes the pixel buffer well enough to know its memory footprint,
//! which is what the cache weighs it by.
use crate::*;

/// Layout of a single pixel in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Alpha8,
    Rgb565,
    Argb4444,
    Argb8888,
    /// Half-float RGBA.
    RgbaF16,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Alpha8 => 1,
            PixelFormat::Rgb565 | PixelFormat::Argb4444 => 2,
            PixelFormat::Argb8888 => 4,
            PixelFormat::RgbaF16 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

fn buffer_len(width: u32, height: u32, format: PixelFormat) -> u64 {
    width as u64 * format.bytes_per_pixel() as u64 * height as u64
}

impl DecodedImage {
    /// Wrap an already decoded buffer.  Returns `None` if its length doesn't match the dimensions.
    pub fn from_pixels(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Option<DecodedImage> {
        if pixels.len() as u64 != buffer_len(width, height, format) {
            return None;
        }

        Some(DecodedImage {
            width,
            height,
            format,
            pixels,
        })
    }

    /// A zeroed image of the given size.
    pub fn blank(width: u32, height: u32, format: PixelFormat) -> DecodedImage {
        DecodedImage {
            width,
            height,
            format,
            pixels: vec![0; buffer_len(width, height, format) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels[..]
    }

    pub fn row_bytes(&self) -> u64 {
        self.width as u64 * self.format.bytes_per_pixel() as u64
    }

    /// Bytes taken by the pixel buffer.
    pub fn byte_count(&self) -> u64 {
        self.row_bytes() * self.height as u64
    }
}

impl EstimateCost for DecodedImage {
    fn estimate_cost(&self) -> u64 {
        self.byte_count()
    }
}
