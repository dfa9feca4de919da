/// Bytes per RGBA8 texel.
pub const BYTES_PER_PIXEL: u32 = 4;

/// Errors from building an [`Rgba8Image`] out of decoder output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageLayoutError {
    #[error("unsupported image layout: row stride {stride} != width {width} * 4")]
    UnsupportedStride { width: u32, stride: usize },
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// A tightly packed RGBA8 image: rows follow each other with no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rgba8Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Rgba8Image {
    /// Wrap decoder output, rejecting any layout whose rows are not exactly
    /// `width * 4` bytes apart.
    pub fn from_raw(
        width: u32,
        height: u32,
        row_stride: usize,
        pixels: Vec<u8>,
    ) -> Result<Self, ImageLayoutError> {
        let packed = width as usize * BYTES_PER_PIXEL as usize;
        if row_stride != packed {
            return Err(ImageLayoutError::UnsupportedStride {
                width,
                stride: row_stride,
            });
        }
        let expected = packed * height as usize;
        if pixels.len() != expected {
            return Err(ImageLayoutError::LengthMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A single-colour image, handy for tests and placeholders in tooling.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * BYTES_PER_PIXEL as usize)
            .collect();
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

    /// Bytes between the starts of consecutive rows.
    pub fn row_stride(&self) -> u32 {
        self.width * BYTES_PER_PIXEL
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}
