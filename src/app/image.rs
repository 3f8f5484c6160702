//! Decoded images and the decode/encode capability
//!
//! [`Image`] is a cheap, reference-counted handle to a decoded raster. The
//! cache never interprets pixels itself; it goes through an [`ImageCodec`]
//! to turn payload bytes into images and back.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};

use crate::errors::{DecodeError, DecodeResult};

/// Decoded image shared between the memory tier and every caller
#[derive(Clone)]
pub struct Image {
    inner: Arc<DynamicImage>,
}

impl Image {
    /// Wrap a decoded raster
    pub fn new(image: DynamicImage) -> Self {
        Self {
            inner: Arc::new(image),
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    /// Decoded size in bytes (`width * height * bytes_per_pixel`)
    pub fn byte_cost(&self) -> usize {
        self.inner.as_bytes().len()
    }

    /// Borrow the underlying raster
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.inner
    }

    /// True when both handles point at the same decoded allocation
    pub fn same_as(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<DynamicImage> for Image {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other) || *self.inner == *other.inner
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("color", &self.inner.color())
            .finish()
    }
}

/// Turns payload bytes into images and images back into bytes
pub trait ImageCodec: Send + Sync + fmt::Debug {
    /// Decode a payload; fails on empty or unrecognized data
    fn decode(&self, bytes: &[u8]) -> DecodeResult<Image>;

    /// Encode an image for persistence
    fn encode(&self, image: &Image) -> DecodeResult<Vec<u8>>;
}

/// Default codec backed by the `image` crate
///
/// Decoding sniffs the format from the payload. Encoding writes PNG unless
/// another format is configured.
#[derive(Debug, Clone)]
pub struct RasterCodec {
    format: ImageFormat,
}

impl Default for RasterCodec {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
        }
    }
}

impl RasterCodec {
    /// Create a codec that encodes PNG
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the format used when encoding
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Format used when encoding
    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

impl ImageCodec for RasterCodec {
    fn decode(&self, bytes: &[u8]) -> DecodeResult<Image> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let decoded = image::load_from_memory(bytes)?;
        Ok(Image::new(decoded))
    }

    fn encode(&self, image: &Image) -> DecodeResult<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .as_dynamic()
            .write_to(&mut buffer, self.format)
            .map_err(|e| DecodeError::Encode {
                reason: e.to_string(),
            })?;
        Ok(buffer.into_inner())
    }
}
