//! # Decode Module
//!
//! Turns uploaded image payloads into decoded images.
//!
//! Uses zune-jpeg for JPEG payloads (1.5-2x faster than image crate),
//! falls back to image crate for other formats.

use crate::error::{AnimalMatcherError, ImageError};
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use std::fs;
use std::path::Path;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

/// A raw photo submitted for registration or search
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// Original file name, used for diagnostics and the stored extension
    pub file_name: String,
    /// Encoded image bytes
    pub data: Vec<u8>,
}

impl ImagePayload {
    /// Create a payload from in-memory bytes
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            data,
        }
    }

    /// Read a payload from a file on disk
    pub fn from_path(path: &Path) -> Result<Self, AnimalMatcherError> {
        let data = fs::read(path).map_err(|e| AnimalMatcherError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self { file_name, data })
    }

    /// Detected format of this payload
    pub fn format(&self) -> ImageFormat {
        ImageFormat::from_name(&self.file_name)
    }

    /// Extension to use when the payload is stored, defaulting to `jpg`
    pub fn stored_extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| "jpg".to_string())
    }

    /// Decode the payload bytes into an image
    pub fn decode(&self) -> Result<DynamicImage, ImageError> {
        FastDecoder::decode(self)
    }
}

/// Formats with a dedicated fast decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    /// Anything else, decoded by sniffing the bytes
    Other,
}

impl ImageFormat {
    /// Detect format from a file name's extension
    pub fn from_name(name: &str) -> Self {
        match Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("jpg" | "jpeg") => Self::Jpeg,
            _ => Self::Other,
        }
    }
}

/// Fast image decoder that uses optimized decoders per format
pub struct FastDecoder;

impl FastDecoder {
    /// Decode a payload using the fastest available decoder.
    ///
    /// - JPEG: Uses zune-jpeg (1.5-2x faster)
    /// - Other formats: Falls back to image crate (format sniffed from bytes)
    pub fn decode(payload: &ImagePayload) -> Result<DynamicImage, ImageError> {
        if payload.data.is_empty() {
            return Err(ImageError::Decode {
                file_name: payload.file_name.clone(),
                reason: "payload is empty".to_string(),
            });
        }

        match payload.format() {
            ImageFormat::Jpeg => {
                Self::decode_jpeg(payload).or_else(|_| Self::decode_fallback(payload))
            }
            _ => Self::decode_fallback(payload),
        }
    }

    /// Fast JPEG decoding using zune-jpeg
    fn decode_jpeg(payload: &ImagePayload) -> Result<DynamicImage, ImageError> {
        let decode_error = |reason: String| ImageError::Decode {
            file_name: payload.file_name.clone(),
            reason,
        };

        let options = DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGB);
        let mut decoder = JpegDecoder::new_with_options(payload.data.as_slice(), options);

        let pixels = decoder
            .decode()
            .map_err(|e| decode_error(format!("zune-jpeg decode failed: {:?}", e)))?;

        let info = decoder
            .info()
            .ok_or_else(|| decode_error("Failed to get image info".to_string()))?;

        let width = info.width as u32;
        let height = info.height as u32;

        let out_colorspace = decoder.get_output_colorspace().unwrap_or(ColorSpace::RGB);

        let image = match out_colorspace {
            ColorSpace::RGB => {
                let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels)
                        .ok_or_else(|| decode_error("Failed to create RGB buffer".to_string()))?;
                DynamicImage::ImageRgb8(buffer)
            }
            ColorSpace::RGBA => {
                let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels)
                        .ok_or_else(|| decode_error("Failed to create RGBA buffer".to_string()))?;
                DynamicImage::ImageRgba8(buffer)
            }
            ColorSpace::Luma => {
                let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
                    ImageBuffer::from_raw(width, height, pixels)
                        .ok_or_else(|| decode_error("Failed to create Luma buffer".to_string()))?;
                DynamicImage::ImageLuma8(buffer)
            }
            _ => return Self::decode_fallback(payload),
        };

        Ok(image)
    }

    /// Fallback to image crate, which sniffs the format from the bytes
    fn decode_fallback(payload: &ImagePayload) -> Result<DynamicImage, ImageError> {
        image::load_from_memory(&payload.data).map_err(|e| ImageError::Decode {
            file_name: payload.file_name.clone(),
            reason: e.to_string(),
        })
    }
}
