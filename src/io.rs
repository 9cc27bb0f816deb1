// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image encoding for responses and saved results.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType};

use crate::error::{InferenceError, Result};

/// JPEG quality used for annotated images.
pub const JPEG_QUALITY: u8 = 95;

/// Encode an image as JPEG.
///
/// The image is converted to 8-bit RGB first, dropping any alpha channel.
///
/// # Errors
///
/// Returns an error if the encoder rejects the image.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode(
        rgb.as_raw(),
        width,
        height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(buffer)
}

/// Wrap encoded bytes in a base64 `data:` URI.
#[must_use]
pub fn to_data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Encode an image as a JPEG data URI at [`JPEG_QUALITY`].
///
/// # Errors
///
/// Returns an error if JPEG encoding fails.
pub fn jpeg_data_uri(image: &DynamicImage) -> Result<String> {
    let bytes = encode_jpeg(image, JPEG_QUALITY)?;
    Ok(to_data_uri(&bytes, "image/jpeg"))
}

/// Decode the payload of a `data:` URI produced by [`to_data_uri`].
///
/// # Errors
///
/// Returns an error if the URI has no base64 payload or it fails to decode.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let (_, payload) = uri
        .split_once(";base64,")
        .ok_or_else(|| InferenceError::ImageError("Not a base64 data URI".to_string()))?;
    STANDARD
        .decode(payload)
        .map_err(|e| InferenceError::ImageError(format!("Invalid base64 payload: {e}")))
}

/// Save an image as a JPEG file at [`JPEG_QUALITY`], creating parent directories.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot be written.
pub fn save_jpeg(image: &DynamicImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, encode_jpeg(image, JPEG_QUALITY)?)?;
    Ok(())
}
