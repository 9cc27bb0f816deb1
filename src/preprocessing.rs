// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Image preprocessing for the ONNX detector.
//!
//! Letterboxes the image into the model input size, normalizes to [0, 1] and
//! lays it out as an NCHW tensor. The returned transform maps model-space
//! boxes back onto the original image.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;

/// Default letterbox padding color (gray).
pub const LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

/// Result of preprocessing an image, containing the tensor and transform info.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// Preprocessed image tensor in NCHW format, normalized to [0, 1].
    pub tensor: Array4<f32>,
    /// Original image dimensions (height, width).
    pub orig_shape: (u32, u32),
    /// Scale factors applied (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
    /// Padding applied (`pad_top`, `pad_left`).
    pub padding: (f32, f32),
}

/// Letterbox geometry for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Width of the resized image inside the canvas.
    pub new_width: u32,
    /// Height of the resized image inside the canvas.
    pub new_height: u32,
    /// Left padding.
    pub pad_left: u32,
    /// Top padding.
    pub pad_top: u32,
    /// Scale factors (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
}

/// Compute how an image of the given size fits into `target_size` (height, width).
///
/// The aspect ratio is preserved and the image is centered.
#[must_use]
pub fn calculate_letterbox_params(orig_width: u32, orig_height: u32, target_size: (usize, usize)) -> Letterbox {
    let (target_h, target_w) = (target_size.0 as f32, target_size.1 as f32);
    let (orig_h, orig_w) = (orig_height.max(1) as f32, orig_width.max(1) as f32);

    let scale = (target_h / orig_h).min(target_w / orig_w);

    let new_width = ((orig_w * scale).round() as u32).max(1);
    let new_height = ((orig_h * scale).round() as u32).max(1);

    let pad_left = (target_size.1 as u32).saturating_sub(new_width) / 2;
    let pad_top = (target_size.0 as u32).saturating_sub(new_height) / 2;

    Letterbox {
        new_width,
        new_height,
        pad_left,
        pad_top,
        scale: (new_height as f32 / orig_h, new_width as f32 / orig_w),
    }
}

/// Preprocess an image for inference at `target_size` (height, width).
#[must_use]
pub fn preprocess_image(image: &DynamicImage, target_size: (usize, usize)) -> PreprocessResult {
    let rgb = image.to_rgb8();
    let (orig_w, orig_h) = rgb.dimensions();
    let params = calculate_letterbox_params(orig_w, orig_h, target_size);

    let resized = imageops::resize(&rgb, params.new_width, params.new_height, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(
        target_size.1 as u32,
        target_size.0 as u32,
        Rgb(LETTERBOX_COLOR),
    );
    imageops::replace(&mut canvas, &resized, i64::from(params.pad_left), i64::from(params.pad_top));

    PreprocessResult {
        tensor: image_to_tensor(&canvas),
        orig_shape: (orig_h, orig_w),
        scale: params.scale,
        padding: (params.pad_top as f32, params.pad_left as f32),
    }
}

/// Convert an RGB image to a normalized (1, 3, H, W) tensor.
#[must_use]
pub fn image_to_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            tensor[[0, c, y, x]] = f32::from(pixel[c]) / 255.0;
        }
    }

    tensor
}

/// Map coordinates from model space (after letterbox) back to the original image.
#[must_use]
pub fn scale_coords(coords: &[f32; 4], scale: (f32, f32), padding: (f32, f32)) -> [f32; 4] {
    let (scale_y, scale_x) = scale;
    let (pad_top, pad_left) = padding;

    [
        (coords[0] - pad_left) / scale_x,
        (coords[1] - pad_top) / scale_y,
        (coords[2] - pad_left) / scale_x,
        (coords[3] - pad_top) / scale_y,
    ]
}

/// Clip coordinates to image `shape` (height, width).
#[must_use]
pub fn clip_coords(coords: &[f32; 4], shape: (u32, u32)) -> [f32; 4] {
    let (h, w) = (shape.0 as f32, shape.1 as f32);
    [
        coords[0].clamp(0.0, w),
        coords[1].clamp(0.0, h),
        coords[2].clamp(0.0, w),
        coords[3].clamp(0.0, h),
    ]
}
