use image::{imageops, imageops::FilterType, GenericImageView, ImageFormat, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::errors::{Result, SegError};

/// Decoded source image: 8-bit RGB, alpha dropped, grayscale promoted.
pub type RawImage = RgbImage;

/// Spatial size of the DeepLabV3 input tensor.
pub const INPUT_SIZE: u32 = 520;

/// ImageNet channel statistics the pre-trained weights expect.
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

pub const SUPPORTED_FORMATS: [ImageFormat; 3] =
    [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

/// Model input together with the size of the image it came from.
#[derive(Debug, Clone)]
pub struct NormalizedInput {
    /// NCHW, RGB channel order, shape `(1, 3, size, size)`.
    pub tensor: Array4<f32>,
    pub original_width: u32,
    pub original_height: u32,
}

/// Decode raw bytes into an RGB bitmap.
///
/// The container format is sniffed from the leading bytes; anything other than
/// JPEG, PNG or WebP is rejected before the decoder runs.
pub fn decode(bytes: &[u8]) -> Result<RawImage> {
    if bytes.is_empty() {
        return Err(SegError::decode("input is empty"));
    }

    let format = image::guess_format(bytes).map_err(|e| SegError::Decode {
        reason: "unrecognized image format".to_string(),
        source: Some(e),
    })?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(SegError::decode(format!(
            "unsupported image format: {format:?}"
        )));
    }

    let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        SegError::Decode {
            reason: format!("failed to decode {format:?} data"),
            source: Some(e),
        }
    })?;

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(SegError::decode(format!(
            "image has no pixels ({width}x{height})"
        )));
    }

    Ok(image.into_rgb8())
}

/// Resize to `size`x`size` (aspect ratio not kept) and apply per-channel
/// `(v / 255 - mean) / std`.
pub fn normalize(image: &RawImage, size: u32) -> NormalizedInput {
    let (original_width, original_height) = image.dimensions();
    let resized = imageops::resize(image, size, size, FilterType::Triangle);

    let mut tensor = resized
        .as_ndarray3()
        .slice_move(s![NewAxis, .., .., ..])
        .mapv(|v| f32::from(v) / 255.0);

    for (channel, (mean, std)) in MEAN.iter().zip(STD.iter()).enumerate() {
        tensor
            .slice_mut(s![0, channel, .., ..])
            .mapv_inplace(|v| (v - mean) / std);
    }

    NormalizedInput {
        tensor,
        original_width,
        original_height,
    }
}
