use image::{Rgb, RgbImage};
use imageproc::map::map_colors2;
use num_traits::clamp;

use crate::errors::{Result, SegError};

/// Fraction of the color mask visible in the overlay; the source keeps the rest.
pub const BLEND_WEIGHT: f32 = 0.4;

/// Composite `mask` over `image`: `round(weight * mask + (1 - weight) * image)`
/// per channel.
pub fn blend(image: &RgbImage, mask: &RgbImage, weight: f32) -> Result<RgbImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(SegError::DimensionMismatch {
            expected: image.dimensions(),
            actual: mask.dimensions(),
        });
    }
    if !(0.0..=1.0).contains(&weight) {
        return Err(SegError::Configuration {
            message: format!("blend weight must be within [0, 1], got {weight}"),
        });
    }

    Ok(map_colors2(image, mask, |Rgb(source), Rgb(color)| {
        Rgb(std::array::from_fn(|c| mix(source[c], color[c], weight)))
    }))
}

fn mix(source: u8, color: u8, weight: f32) -> u8 {
    let value = weight * f32::from(color) + (1.0 - weight) * f32::from(source);
    clamp(value.round(), 0.0, 255.0) as u8
}
