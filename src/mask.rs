use std::collections::BTreeSet;

use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::prelude::*;

use crate::errors::{Result, SegError};
use crate::palette;

/// Winning class per pixel, shape `(height, width)`.
pub type ClassIndexMap = Array2<usize>;

/// Per-pixel arg-max over the class axis of a `(1, classes, h, w)` score map.
///
/// The scan keeps the first maximum, so ties and all-equal vectors resolve to
/// the lowest index. NaN scores never win.
pub fn argmax(scores: ArrayView4<f32>) -> Result<ClassIndexMap> {
    let (batch, classes, height, width) = scores.dim();
    if batch != 1 || classes == 0 || height == 0 || width == 0 {
        return Err(SegError::shape(
            "(1, classes >= 1, h >= 1, w >= 1) scores",
            format!("{:?}", scores.shape()),
        ));
    }

    Ok(scores
        .index_axis(Axis(0), 0)
        .map_axis(Axis(0), first_argmax))
}

fn first_argmax(scores: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (index, &score) in scores.iter().enumerate() {
        if score > best_score {
            best = index;
            best_score = score;
        }
    }
    best
}

/// Paint each class index with its palette color, at the map's resolution.
pub fn colorize(class_map: &ClassIndexMap) -> Result<RgbImage> {
    let (height, width) = class_map.dim();
    let mut pixels = Vec::with_capacity(height * width * 3);
    for &index in class_map.iter() {
        pixels.extend_from_slice(&palette::color_of(index)?.0);
    }

    RgbImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
        SegError::shape(
            format!("{} color bytes", height * width * 3),
            "a shorter buffer",
        )
    })
}

/// Arg-max, colorize, and scale the color mask to the target size.
///
/// Nearest-neighbor keeps every output pixel on the palette.
pub fn build_mask(
    scores: ArrayView4<f32>,
    target_width: u32,
    target_height: u32,
) -> Result<(ClassIndexMap, RgbImage)> {
    if target_width == 0 || target_height == 0 {
        return Err(SegError::shape(
            "non-empty target size",
            format!("{target_width}x{target_height}"),
        ));
    }

    let class_map = argmax(scores)?;
    let color_mask = colorize(&class_map)?;
    let color_mask = if color_mask.dimensions() == (target_width, target_height) {
        color_mask
    } else {
        imageops::resize(&color_mask, target_width, target_height, FilterType::Nearest)
    };

    Ok((class_map, color_mask))
}

/// Sorted distinct class indices present in the map.
pub fn detected_classes(class_map: &ClassIndexMap) -> Vec<usize> {
    class_map
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{NUM_CLASSES, PALETTE};
    use image::Rgb;

    fn scores_with_winner(height: usize, width: usize, winner: impl Fn(usize, usize) -> usize) -> Array4<f32> {
        Array4::from_shape_fn((1, NUM_CLASSES, height, width), |(_, c, y, x)| {
            if c == winner(y, x) {
                5.0
            } else {
                -1.0
            }
        })
    }

    #[test]
    fn test_all_zero_scores_are_background() {
        let scores = Array4::<f32>::zeros((1, NUM_CLASSES, 4, 6));
        let class_map = argmax(scores.view()).unwrap();

        assert_eq!(class_map.dim(), (4, 6));
        assert!(class_map.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_ties_pick_lowest_index() {
        let mut scores = Array4::<f32>::zeros((1, NUM_CLASSES, 1, 1));
        scores[[0, 7, 0, 0]] = 3.0;
        scores[[0, 12, 0, 0]] = 3.0;
        scores[[0, 20, 0, 0]] = 2.0;

        assert_eq!(argmax(scores.view()).unwrap()[[0, 0]], 7);
    }

    #[test]
    fn test_nan_never_wins() {
        let mut scores = Array4::<f32>::zeros((1, 3, 1, 2));
        scores[[0, 0, 0, 0]] = f32::NAN;
        scores[[0, 1, 0, 0]] = 1.0;
        scores.slice_mut(s![0, .., 0, 1]).fill(f32::NAN);

        let class_map = argmax(scores.view()).unwrap();
        assert_eq!(class_map[[0, 0]], 1);
        assert_eq!(class_map[[0, 1]], 0);
    }

    #[test]
    fn test_argmax_rejects_batches() {
        let scores = Array4::<f32>::zeros((2, NUM_CLASSES, 4, 4));
        assert!(matches!(
            argmax(scores.view()),
            Err(SegError::Shape { .. })
        ));
    }

    #[test]
    fn test_colorize_uses_palette() {
        let class_map = Array2::from_shape_vec((1, 3), vec![0, 15, 20]).unwrap();
        let mask = colorize(&class_map).unwrap();

        assert_eq!(mask.dimensions(), (3, 1));
        assert_eq!(mask.get_pixel(0, 0), &PALETTE[0]);
        assert_eq!(mask.get_pixel(1, 0), &Rgb([192, 128, 128]));
        assert_eq!(mask.get_pixel(2, 0), &PALETTE[20]);
    }

    #[test]
    fn test_colorize_out_of_palette_index() {
        let class_map = Array2::from_elem((2, 2), NUM_CLASSES + 3);
        let err = colorize(&class_map).unwrap_err();
        assert!(matches!(err, SegError::PaletteLookup { index: 24 }));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_build_mask_resizes_with_palette_colors_only() {
        // left half person, right half cat
        let scores = scores_with_winner(8, 8, |_, x| if x < 4 { 15 } else { 8 });
        let (class_map, mask) = build_mask(scores.view(), 37, 23).unwrap();

        assert_eq!(class_map.dim(), (8, 8));
        assert_eq!(mask.dimensions(), (37, 23));
        for pixel in mask.pixels() {
            assert!(
                *pixel == PALETTE[15] || *pixel == PALETTE[8],
                "off-palette pixel {pixel:?}"
            );
        }
        assert_eq!(mask.get_pixel(0, 0), &PALETTE[15]);
        assert_eq!(mask.get_pixel(36, 22), &PALETTE[8]);
    }

    #[test]
    fn test_build_mask_rejects_empty_target() {
        let scores = Array4::<f32>::zeros((1, NUM_CLASSES, 2, 2));
        assert!(build_mask(scores.view(), 0, 10).is_err());
    }

    #[test]
    fn test_detected_classes_sorted_unique() {
        let scores = scores_with_winner(3, 3, |y, x| [0, 15, 3][(x + y) % 3]);
        let class_map = argmax(scores.view()).unwrap();
        assert_eq!(detected_classes(&class_map), vec![0, 3, 15]);
    }
}
