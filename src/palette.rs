//! PASCAL VOC class taxonomy and its display colors.

use image::Rgb;

use crate::errors::{Result, SegError};

/// Number of classes produced by the VOC model, background included.
pub const NUM_CLASSES: usize = 21;

/// Index of the background class.
pub const BACKGROUND: usize = 0;

pub const CLASS_LABELS: [&str; NUM_CLASSES] = [
    "background",
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "dining table",
    "dog",
    "horse",
    "motorbike",
    "person",
    "potted plant",
    "sheep",
    "sofa",
    "train",
    "tv/monitor",
];

/// Standard VOC color map. Background is black.
pub const PALETTE: [Rgb<u8>; NUM_CLASSES] = [
    Rgb([0, 0, 0]),
    Rgb([128, 0, 0]),
    Rgb([0, 128, 0]),
    Rgb([128, 128, 0]),
    Rgb([0, 0, 128]),
    Rgb([128, 0, 128]),
    Rgb([0, 128, 128]),
    Rgb([128, 128, 128]),
    Rgb([64, 0, 0]),
    Rgb([192, 0, 0]),
    Rgb([64, 128, 0]),
    Rgb([192, 128, 0]),
    Rgb([64, 0, 128]),
    Rgb([192, 0, 128]),
    Rgb([64, 128, 128]),
    Rgb([192, 128, 128]),
    Rgb([0, 64, 0]),
    Rgb([128, 64, 0]),
    Rgb([0, 192, 0]),
    Rgb([128, 192, 0]),
    Rgb([0, 64, 128]),
];

pub fn color_of(index: usize) -> Result<Rgb<u8>> {
    PALETTE
        .get(index)
        .copied()
        .ok_or(SegError::PaletteLookup { index })
}

pub fn label_of(index: usize) -> Option<&'static str> {
    CLASS_LABELS.get(index).copied()
}
