use crate::errors::{Result, SegError};
use crate::normalizer::INPUT_SIZE;
use crate::palette::NUM_CLASSES;
use crate::traits::{check_input_shape, SegmentationModel};
use ndarray::prelude::*;

/// How the mock scores each pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// All scores zero, so every pixel resolves to background.
    Background,
    /// `class` scores the normalized red value, everything else zero: pixels
    /// redder than the ImageNet mean become `class`.
    RedThreshold { class: usize },
    /// Every pixel goes to `class`, even if the palette has no color for it.
    Constant { class: usize },
}

/// Segmentation model stand-in that needs no ONNX Runtime.
#[derive(Debug, Clone)]
pub struct MockSegmentationModel {
    pub image_size: u32,
    pub num_classes: usize,
    pub behavior: MockBehavior,
}

impl MockSegmentationModel {
    pub const fn new(behavior: MockBehavior) -> Self {
        Self {
            image_size: INPUT_SIZE,
            num_classes: NUM_CLASSES,
            behavior,
        }
    }

    pub const fn with_image_size(mut self, image_size: u32) -> Self {
        self.image_size = image_size;
        self
    }

    pub const fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn infer(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        check_input_shape(&tensor, self.image_size)?;
        if let MockBehavior::RedThreshold { class } | MockBehavior::Constant { class } =
            self.behavior
        {
            if class >= self.num_classes {
                return Err(SegError::shape(
                    format!("class index below {}", self.num_classes),
                    format!("class index {class}"),
                ));
            }
        }

        let size = self.image_size as usize;
        let mut scores = Array4::<f32>::zeros((1, self.num_classes, size, size));
        match self.behavior {
            MockBehavior::Background => {}
            MockBehavior::RedThreshold { class } => {
                scores
                    .slice_mut(s![0, class, .., ..])
                    .assign(&tensor.slice(s![0, 0, .., ..]));
            }
            MockBehavior::Constant { class } => {
                scores.slice_mut(s![0, class, .., ..]).fill(1.0);
            }
        }
        Ok(scores)
    }
}

/// Mock that labels everything background at the VOC input size.
pub const fn create_mock_model() -> MockSegmentationModel {
    MockSegmentationModel::new(MockBehavior::Background)
}
