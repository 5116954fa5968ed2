use crate::errors::{Result, SegError};
use ndarray::prelude::*;

/// Semantic segmentation network seen from the pipeline.
///
/// Implementations must be usable from several threads at once; if the
/// underlying runtime needs exclusive access for a forward pass the
/// implementation serializes calls itself.
pub trait SegmentationModel: Send + Sync {
    /// Side length of the square input the network expects.
    fn input_size(&self) -> u32;

    /// Number of score channels in the output, background included.
    fn num_classes(&self) -> usize;

    /// Forward pass: `(1, 3, size, size)` normalized input to
    /// `(1, classes, h, w)` raw class scores.
    fn infer(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;
}

/// Rejects tensors that do not have the `(1, 3, size, size)` layout.
pub fn check_input_shape(tensor: &ArrayView4<f32>, input_size: u32) -> Result<()> {
    let size = input_size as usize;
    let expected = [1, 3, size, size];
    if tensor.shape() != expected {
        return Err(SegError::shape(
            format!("{expected:?}"),
            format!("{:?}", tensor.shape()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_input_shape() {
        let ok = Array4::<f32>::zeros((1, 3, 520, 520));
        assert!(check_input_shape(&ok.view(), 520).is_ok());

        let batched = Array4::<f32>::zeros((2, 3, 520, 520));
        assert!(matches!(
            check_input_shape(&batched.view(), 520),
            Err(SegError::Shape { .. })
        ));

        let small = Array4::<f32>::zeros((1, 3, 256, 256));
        assert!(check_input_shape(&small.view(), 520).is_err());
    }
}
