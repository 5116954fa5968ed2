use std::path::Path;
use std::time::Instant;

use crate::{
    errors::{Result, SegError},
    normalizer::INPUT_SIZE,
    palette::NUM_CLASSES,
    traits::{check_input_shape, SegmentationModel},
};
use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// DeepLabV3 network loaded into ONNX Runtime.
///
/// Loaded once and shared behind an `Arc`. `Session::run` needs exclusive
/// access, so forward passes are serialized through the mutex.
pub struct Model {
    image_size: u32,
    num_classes: usize,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

fn load_failed<E: std::fmt::Display>(operation: impl Into<String>) -> impl FnOnce(E) -> SegError {
    let operation = operation.into();
    move |e| SegError::model_load(operation, e.to_string())
}

impl Model {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        if !model_path.is_file() {
            return Err(SegError::model_load(
                format!("model file lookup: {}", model_path.display()),
                std::io::Error::new(std::io::ErrorKind::NotFound, "model file does not exist"),
            ));
        }

        let started = Instant::now();
        let mut session = SessionBuilder::new()
            .map_err(load_failed("session builder initialization"))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(load_failed("execution provider registration"))?
            .with_memory_pattern(true)
            .map_err(load_failed("memory pattern setup"))?
            .commit_from_file(model_path)
            .map_err(load_failed(format!(
                "model file load: {}",
                model_path.display()
            )))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| SegError::model_load("model input lookup", "model has no inputs"))?;
        let input_name = input.name.clone();
        let input_shape = input
            .input_type
            .tensor_shape()
            .map(|shape| shape.to_vec())
            .ok_or_else(|| SegError::model_load("model input lookup", "input is not a tensor"))?;
        let image_size = image_size_from_shape(&input_shape)?;

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| SegError::model_load("model output lookup", "model has no outputs"))?;

        // warm-up pass; also tells us the class count when the output shape is dynamic
        let data = Array4::<f32>::zeros((1, 3, image_size as usize, image_size as usize));
        let num_classes = {
            let outputs = session
                .run(ort::inputs![
                    input_name.as_str() => TensorRef::from_array_view(&data)
                        .map_err(load_failed("warm-up tensor creation"))?
                ])
                .map_err(load_failed("warm-up inference"))?;
            let scores = outputs[output_name.as_str()]
                .try_extract_array::<f32>()
                .map_err(load_failed("warm-up output extraction"))?;
            if scores.ndim() != 4 || scores.shape()[0] != 1 {
                return Err(SegError::model_load(
                    "warm-up output check",
                    format!("expected (1, classes, h, w) scores, got {:?}", scores.shape()),
                ));
            }
            scores.shape()[1]
        };

        info!(
            path = %model_path.display(),
            image_size,
            num_classes,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "segmentation model loaded"
        );
        if num_classes != NUM_CLASSES {
            debug!(num_classes, "model class count differs from the VOC palette");
        }

        Ok(Self {
            image_size,
            num_classes,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }
}

/// Square input side from an NCHW input shape; dynamic spatial dims fall back
/// to the DeepLabV3 default.
fn image_size_from_shape(shape: &[i64]) -> Result<u32> {
    let invalid = || {
        SegError::model_load(
            "model input shape check",
            format!("expected (1, 3, size, size) input, got {shape:?}"),
        )
    };

    let [batch, channels, height, width] = shape else {
        return Err(invalid());
    };
    if !matches!(*batch, 1 | -1) || !matches!(*channels, 3 | -1) {
        return Err(invalid());
    }
    match (*height, *width) {
        (-1, -1) => Ok(INPUT_SIZE),
        (h, w) if h == w && h > 0 => u32::try_from(h).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

impl SegmentationModel for Model {
    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn infer(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        check_input_shape(&tensor, self.image_size)?;

        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_model_is_a_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = Model::new(&temp_dir.path().join("deeplabv3.onnx"), 0)
            .err()
            .unwrap();

        assert!(err.is_fatal());
        assert_eq!(err.kind(), "ModelLoadError");
    }

    #[test]
    fn test_directory_is_not_a_model() {
        let temp_dir = TempDir::new().unwrap();
        let err = Model::new(temp_dir.path(), 0).err().unwrap();
        assert!(matches!(err, SegError::ModelLoad { .. }));
    }

    #[test]
    fn test_corrupt_model_is_a_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let model_path = temp_dir.path().join("model.onnx");
        std::fs::write(&model_path, b"definitely not an onnx graph").unwrap();

        let err = Model::new(&model_path, 0).err().unwrap();
        assert!(matches!(err, SegError::ModelLoad { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_image_size_from_shape() {
        assert_eq!(image_size_from_shape(&[1, 3, 520, 520]).unwrap(), 520);
        assert_eq!(image_size_from_shape(&[-1, 3, -1, -1]).unwrap(), INPUT_SIZE);
        assert!(image_size_from_shape(&[1, 3, 520, 480]).is_err());
        assert!(image_size_from_shape(&[1, 1, 520, 520]).is_err());
        assert!(image_size_from_shape(&[3, 520, 520]).is_err());
    }
}
