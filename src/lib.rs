pub mod config;
pub mod directory;
pub mod encoder;
pub mod errors;
pub mod fetch;
pub mod logger;
pub mod mask;
pub mod model;
pub mod normalizer;
pub mod overlay;
pub mod palette;
pub mod pipeline;
pub mod traits;

pub mod mocks;

pub use config::{Config, SourceKind};
pub use directory::{BatchSummary, DirectorySegmenter};
pub use errors::{FailureReport, Result, SegError};
pub use fetch::{FetchedImage, HttpFetcher, ImageSource};
pub use model::Model;
pub use pipeline::{
    DetectedClass, ProcessingInfo, Provenance, SegmentationOutput, SegmentationPipeline,
    SegmentationResult, Stage, StageTiming,
};
pub use traits::*;

/// Load the ONNX model and wrap it in a ready pipeline.
///
/// Fails with `SegError::ModelLoad` when the model cannot be used; callers
/// should stop rather than serve without it.
pub fn pipeline_from_config(config: &Config) -> Result<SegmentationPipeline<Model>> {
    let model = Model::new(&config.model_path, config.device_id)?;
    Ok(SegmentationPipeline::new(std::sync::Arc::new(model)))
}
