//! End-to-end segmentation of a single image.
//!
//! `segment` walks the stages in order
//! (`Ingested → Normalized → Inferred → Masked → Blended → Encoded → Done`);
//! each stage only consumes the previous stage's output. The first failing
//! stage aborts the request with its own error: there are no retries and no
//! partial results.

use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::encoder::encode_png;
use crate::errors::Result;
use crate::fetch::ImageSource;
use crate::mask::{self, ClassIndexMap};
use crate::normalizer::{self, RawImage};
use crate::overlay::{self, BLEND_WEIGHT};
use crate::palette;
use crate::traits::SegmentationModel;

/// Where the image came from. Carried into the result for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Upload { filename: String },
    Url { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingested,
    Normalized,
    Inferred,
    Masked,
    Blended,
    Encoded,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedClass {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    pub width: u32,
    pub height: u32,
    pub input_bytes: usize,
    /// Content type the server declared; only set for URL requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub detected_classes: Vec<DetectedClass>,
    pub timings: Vec<StageTiming>,
}

/// Encoded original and overlay images, ready to hand to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResult {
    /// Base64 PNG of the decoded source image.
    pub original_image: String,
    /// Base64 PNG of the source with the class colors blended on top.
    pub segmented_image: String,
    pub provenance: Option<Provenance>,
    pub processing_info: ProcessingInfo,
}

/// Intermediate images of one run, before encoding.
#[derive(Debug, Clone)]
pub struct SegmentationOutput {
    /// At model resolution.
    pub class_map: ClassIndexMap,
    /// At source resolution.
    pub color_mask: RgbImage,
    /// At source resolution.
    pub blended: RgbImage,
}

struct StageClock {
    last: Instant,
    timings: Vec<StageTiming>,
}

impl StageClock {
    fn start() -> Self {
        Self {
            last: Instant::now(),
            timings: Vec::with_capacity(7),
        }
    }

    fn mark(&mut self, stage: Stage) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last).as_secs_f64() * 1000.0;
        self.last = now;
        debug!(?stage, elapsed_ms, "stage finished");
        self.timings.push(StageTiming { stage, elapsed_ms });
    }

    fn total_ms(&self) -> f64 {
        self.timings.iter().map(|t| t.elapsed_ms).sum()
    }
}

/// Shared, cheaply clonable segmentation service.
///
/// The model is loaded by the caller and handed in; the pipeline never loads
/// or swaps it.
pub struct SegmentationPipeline<M: SegmentationModel> {
    model: Arc<M>,
    blend_weight: f32,
}

impl<M: SegmentationModel> Clone for SegmentationPipeline<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            blend_weight: self.blend_weight,
        }
    }
}

impl<M: SegmentationModel> SegmentationPipeline<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            blend_weight: BLEND_WEIGHT,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub const fn blend_weight(&self) -> f32 {
        self.blend_weight
    }

    #[cfg(test)]
    pub(crate) const fn with_blend_weight(mut self, blend_weight: f32) -> Self {
        self.blend_weight = blend_weight;
        self
    }

    /// Segment encoded image bytes.
    pub fn segment(
        &self,
        bytes: &[u8],
        provenance: Option<Provenance>,
    ) -> Result<SegmentationResult> {
        let mut clock = StageClock::start();

        let raw = normalizer::decode(bytes)?;
        clock.mark(Stage::Ingested);
        let (width, height) = raw.dimensions();

        let output = self.run_stages(&raw, &mut clock)?;

        let original_image = encode_png(&raw)?;
        let segmented_image = encode_png(&output.blended)?;
        clock.mark(Stage::Encoded);

        let detected_classes = mask::detected_classes(&output.class_map)
            .into_iter()
            .map(|index| DetectedClass {
                index,
                label: palette::label_of(index).unwrap_or("unknown").to_string(),
            })
            .collect::<Vec<_>>();
        clock.mark(Stage::Done);

        info!(
            width,
            height,
            classes = ?detected_classes.iter().map(|c| c.label.as_str()).collect::<Vec<_>>(),
            total_ms = clock.total_ms(),
            "segmentation completed"
        );

        Ok(SegmentationResult {
            original_image,
            segmented_image,
            provenance,
            processing_info: ProcessingInfo {
                width,
                height,
                input_bytes: bytes.len(),
                content_type: None,
                detected_classes,
                timings: clock.timings,
            },
        })
    }

    /// Segment an already decoded image without encoding the output.
    pub fn run(&self, raw: &RawImage) -> Result<SegmentationOutput> {
        self.run_stages(raw, &mut StageClock::start())
    }

    fn run_stages(&self, raw: &RawImage, clock: &mut StageClock) -> Result<SegmentationOutput> {
        let input = normalizer::normalize(raw, self.model.input_size());
        clock.mark(Stage::Normalized);

        let scores = self.model.infer(input.tensor.view())?;
        clock.mark(Stage::Inferred);

        let (class_map, color_mask) =
            mask::build_mask(scores.view(), input.original_width, input.original_height)?;
        clock.mark(Stage::Masked);

        let blended = overlay::blend(raw, &color_mask, self.blend_weight)?;
        clock.mark(Stage::Blended);

        Ok(SegmentationOutput {
            class_map,
            color_mask,
            blended,
        })
    }
}

impl<M: SegmentationModel + 'static> SegmentationPipeline<M> {
    /// Fetch `url` through `source` and segment the bytes on the blocking pool.
    pub async fn segment_url<S>(&self, source: &S, url: &str) -> Result<SegmentationResult>
    where
        S: ImageSource + ?Sized,
    {
        let fetched = source.fetch(url).await?;
        let pipeline = self.clone();
        let provenance = Some(Provenance::Url {
            url: url.to_string(),
        });
        let bytes = fetched.bytes;
        let mut result =
            tokio::task::spawn_blocking(move || pipeline.segment(&bytes, provenance)).await??;
        result.processing_info.content_type = Some(fetched.content_type);
        Ok(result)
    }
}
