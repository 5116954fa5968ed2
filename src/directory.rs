use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::errors::{Result, SegError};
use crate::normalizer;
use crate::pipeline::SegmentationPipeline;
use crate::traits::SegmentationModel;

/// Outcome of a directory run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Segments every supported image under `input_dir` and writes the overlays
/// as PNG files into `output_dir`, mirroring the input tree.
pub struct DirectorySegmenter<M: SegmentationModel> {
    pipeline: SegmentationPipeline<M>,
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl<M: SegmentationModel> DirectorySegmenter<M> {
    pub fn new(pipeline: SegmentationPipeline<M>, input_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            pipeline,
            input_dir,
            output_dir,
        }
    }

    /// One failing file does not stop the run; it is logged and counted.
    pub fn process_directory(&self, show_progress: bool) -> Result<BatchSummary> {
        if !self.input_dir.is_dir() {
            return Err(SegError::FileSystem {
                path: self.input_dir.clone(),
                operation: "input directory check".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "input directory does not exist",
                ),
            });
        }

        fs::create_dir_all(&self.output_dir).map_err(|e| SegError::FileSystem {
            path: self.output_dir.clone(),
            operation: "output directory creation".to_string(),
            source: e,
        })?;

        let image_files = self.collect_image_files();
        if image_files.is_empty() {
            info!(input_dir = %self.input_dir.display(), "no images to segment");
            return Ok(BatchSummary::default());
        }

        let pb = if show_progress {
            ProgressBar::new(image_files.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .map_err(|e| SegError::Configuration {
                message: format!("invalid progress template: {e}"),
            })?
            .progress_chars("#>-"),
        );

        let failed = AtomicUsize::new(0);
        image_files.par_iter().for_each(|input_file| {
            if let Err(e) = self.process_single_image(input_file) {
                warn!(file = %input_file.display(), error = %e, "skipping image");
                failed.fetch_add(1, Ordering::Relaxed);
            }
            pb.inc(1);
        });
        pb.finish_and_clear();

        let failed = failed.into_inner();
        let summary = BatchSummary {
            processed: image_files.len() - failed,
            failed,
        };
        info!(
            processed = summary.processed,
            failed = summary.failed,
            "directory segmentation finished"
        );
        Ok(summary)
    }

    fn collect_image_files(&self) -> Vec<PathBuf> {
        let mut image_files: Vec<_> = WalkDir::new(&self.input_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_supported_image_format(e.path()))
            .map(|e| e.into_path())
            .collect();
        image_files.sort();
        image_files
    }

    fn process_single_image(&self, input_file: &Path) -> Result<()> {
        let bytes = fs::read(input_file).map_err(|e| SegError::FileSystem {
            path: input_file.to_path_buf(),
            operation: "image read".to_string(),
            source: e,
        })?;
        let raw = normalizer::decode(&bytes)?;
        let output = self.pipeline.run(&raw)?;

        let output_file = self.output_path(input_file)?;
        if let Some(parent) = output_file.parent() {
            fs::create_dir_all(parent).map_err(|e| SegError::FileSystem {
                path: parent.to_path_buf(),
                operation: "output directory creation".to_string(),
                source: e,
            })?;
        }

        output
            .blended
            .save_with_format(&output_file, ImageFormat::Png)
            .map_err(|e| SegError::Encode {
                reason: format!("failed to write {}", output_file.display()),
                source: Some(e),
            })
    }

    pub fn output_path(&self, input_file: &Path) -> Result<PathBuf> {
        input_file
            .strip_prefix(&self.input_dir)
            .map(|relative| self.output_dir.join(relative).with_extension("png"))
            .map_err(|_| SegError::FileSystem {
                path: input_file.to_path_buf(),
                operation: "relative path resolution".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "file is not inside the input directory",
                ),
            })
    }
}

pub fn is_supported_image_format(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png" | "webp"))
        .unwrap_or(false)
}
