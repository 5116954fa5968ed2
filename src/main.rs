use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, ensure, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use voc_seg_rs::{
    fetch::parse_image_url, logger, Config, DirectorySegmenter, FailureReport, HttpFetcher,
    Provenance, SegmentationResult, SourceKind,
};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init();
    let config = Config::parse();

    ensure!(
        config.model_path.is_file(),
        "Model path does not exist: {}",
        config.model_path.display()
    );

    // Nothing is read or fetched until the model is usable.
    let pipeline = voc_seg_rs::pipeline_from_config(&config)
        .context("Failed to load the segmentation model")?;

    match config.source_kind() {
        SourceKind::Directory(input_dir) => {
            let segmenter =
                DirectorySegmenter::new(pipeline, input_dir, config.output_dir.clone());
            let summary =
                tokio::task::spawn_blocking(move || segmenter.process_directory(true)).await??;
            if summary.failed > 0 {
                warn!(
                    failed = summary.failed,
                    processed = summary.processed,
                    "some images could not be segmented"
                );
            }
            Ok(())
        }
        SourceKind::File(path) => {
            ensure!(path.is_file(), "Input file does not exist: {}", path.display());
            let bytes = fs::read(&path)
                .with_context(|| format!("Failed to read image: {}", path.display()))?;
            let provenance = Provenance::Upload {
                filename: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            };

            let worker = pipeline.clone();
            let outcome =
                tokio::task::spawn_blocking(move || worker.segment(&bytes, Some(provenance)))
                    .await?;
            write_outcome(&config.output_dir, &file_stem(&path), outcome)
        }
        SourceKind::Url(url) => {
            let fetcher = HttpFetcher::new(config.fetch_timeout(), config.max_fetch_bytes)?;
            let outcome = pipeline.segment_url(&fetcher, &url).await;
            write_outcome(&config.output_dir, &url_stem(&url), outcome)
        }
    }
}

fn write_outcome(
    output_dir: &Path,
    stem: &str,
    outcome: voc_seg_rs::Result<SegmentationResult>,
) -> Result<()> {
    match outcome {
        Ok(result) => {
            fs::create_dir_all(output_dir).with_context(|| {
                format!("Failed to create output directory: {}", output_dir.display())
            })?;
            let output_path = output_dir.join(format!("{stem}.json"));
            let file = fs::File::create(&output_path)
                .with_context(|| format!("Failed to create {}", output_path.display()))?;
            serde_json::to_writer_pretty(file, &result)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            info!(path = %output_path.display(), "segmentation result written");
            Ok(())
        }
        Err(err) => {
            let report = FailureReport::from(&err);
            if err.is_contract_violation() {
                error!(kind = %report.kind, reason = %report.reason, "unexpected pipeline failure");
            } else {
                warn!(kind = %report.kind, reason = %report.reason, "segmentation failed");
            }
            println!("{}", serde_json::to_string(&report)?);
            Err(anyhow!(err))
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

fn url_stem(url: &str) -> String {
    parse_image_url(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|last| !last.is_empty())
                .map(|last| file_stem(&PathBuf::from(last)))
        })
        .unwrap_or_else(|| "download".to_string())
}
