use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FETCH_BYTES};

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Image file, directory of images, or http(s) URL
    pub source: String,

    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(short, long)]
    pub model_path: PathBuf,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT.as_secs(), value_parser = check_timeout)]
    pub fetch_timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_FETCH_BYTES)]
    pub max_fetch_bytes: usize,
}

/// What kind of input `Config::source` names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Url(String),
    File(PathBuf),
    Directory(PathBuf),
}

impl Config {
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn source_kind(&self) -> SourceKind {
        classify_source(&self.source)
    }
}

pub fn classify_source(source: &str) -> SourceKind {
    let lowered = source.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        return SourceKind::Url(source.to_string());
    }

    let path = Path::new(source);
    if path.is_dir() {
        SourceKind::Directory(path.to_path_buf())
    } else {
        SourceKind::File(path.to_path_buf())
    }
}

fn check_timeout(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("`{s}` is not a whole number of seconds"))?;
    if secs == 0 {
        return Err("fetch timeout must be at least one second".to_string());
    }
    Ok(secs)
}
