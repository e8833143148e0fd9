#![forbid(unsafe_code)]

//! The external download engine: metadata probes and the batched fetch.
//!
//! The pipeline only relies on the [`Downloader`] trait. [`YtDlp`] shells out
//! to `yt-dlp`, which handles retries, per-item failures, audio extraction
//! and metadata embedding on its own.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, info};

const FILENAME_TEMPLATE: &str = "%(title)s.%(ext)s";
const CHANNEL_DIR_TEMPLATE: &str = "%(channel)s";
const STDERR_TAIL_LINES: usize = 3;

/// The subset of a probe result the filters look at. Every field is
/// optional because the engine may return a partial payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Seconds; integer or fractional depending on the extractor.
    #[serde(default)]
    pub duration: Option<f64>,
}

pub trait Downloader {
    /// Reads a video's metadata without downloading anything.
    fn probe(&self, url: &str) -> Result<VideoMetadata>;

    /// Downloads every URL in one batch and returns the engine's exit code.
    /// Individual failures inside the batch do not make this an error.
    fn fetch(&self, urls: &[String]) -> Result<i32>;
}

/// Where and how the batched fetch writes files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub output_dir: PathBuf,
    /// Nest files under a directory named after the uploading channel.
    pub group_by_channel: bool,
    /// Appended verbatim before the URLs.
    pub extra_args: Vec<String>,
}

impl DownloadOptions {
    pub fn output_template(&self) -> PathBuf {
        if self.group_by_channel {
            self.output_dir
                .join(CHANNEL_DIR_TEMPLATE)
                .join(FILENAME_TEMPLATE)
        } else {
            self.output_dir.join(FILENAME_TEMPLATE)
        }
    }
}

/// `yt-dlp` driven through its command line.
pub struct YtDlp {
    program: PathBuf,
    options: DownloadOptions,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>, options: DownloadOptions) -> Self {
        Self {
            program: program.into(),
            options,
        }
    }

    /// Runs `<program> --version` to fail loudly when the engine is missing.
    pub fn ensure_available(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(_) => bail!(
                "{} is installed but returned a failure status",
                self.program.display()
            ),
            Err(err) => bail!(
                "{} is not installed or not in PATH: {}",
                self.program.display(),
                err
            ),
        }
    }

    /// Arguments for the batched download, without the URLs.
    fn fetch_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--format",
            "bestaudio/best",
            "--extract-audio",
            "--audio-quality",
            "0",
            "--embed-metadata",
            "--embed-chapters",
            "--write-thumbnail",
            "--embed-thumbnail",
            "--retries",
            "10",
            "--fragment-retries",
            "10",
            "--no-overwrites",
            "--no-mtime",
            "--mark-watched",
            "--no-check-certificates",
            "--ignore-errors",
            "--no-progress",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();

        args.push("--output".to_owned());
        args.push(self.options.output_template().to_string_lossy().into_owned());
        args.extend(self.options.extra_args.iter().cloned());
        args
    }
}

impl Downloader for YtDlp {
    fn probe(&self, url: &str) -> Result<VideoMetadata> {
        let output = Command::new(&self.program)
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg(url)
            .output()
            .with_context(|| format!("probing {url}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "metadata probe failed for {url} (status {}): {}",
                output.status,
                stderr_tail(&stderr)
            );
        }

        let raw_json =
            String::from_utf8(output.stdout).context("parsing probe output as UTF-8")?;
        serde_json::from_str(&raw_json).with_context(|| format!("deserializing metadata for {url}"))
    }

    fn fetch(&self, urls: &[String]) -> Result<i32> {
        let args = self.fetch_args();
        debug!(program = %self.program.display(), ?args, "starting batched download");
        info!(
            "Downloading {} video(s) into {}",
            urls.len(),
            self.options.output_dir.display()
        );

        let status = Command::new(&self.program)
            .args(&args)
            .args(urls)
            .status()
            .with_context(|| format!("running {}", self.program.display()))?;

        Ok(status.code().unwrap_or(-1))
    }
}

/// The last few non-blank lines of an engine's stderr, joined on one line.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    match lines.len().checked_sub(STDERR_TAIL_LINES) {
        Some(skip) => lines[skip..].join(" | "),
        None if lines.is_empty() => "no error output".to_owned(),
        None => lines.join(" | "),
    }
}
