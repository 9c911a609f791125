use std::{io::ErrorKind, process::Output, time::Duration};

use async_trait::async_trait;
use tokio::{process::Command, time::timeout};
use tracing::debug;

use crate::{config::Settings, error::DownloadError};

/// Options handed to the extractor for a single download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Output path with a `%(ext)s` placeholder the extractor fills in.
    pub output_template: String,
    pub format: String,
}

/// External media extraction. Given a URL it writes the media to the output
/// template and reports where the file ended up, if it knows.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<Option<String>, DownloadError>;
}

/// Runs the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: String,
    timeout: Option<Duration>,
}

impl YtDlp {
    pub fn new(bin: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.yt_dlp_bin.clone(), settings.yt_dlp_timeout)
    }

    async fn run(&self, args: Vec<String>) -> Result<Output, DownloadError> {
        debug!("Running {} {:?}", self.bin, args);

        let command_future = Command::new(&self.bin).args(args).kill_on_drop(true).output();
        let result = match self.timeout {
            Some(limit) => timeout(limit, command_future).await.map_err(|_| {
                DownloadError::new(format!(
                    "{} did not finish within {} seconds",
                    self.bin,
                    limit.as_secs()
                ))
            })?,
            None => command_future.await,
        };

        let output = result.map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                DownloadError::new(format!(
                    "{} is not installed or not on PATH. Install yt-dlp and restart.",
                    self.bin
                ))
            } else {
                DownloadError::new(format!("Could not run {}: {error}", self.bin))
            }
        })?;

        if !output.status.success() {
            return Err(DownloadError::new(run_error_message(&output.stderr)));
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<Option<String>, DownloadError> {
        let args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "-o".to_string(),
            options.output_template.clone(),
            "-f".to_string(),
            options.format.clone(),
            url.to_string(),
        ];

        let output = self.run(args).await?;
        Ok(extract_printed_path(&output.stdout))
    }
}

fn run_error_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp exited without an error message")
        .to_string()
}

fn extract_printed_path(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
}
