use std::{path::PathBuf, sync::Arc};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::{Settings, non_empty},
    error::DownloadError,
    extractor::{DownloadOptions, MediaExtractor, YtDlp},
    storage::Storage,
};

/// A finished download sitting in the storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

/// Turns a URL into a file on disk through the configured extractor.
#[derive(Clone)]
pub struct Downloader {
    storage: Storage,
    extractor: Arc<dyn MediaExtractor>,
    format: String,
}

impl Downloader {
    pub fn new(
        storage: Storage,
        extractor: Arc<dyn MediaExtractor>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            extractor,
            format: format.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Storage::new(settings.download_dir.clone()),
            Arc::new(YtDlp::from_settings(settings)),
            settings.format.clone(),
        )
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub async fn download(&self, url: &str) -> Result<DownloadedFile, DownloadError> {
        let url = non_empty(url).ok_or_else(|| DownloadError::new("URL is empty"))?;
        let id = Uuid::new_v4();
        let options = DownloadOptions {
            output_template: self.storage.output_template(id),
            format: self.format.clone(),
        };

        info!(
            "Downloading {url:?} as {id} with {} (format {})",
            self.extractor.name(),
            options.format
        );

        match self.fetch(url, id, &options).await {
            Ok(file) => {
                info!("Saved {:?} ({} bytes)", file.path, file.size);
                Ok(file)
            }
            Err(error) => {
                warn!("Download of {url:?} failed: {}", error.message());
                self.storage.discard_partial(id).await;
                Err(error)
            }
        }
    }

    async fn fetch(
        &self,
        url: &str,
        id: Uuid,
        options: &DownloadOptions,
    ) -> Result<DownloadedFile, DownloadError> {
        let printed_path = self.extractor.download(url, options).await?;
        let path = self
            .storage
            .resolve_downloaded(id, printed_path.as_deref())
            .await?;

        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|error| {
                DownloadError::new(format!("Could not read downloaded file metadata: {error}"))
            })?
            .len();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("{id}.bin"));

        Ok(DownloadedFile {
            path,
            file_name,
            size,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::{testing::*, *};

    async fn stored_files(downloader: &Downloader) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(downloader.storage().dir()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names
    }

    #[tokio::test]
    async fn successful_download_lands_in_storage_with_uuid_name() {
        let extractor = Arc::new(FakeExtractor::new(b"video-bytes"));
        let (_dir, downloader) = downloader(extractor).await;

        let file = downloader
            .download("  https://example.com/video123  ")
            .await
            .unwrap();

        assert_eq!(file.size, 11);
        assert!(file.path.is_file());
        let (stem, ext) = file.file_name.split_once('.').unwrap();
        assert!(Uuid::parse_str(stem).is_ok());
        assert_eq!(ext, "mp4");
        assert_eq!(tokio::fs::read(&file.path).await.unwrap(), b"video-bytes");
    }

    #[tokio::test]
    async fn same_url_twice_creates_two_files() {
        let extractor = Arc::new(FakeExtractor::new(b"clip"));
        let (_dir, downloader) = downloader(extractor).await;

        let first = downloader.download("https://example.com/video123").await.unwrap();
        let second = downloader.download("https://example.com/video123").await.unwrap();

        assert_ne!(first.file_name, second.file_name);
        assert_eq!(stored_files(&downloader).await.len(), 2);
    }

    #[tokio::test]
    async fn failing_url_reports_library_text_and_leaves_no_file() {
        let extractor = Arc::new(FakeExtractor {
            leave_partial: true,
            ..FakeExtractor::new(b"")
        });
        let (_dir, downloader) = downloader(extractor.clone()).await;

        let error = downloader.download("not a url").await.unwrap_err();

        assert!(error.to_string().starts_with("Download failed: "));
        assert!(error.message().contains("'not a url' is not a valid URL"));
        assert_eq!(extractor.calls(), 1);
        assert!(stored_files(&downloader).await.is_empty());
    }

    #[tokio::test]
    async fn empty_url_never_reaches_the_extractor() {
        let extractor = Arc::new(FakeExtractor::new(b""));
        let (_dir, downloader) = downloader(extractor.clone()).await;

        let error = downloader.download("   ").await.unwrap_err();

        assert_eq!(error.message(), "URL is empty");
        assert_eq!(extractor.calls(), 0);
    }
}
