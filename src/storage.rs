use std::{
    ffi::OsStr,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DownloadError;

/// Directory where every downloaded file accumulates. Created once at startup,
/// never cleaned up and never bounded.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn init(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        info!("Storage directory ready at {:?}", self.dir);
        Ok(())
    }

    /// `%` is a field marker for yt-dlp, so the directory part is escaped.
    pub fn output_template(&self, id: Uuid) -> String {
        let dir = self.dir.to_string_lossy().replace('%', "%%");
        format!("{dir}/{id}.%(ext)s")
    }

    /// Finds the file produced for `id`, preferring the path the extractor
    /// printed and falling back to a directory scan for `<id>.*`.
    pub async fn resolve_downloaded(
        &self,
        id: Uuid,
        printed_path: Option<&str>,
    ) -> Result<PathBuf, DownloadError> {
        let canonical_dir = self.canonical_dir().await?;
        let stem = id.to_string();

        if let Some(path_value) = printed_path {
            let path = PathBuf::from(path_value);
            for candidate in [path.clone(), self.dir.join(&path)] {
                if let Some(valid_path) = resolve_candidate(&canonical_dir, &candidate).await?
                    && file_stem_matches(&valid_path, &stem)
                {
                    return Ok(valid_path);
                }
            }
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|error| {
            DownloadError::new(format!("Could not open the storage directory: {error}"))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|error| {
            DownloadError::new(format!("Could not read the storage directory: {error}"))
        })? {
            let path = entry.path();
            if !file_stem_matches(&path, &stem) {
                continue;
            }
            if let Some(valid_path) = resolve_candidate(&canonical_dir, &path).await? {
                return Ok(valid_path);
            }
        }

        Err(DownloadError::new(
            "The extractor reported success but no downloaded file was found.",
        ))
    }

    /// Looks up a stored file by bare name. Anything that is not a regular file
    /// directly inside the storage directory yields `None`.
    pub async fn find(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty()
            || name.contains(['/', '\\'])
            || matches!(name, "." | "..")
            || Path::new(name).file_name() != Some(OsStr::new(name))
        {
            warn!("Rejected stored file lookup for {name:?}");
            return None;
        }

        let canonical_dir = self.canonical_dir().await.ok()?;
        let candidate = resolve_candidate(&canonical_dir, &self.dir.join(name))
            .await
            .ok()
            .flatten()?;

        if candidate.parent() == Some(canonical_dir.as_path()) {
            Some(candidate)
        } else {
            None
        }
    }

    /// Removes whatever a failed download left behind for `id`.
    pub async fn discard_partial(&self, id: Uuid) {
        let prefix = id.to_string();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) => {
                warn!("Could not scan storage directory for leftovers: {error}");
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    warn!("Could not scan storage directory for leftovers: {error}");
                    break;
                }
            };

            let starts_with_id = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix));
            if !starts_with_id {
                continue;
            }

            let path = entry.path();
            if let Err(error) = tokio::fs::remove_file(&path).await
                && error.kind() != ErrorKind::NotFound
            {
                warn!("Could not remove partial download {:?}: {error}", path);
            }
        }
    }

    async fn canonical_dir(&self) -> Result<PathBuf, DownloadError> {
        tokio::fs::canonicalize(&self.dir).await.map_err(|error| {
            DownloadError::new(format!("Could not resolve the storage directory: {error}"))
        })
    }
}

fn file_stem_matches(path: &Path, stem: &str) -> bool {
    path.file_stem().and_then(OsStr::to_str) == Some(stem)
}

async fn resolve_candidate(
    canonical_dir: &Path,
    candidate_path: &Path,
) -> Result<Option<PathBuf>, DownloadError> {
    let metadata = match tokio::fs::metadata(candidate_path).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(DownloadError::new(format!(
                "Could not read downloaded file metadata: {error}"
            )));
        }
    };

    if !metadata.is_file() {
        return Ok(None);
    }

    let canonical_candidate = tokio::fs::canonicalize(candidate_path)
        .await
        .map_err(|error| {
            DownloadError::new(format!("Could not resolve downloaded file path: {error}"))
        })?;

    if !canonical_candidate.starts_with(canonical_dir) {
        warn!(
            "Ignored a file outside the storage directory: {:?}",
            canonical_candidate
        );
        return Ok(None);
    }

    Ok(Some(canonical_candidate))
}
