use std::{path::PathBuf, time::Duration};

use tracing::warn;

const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
const DEFAULT_API_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_FORM_PORT: u16 = 8501;
const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";
const DEFAULT_FORMAT: &str = "best";

/// Runtime configuration shared by both servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub download_dir: PathBuf,
    pub api_addr: String,
    pub form_addr: String,
    pub enable_http_api: bool,
    pub yt_dlp_bin: String,
    pub format: String,
    pub yt_dlp_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup so callers other than
    /// `from_env` never have to touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| {
            lookup(name).and_then(|value| non_empty(&value).map(ToString::to_string))
        };

        let form_addr = text("FORM_ADDR").unwrap_or_else(|| {
            let port = read_parsed::<u16, _>(&lookup, "PORT").unwrap_or(DEFAULT_FORM_PORT);
            format!("0.0.0.0:{port}")
        });

        Self {
            download_dir: text("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            api_addr: text("API_ADDR").unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            form_addr,
            enable_http_api: read_bool(&lookup, "ENABLE_HTTP_API").unwrap_or(true),
            yt_dlp_bin: text("YT_DLP_BIN").unwrap_or_else(|| DEFAULT_YT_DLP_BIN.to_string()),
            format: text("YT_DLP_FORMAT").unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
            yt_dlp_timeout: read_parsed::<u64, _>(&lookup, "YT_DLP_TIMEOUT_SECONDS")
                .filter(|seconds| *seconds > 0)
                .map(Duration::from_secs),
        }
    }
}

fn read_bool<F>(lookup: &F, name: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("Ignoring invalid boolean {name}={value:?}");
            None
        }
    }
}

fn read_parsed<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)?;
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring invalid value {name}={value:?}");
            None
        }
    }
}

pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
