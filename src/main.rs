mod api;
mod config;
mod downloader;
mod error;
mod extractor;
mod form;
mod response;
mod storage;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{config::Settings, downloader::Downloader, error::StartupError};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "universal_downloader=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run(Settings::from_env()).await {
        eprintln!("Server error: {error}");
        std::process::exit(1);
    }
}

/// Creates the storage directory and binds both addresses, then serves.
/// Returns only on failure.
async fn run(settings: Settings) -> Result<(), StartupError> {
    let downloader = Downloader::from_settings(&settings);
    downloader
        .storage()
        .init()
        .await
        .map_err(|source| StartupError::Storage {
            path: downloader.storage().dir().to_path_buf(),
            source,
        })?;

    let api_listener = if settings.enable_http_api {
        Some(bind(&settings.api_addr).await?)
    } else {
        info!("ENABLE_HTTP_API=false: serving the form only.");
        None
    };
    let form_listener = bind(&settings.form_addr).await?;

    serve(downloader, api_listener, form_listener).await
}

/// Runs the HTTP API (when given a listener) as a detached background task and
/// the form in the foreground. The two share only the downloader.
async fn serve(
    downloader: Downloader,
    api_listener: Option<TcpListener>,
    form_listener: TcpListener,
) -> Result<(), StartupError> {
    if let Some(listener) = api_listener {
        let addr = listener_addr(&listener);
        let app = api::router(downloader.clone());
        info!("HTTP API listening on http://{addr}");

        // Detached: the process exits with the foreground form server.
        tokio::spawn(async move {
            if let Err(source) = axum::serve(listener, app).await {
                error!("{}", StartupError::Serve { addr, source });
            }
        });
    }

    let addr = listener_addr(&form_listener);
    info!("Form listening on http://{addr}");

    axum::serve(form_listener, form::router(downloader))
        .await
        .map_err(|source| StartupError::Serve { addr, source })
}

async fn bind(addr: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.to_string(),
            source,
        })
}

fn listener_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown address".to_string())
}
