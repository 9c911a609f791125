use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderName, Method, header::CONTENT_DISPOSITION},
    response::Response,
    routing::get,
};
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::non_empty,
    downloader::Downloader,
    error::ApiError,
    response::{DOWNLOAD_FILENAME_HEADER, content_type_for_filename, file_response},
};

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    url: Option<String>,
}

pub fn router(downloader: Downloader) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .expose_headers([
            CONTENT_DISPOSITION,
            HeaderName::from_static(DOWNLOAD_FILENAME_HEADER),
        ]);

    Router::new()
        .route("/health", get(health))
        .route("/download", get(download))
        .with_state(downloader)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn download(
    State(downloader): State<Downloader>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let url = query
        .url
        .as_deref()
        .and_then(non_empty)
        .ok_or_else(|| ApiError::bad_request("Missing url query parameter."))?;

    let file = downloader.download(url).await?;
    file_response(
        &file.path,
        &file.file_name,
        content_type_for_filename(&file.file_name),
    )
    .await
}
