use askama::Template;
use axum::{
    Form, Router,
    extract::{Path, State},
    response::{Html, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    config::non_empty,
    downloader::Downloader,
    error::ApiError,
    response::file_response,
};

#[derive(Debug, Deserialize)]
struct SubmitForm {
    #[serde(default)]
    url: String,
}

/// What the page shows below the input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Idle,
    Warning(String),
    Success { file_name: String },
    Failure(String),
}

struct DownloadLink {
    name: String,
    href: String,
}

#[derive(Template)]
#[template(path = "form.html", escape = "html")]
struct FormPage<'a> {
    url: &'a str,
    warning: Option<String>,
    download: Option<DownloadLink>,
    error: Option<String>,
}

impl<'a> FormPage<'a> {
    fn new(url: &'a str, outcome: Outcome) -> Self {
        let mut page = Self {
            url,
            warning: None,
            download: None,
            error: None,
        };

        match outcome {
            Outcome::Idle => {}
            Outcome::Warning(message) => page.warning = Some(message),
            Outcome::Success { file_name } => {
                page.download = Some(DownloadLink {
                    href: format!("/files/{}", urlencoding::encode(&file_name)),
                    name: file_name,
                });
            }
            Outcome::Failure(message) => page.error = Some(message),
        }

        page
    }
}

/// Interactive front-end: one input, one button, a spinner while the
/// synchronous download runs, then a download link or the error text.
pub fn router(downloader: Downloader) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/files/{name}", get(serve_file))
        .with_state(downloader)
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Result<Html<String>, ApiError> {
    render_page("", Outcome::Idle)
}

async fn submit(
    State(downloader): State<Downloader>,
    Form(form): Form<SubmitForm>,
) -> Result<Html<String>, ApiError> {
    let Some(url) = non_empty(&form.url) else {
        return render_page("", Outcome::Warning("Please enter a URL.".to_string()));
    };

    let outcome = match downloader.download(url).await {
        Ok(file) => Outcome::Success {
            file_name: file.file_name,
        },
        Err(error) => Outcome::Failure(error.to_string()),
    };

    render_page(url, outcome)
}

async fn serve_file(
    State(downloader): State<Downloader>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let path = downloader
        .storage()
        .find(&name)
        .await
        .ok_or_else(|| ApiError::not_found("File not found."))?;

    info!("Serving stored file {:?}", path);
    file_response(&path, &name, "application/octet-stream").await
}

fn render_page(url: &str, outcome: Outcome) -> Result<Html<String>, ApiError> {
    FormPage::new(url, outcome).render().map(Html).map_err(|error| {
        warn!("Failed to render form page: {error}");
        ApiError::internal("Could not render the page.")
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode, header::CONTENT_TYPE},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::downloader::testing::{FakeExtractor, downloader};

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn submit_request(body: &str) -> Request<Body> {
        Request::post("/")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn index_renders_the_form() {
        let (_dir, downloader) = downloader(Arc::new(FakeExtractor::new(b""))).await;

        let response = router(downloader)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(r#"<input type="text" id="url" name="url" value="">"#));
        assert!(html.contains("Downloading..."));
    }

    #[tokio::test]
    async fn empty_submission_warns_without_downloading() {
        let extractor = Arc::new(FakeExtractor::new(b""));
        let (_dir, downloader) = downloader(extractor.clone()).await;

        let response = router(downloader)
            .oneshot(submit_request("url=+++"))
            .await
            .unwrap();

        let html = body_text(response).await;
        assert!(html.contains("Please enter a URL."));
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn successful_submission_links_the_stored_file() {
        let extractor = Arc::new(FakeExtractor::new(b"clip-bytes"));
        let (_dir, downloader) = downloader(extractor.clone()).await;
        let app = router(downloader);

        let response = app
            .clone()
            .oneshot(submit_request("url=https%3A%2F%2Fexample.com%2Fvideo123"))
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains("Download complete!"));
        assert_eq!(extractor.calls(), 1);

        let href_start = html.find(r#"href="/files/"#).unwrap() + r#"href=""#.len();
        let href_end = href_start + html[href_start..].find('"').unwrap();
        let href = &html[href_start..href_end];
        assert!(href.ends_with(".mp4"));

        let response = app
            .oneshot(Request::get(href).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/octet-stream");
        assert_eq!(body_text(response).await, "clip-bytes");
    }

    #[tokio::test]
    async fn failed_submission_shows_escaped_error() {
        let (_dir, downloader) = downloader(Arc::new(FakeExtractor::new(b""))).await;

        let response = router(downloader)
            .oneshot(submit_request("url=%3Cscript%3E"))
            .await
            .unwrap();

        let html = body_text(response).await;
        assert!(html.contains("Error: Download failed: ERROR: [generic] "));
        assert!(html.contains("&lt;script&gt;") || html.contains("&#60;script&#62;"));
        assert!(html.contains("is not a valid URL"));
        assert!(!html.contains("<script>"));
    }

    #[tokio::test]
    async fn unknown_files_are_not_found() {
        let (_dir, downloader) = downloader(Arc::new(FakeExtractor::new(b""))).await;

        let response = router(downloader)
            .oneshot(Request::get("/files/missing.mp4").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
