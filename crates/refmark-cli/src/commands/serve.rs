//! Serve command - HTTP front end for the highlighting pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Args;
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use refmark_core::{InputDocument, Outcome, RefmarkConfig, RefmarkError};

use super::{build_pipeline, load_config, resolve_model_dir};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 10000)]
    port: u16,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<std::path::PathBuf>,

    /// Search PDF text layers only, never run OCR
    #[arg(long)]
    text_only: bool,
}

/// Shared, read-only settings; every request builds its own pipeline.
#[derive(Clone)]
pub struct AppState {
    config: Arc<RefmarkConfig>,
    text_only: bool,
}

impl AppState {
    pub fn new(config: RefmarkConfig, text_only: bool) -> Self {
        Self {
            config: Arc::new(config),
            text_only,
        }
    }
}

/// Failure answers of the HTTP surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("processing failed: {0}")]
    Internal(String),
}

impl From<RefmarkError> for ApiError {
    fn from(e: RefmarkError) -> Self {
        match e {
            RefmarkError::Input(e) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "error"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not-found"),
            ApiError::Internal(e) => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "error")
            }
        };

        let body = Json(json!({
            "status": label,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    resolve_model_dir(&mut config, args.model_dir.clone());

    let app = router(AppState::new(config, args.text_only));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Listening on http://{}", addr);
    println!("refmark listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        .route("/highlight", post(highlight))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "refmark is running"
}

/// Fields of a highlight upload.
#[derive(Debug, Default)]
struct Upload {
    filename: Option<String>,
    data: Option<Vec<u8>>,
    marker: Option<String>,
    charset: Option<String>,
    terminator: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        debug!("Received field '{}'", name);

        match name.as_str() {
            "file" => {
                upload.filename = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read file: {}", e)))?;
                upload.data = Some(data.to_vec());
            }
            "marker" | "charset" | "terminator" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read {}: {}", name, e)))?;
                let value = (!value.is_empty()).then_some(value);
                match name.as_str() {
                    "marker" => upload.marker = value,
                    "charset" => upload.charset = value,
                    _ => upload.terminator = value,
                }
            }
            _ => {}
        }
    }

    Ok(upload)
}

async fn highlight(State(state): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;
    let data = upload
        .data
        .ok_or_else(|| ApiError::BadRequest("no file was sent in field 'file'".to_string()))?;
    let input = InputDocument::from_bytes(upload.filename.as_deref(), data).map_err(RefmarkError::from)?;

    let mut config = (*state.config).clone();
    config.pattern = config.pattern.with_overrides(
        upload.marker.as_deref(),
        upload.charset.as_deref(),
        upload.terminator.as_deref(),
    );

    let text_only = state.text_only;
    let outcome = tokio::task::spawn_blocking(move || -> Result<Outcome, ApiError> {
        let pipeline = build_pipeline(config, text_only).map_err(|e| match e.downcast::<RefmarkError>() {
            Ok(RefmarkError::Config(msg)) => ApiError::BadRequest(msg),
            Ok(other) => ApiError::from(other),
            Err(e) => ApiError::Internal(e.to_string()),
        })?;
        Ok(pipeline.run(&input)?)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("worker failed: {}", e)))??;

    match outcome {
        Outcome::Highlighted(report) => Ok((
            [
                (header::CONTENT_TYPE, "application/pdf"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"highlighted.pdf\""),
            ],
            report.pdf,
        )
            .into_response()),
        Outcome::NotFound { message } => Err(ApiError::NotFound(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use tower::ServiceExt;

    const BOUNDARY: &str = "refmark-test-boundary";

    fn text_pdf(line: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/highlight")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn app() -> Router {
        router(AppState::new(RefmarkConfig::default(), true))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_highlight_returns_pdf_attachment() {
        let pdf = text_pdf("Invoice Ref: Z-900-1 / continue");
        let response = app()
            .oneshot(upload(&[("file", Some("doc.pdf"), &pdf)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert!(
            response.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .contains("highlighted.pdf")
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_no_codes_is_404() {
        let pdf = text_pdf("nothing to see here");
        let response = app()
            .oneshot(upload(&[("file", Some("doc.pdf"), &pdf)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["status"], "not-found");
    }

    #[tokio::test]
    async fn test_pattern_fields_override_defaults() {
        let pdf = text_pdf("Code# AB123 ;");
        let response = app()
            .oneshot(upload(&[
                ("file", Some("doc.pdf"), &pdf),
                ("marker", None, b"Code#"),
                ("terminator", None, b";"),
                ("charset", None, b""),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_file_is_400() {
        let response = app()
            .oneshot(upload(&[("marker", None, b"Ref:")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["status"], "error");
    }

    #[tokio::test]
    async fn test_unsupported_file_is_400() {
        let response = app()
            .oneshot(upload(&[("file", Some("notes.txt"), b"plain text")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_image_without_ocr_is_500() {
        let png = b"\x89PNG\r\n\x1a\n0000";
        let response = app()
            .oneshot(upload(&[("file", Some("scan.png"), png)]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("OCR unavailable"));
    }
}
