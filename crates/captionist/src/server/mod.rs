//! HTTP front end: the upload form, the caption result page, and stored uploads.

pub mod page;

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use captionist_core::pipeline::UPLOAD_URL_PREFIX;
use captionist_core::{CaptionRequest, CaptionService, UploadedFile};
use tower_http::{services::ServeDir, trace::TraceLayer};

use page::PageView;

/// Shared handler state.
pub struct AppState {
    pub service: CaptionService,
}

/// Build the application router.
pub fn router(service: CaptionService, max_upload_bytes: usize) -> Router {
    let upload_dir = service.store().dir().to_path_buf();

    Router::new()
        .route("/", get(index).post(upload))
        .nest_service(UPLOAD_URL_PREFIX, ServeDir::new(upload_dir))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(AppState { service }))
}

async fn index() -> Html<String> {
    Html(page::render(&PageView::form()))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> (StatusCode, Html<String>) {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::warn!("Rejected upload request: {rejection}");
            return (
                rejection.status(),
                Html(page::render(&PageView::error(rejection.body_text()))),
            );
        }
    };

    let request = match read_form(multipart).await {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!("Unreadable upload form: {err}");
            return (
                err.status(),
                Html(page::render(&PageView::error(err.body_text()))),
            );
        }
    };

    let prompt = request.prompt.clone().unwrap_or_default();
    let purpose = request.purpose.clone().unwrap_or_default();

    let outcome = state.service.handle(request).await;
    let view = PageView::from_outcome(&outcome, &prompt, &purpose);
    (StatusCode::OK, Html(page::render(&view)))
}

/// Collect the form fields into a request.
///
/// An `image` field without a filename is a plain text field, not a file part.
async fn read_form(mut multipart: Multipart) -> Result<CaptionRequest, MultipartError> {
    let mut request = CaptionRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let bytes = field.bytes().await?;
                request.file = Some(UploadedFile {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            "prompt" => request.prompt = Some(field.text().await?),
            "gpt_purpose" | "purpose" => request.purpose = Some(field.text().await?),
            other => tracing::debug!("Ignoring form field {other:?}"),
        }
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use captionist_core::enhance::{GenerationRequest, GenerationResponse, TextGenerator};
    use captionist_core::{
        CaptionEnhancer, CaptionGenerator, CaptionModel, EnhanceError, PipelineError, UploadStore,
    };
    use image::RgbImage;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const BOUNDARY: &str = "captionist-test-boundary";

    struct FakeBlip {
        calls: AtomicUsize,
    }

    impl CaptionModel for FakeBlip {
        fn name(&self) -> &str {
            "fake-blip"
        }

        fn caption(&self, _: &RgbImage, prompt: Option<&str>) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match prompt {
                Some(p) => format!("{p} a cat on a windowsill"),
                None => "a cat on a windowsill".to_string(),
            })
        }
    }

    struct MarketingCopy;

    #[async_trait]
    impl TextGenerator for MarketingCopy {
        fn name(&self) -> &str {
            "marketing-copy"
        }

        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationResponse, EnhanceError> {
            assert!(request.prompt.contains("for the purpose of marketing."));
            Ok(GenerationResponse {
                text: "Sunlit and serene: the perfect window companion.".to_string(),
                model: "fake".to_string(),
                generated_tokens: None,
                latency_ms: 0,
            })
        }
    }

    struct TestApp {
        router: Router,
        model: Arc<FakeBlip>,
        dir: tempfile::TempDir,
    }

    fn app(enhancer: CaptionEnhancer) -> TestApp {
        app_with_limit(enhancer, 16 * 1024 * 1024)
    }

    fn app_with_limit(enhancer: CaptionEnhancer, max_upload_bytes: usize) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(FakeBlip {
            calls: AtomicUsize::new(0),
        });
        let store = UploadStore::open(dir.path().join("uploads")).unwrap();
        let service = CaptionService::new(CaptionGenerator::new(model.clone()), enhancer, store);

        TestApp {
            router: router(service, max_upload_bytes),
            model,
            dir,
        }
    }

    fn jpeg_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(32, 24, image::Rgb([200, 150, 90]))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    enum Part<'a> {
        File(&'a str, &'a str, Vec<u8>),
        Text(&'a str, &'a str),
    }

    fn multipart_body(parts: Vec<Part<'_>>) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(name, file_name, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&bytes);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post(parts: Vec<Part<'_>>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_index_renders_form() {
        let app = app(CaptionEnhancer::disabled());
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, html) = send(app.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("enctype=\"multipart/form-data\""));
    }

    #[tokio::test]
    async fn test_caption_without_enhancer_shows_notice() {
        let app = app(CaptionEnhancer::disabled());
        let request = post(vec![Part::File("image", "cat.jpg", jpeg_bytes())]);
        let (status, html) = send(app.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<p class=\"caption\">a cat on a windowsill</p>"));
        assert!(html.contains("not configured"));
        assert!(html.contains(r#"<img src="/uploads/cat.jpg""#));
        assert_eq!(app.model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_text_file_is_rejected_without_model_call() {
        let app = app(CaptionEnhancer::disabled());
        let request = post(vec![Part::File("image", "cat.txt", b"meow".to_vec())]);
        let (status, html) = send(app.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Invalid file type"));
        assert!(!html.contains("class=\"caption\""));
        assert_eq!(app.model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_marketing_refinement_keeps_original() {
        let app = app(CaptionEnhancer::with_generator(Arc::new(MarketingCopy)));
        let request = post(vec![
            Part::File("image", "cat.jpg", jpeg_bytes()),
            Part::Text("gpt_purpose", "marketing"),
        ]);
        let (status, html) = send(app.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Sunlit and serene: the perfect window companion."));
        assert!(html.contains("<p class=\"original\">a cat on a windowsill</p>"));
        assert!(!html.contains("class=\"error\""));
    }

    #[tokio::test]
    async fn test_missing_file_part() {
        let app = app(CaptionEnhancer::disabled());
        let request = post(vec![Part::Text("prompt", "a photograph of")]);
        let (status, html) = send(app.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("No image file part"));
        assert!(html.contains(r#"value="a photograph of""#));
    }

    #[tokio::test]
    async fn test_empty_filename() {
        let app = app(CaptionEnhancer::disabled());
        let request = post(vec![Part::File("image", "", Vec::new())]);
        let (status, html) = send(app.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("No selected image file"));
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_bad_request() {
        let app = app(CaptionEnhancer::disabled());
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let (status, html) = send(app.router, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(html.contains("class=\"error\""));
    }

    #[tokio::test]
    async fn test_oversized_upload_is_payload_too_large() {
        let app = app_with_limit(CaptionEnhancer::disabled(), 1024);
        let request = post(vec![Part::File("image", "cat.jpg", vec![0xAB; 4096])]);
        let (status, html) = send(app.router, request).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(html.contains("class=\"error\""));
        assert!(!html.contains("class=\"caption\""));
        assert_eq!(app.model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stored_upload_is_served() {
        let app = app(CaptionEnhancer::disabled());
        let image = jpeg_bytes();
        let router = app.router.clone();

        let (status, _) = send(
            router,
            post(vec![Part::File("image", "window cat.jpg", image.clone())]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(app.dir.path().join("uploads/window_cat.jpg").exists());

        let request = Request::builder()
            .uri("/uploads/window_cat.jpg")
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let served = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(served.to_vec(), image);
    }
}
