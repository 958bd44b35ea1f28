//! HTTP Search Backend
//!
//! Talks to the detection / search service over its REST contract:
//!
//! - `POST {base}/detect` (multipart: `image`, `labels` as a JSON array)
//! - `POST {base}/search` (JSON: `query_text`, `top_k`)
//! - `POST {base}/search/similar` (multipart: `image`, `box` as JSON, `limit`)
//!
//! Any transport error or non-2xx status becomes `DetectionFailed`,
//! `SearchFailed` or `SimilarSearchFailed`; the detail is logged and kept in
//! the error for diagnostics.
//! Nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::search::models::{DetectionResponse, SearchResponse};
use crate::core::search::provider::validate_query;
use crate::core::search::{DetectedRegion, NormalizedBox, SearchBackend, SearchResult};
use crate::core::settings::{validate_base_url, Settings};
use crate::core::upload::UploadedImage;
use crate::core::{CoreError, CoreResult};

/// Longest slice of an error body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 200;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct TextSearchRequest<'a> {
    query_text: &'a str,
    top_k: u32,
}

// =============================================================================
// HTTP Backend
// =============================================================================

/// REST client for the detection and search endpoints
pub struct HttpSearchBackend {
    /// Base URL without trailing slash
    base_url: String,
    /// Request timeout
    timeout: Duration,
    /// HTTP client
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSearchBackend")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpSearchBackend {
    /// Detection endpoint path
    pub const DETECT_PATH: &'static str = "/detect";
    /// Text search endpoint path
    pub const SEARCH_PATH: &'static str = "/search";
    /// Region similarity endpoint path
    pub const SIMILAR_PATH: &'static str = "/search/similar";

    /// Creates a backend for the given base URL
    pub fn new(base_url: &str, timeout: Duration) -> CoreResult<Self> {
        let base_url = validate_base_url(base_url)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            timeout,
            client,
        })
    }

    /// Creates a backend from engine settings
    pub fn from_settings(settings: &Settings) -> CoreResult<Self> {
        Self::new(&settings.api_base_url, settings.request_timeout())
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn image_part(image: &UploadedImage, fail: fn(String) -> CoreError) -> CoreResult<Part> {
        Part::bytes(image.bytes().to_vec())
            .file_name(image.name().to_string())
            .mime_str(image.content_type())
            .map_err(|e| fail(format!("Invalid image content type: {}", e)))
    }

    /// Sends a request and returns the body of a 2xx response
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        fail: fn(String) -> CoreError,
    ) -> CoreResult<String> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                fail(format!("Request timed out after {:?}", self.timeout))
            } else {
                fail(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| fail(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let detail: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(fail(format!("HTTP {}: {}", status, detail)));
        }

        Ok(body)
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn detect(
        &self,
        image: &UploadedImage,
        label_hints: &[String],
    ) -> CoreResult<Vec<DetectedRegion>> {
        let labels = serde_json::to_string(label_hints)?;
        let form = Form::new()
            .part("image", Self::image_part(image, CoreError::DetectionFailed)?)
            .text("labels", labels);

        let url = self.endpoint(Self::DETECT_PATH);
        debug!("POST {} ({} bytes)", url, image.size());

        let body = self
            .send(self.client.post(&url).multipart(form), CoreError::DetectionFailed)
            .await
            .inspect_err(|e| warn!("Detection request failed: {}", e))?;

        let parsed: DetectionResponse = serde_json::from_str(&body).map_err(|e| {
            CoreError::DetectionFailed(format!("Failed to parse response: {}", e))
        })?;

        debug!("Detection returned {} regions", parsed.detections.len());
        Ok(parsed.detections)
    }

    async fn search_by_text(&self, query: &str, top_k: u32) -> CoreResult<Vec<SearchResult>> {
        let query = validate_query(query)?;
        let url = self.endpoint(Self::SEARCH_PATH);
        debug!("POST {} (top_k={})", url, top_k);

        let request = self.client.post(&url).json(&TextSearchRequest {
            query_text: query,
            top_k,
        });
        let body = self
            .send(request, CoreError::SearchFailed)
            .await
            .inspect_err(|e| warn!("Text search failed: {}", e))?;

        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| CoreError::SearchFailed(format!("Failed to parse response: {}", e)))?;
        Ok(parsed.into_results())
    }

    async fn search_similar(
        &self,
        image: &UploadedImage,
        region: &NormalizedBox,
        limit: u32,
    ) -> CoreResult<Vec<SearchResult>> {
        let form = Form::new()
            .part("image", Self::image_part(image, CoreError::SimilarSearchFailed)?)
            .text("box", serde_json::to_string(region)?)
            .text("limit", limit.to_string());

        let url = self.endpoint(Self::SIMILAR_PATH);
        debug!("POST {} (limit={})", url, limit);

        let body = self
            .send(self.client.post(&url).multipart(form), CoreError::SimilarSearchFailed)
            .await
            .inspect_err(|e| warn!("Similarity search failed: {}", e))?;

        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| CoreError::SimilarSearchFailed(format!("Failed to parse response: {}", e)))?;
        Ok(parsed.into_results())
    }

    async fn health_check(&self) -> CoreResult<()> {
        let url = format!("{}/", self.base_url);
        self.send(self.client.get(&url), CoreError::SearchFailed)
            .await
            .map(|_| ())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::upload::{SelectedFile, UploadValidator};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one canned response and returns the raw request it received
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });

        (base_url, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let headers = text[..header_end].to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());

            match content_length {
                Some(len) if buf.len() >= header_end + 4 + len => break,
                Some(_) => continue,
                None if headers.contains("transfer-encoding: chunked") => {
                    if buf.ends_with(b"0\r\n\r\n") {
                        break;
                    }
                }
                None => break,
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn test_image() -> UploadedImage {
        UploadValidator::default()
            .validate(SelectedFile::new("shoe.jpg", "image/jpeg", b"JPEGDATA".to_vec()))
            .unwrap()
    }

    fn hints() -> Vec<String> {
        vec!["clothing".into(), "shoes".into(), "accessories".into()]
    }

    // -------------------------------------------------------------------------
    // Construction Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_endpoint_building() {
        let backend =
            HttpSearchBackend::new("https://api.example.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url(), "https://api.example.com");
        assert_eq!(
            backend.endpoint(HttpSearchBackend::SIMILAR_PATH),
            "https://api.example.com/search/similar"
        );
        assert_eq!(backend.name(), "http");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let result = HttpSearchBackend::new("ftp://example.com", Duration::from_secs(5));
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    // -------------------------------------------------------------------------
    // Detection Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_detect_sends_multipart_and_keeps_order() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"detections":[
                {"label":"shoe","score":0.91,"box":{"xmin":0.1,"ymin":0.2,"xmax":0.5,"ymax":0.6}},
                {"label":"shoe","score":0.77,"box":{"xmin":0.55,"ymin":0.25,"xmax":0.9,"ymax":0.65}}
            ]}"#,
        )
        .await;
        let backend = HttpSearchBackend::new(&base_url, Duration::from_secs(5)).unwrap();

        let regions = backend.detect(&test_image(), &hints()).await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("POST /detect "));
        assert!(request.contains("name=\"image\""));
        assert!(request.contains("JPEGDATA"));
        assert!(request.contains("name=\"labels\""));
        assert!(request.contains(r#"["clothing","shoes","accessories"]"#));

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].score, 0.91);
        assert_eq!(regions[1].bbox, NormalizedBox::new(0.55, 0.25, 0.9, 0.65));
    }

    #[tokio::test]
    async fn test_detect_empty_is_ok() {
        let (base_url, server) = serve_once("200 OK", r#"{"detections":[]}"#).await;
        let backend = HttpSearchBackend::new(&base_url, Duration::from_secs(5)).unwrap();

        let regions = backend.detect(&test_image(), &hints()).await.unwrap();
        server.await.unwrap();
        assert!(regions.is_empty());
    }

    #[tokio::test]
    async fn test_detect_non_success_is_detection_failed() {
        let (base_url, server) =
            serve_once("500 Internal Server Error", r#"{"detail":"model crashed"}"#).await;
        let backend = HttpSearchBackend::new(&base_url, Duration::from_secs(5)).unwrap();

        let err = backend.detect(&test_image(), &hints()).await.unwrap_err();
        server.await.unwrap();

        match err {
            CoreError::DetectionFailed(detail) => {
                assert!(detail.contains("500"));
                assert!(detail.contains("model crashed"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_transport_error_is_detection_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let backend = HttpSearchBackend::new(&base_url, Duration::from_secs(5)).unwrap();
        let err = backend.detect(&test_image(), &hints()).await.unwrap_err();
        assert!(matches!(err, CoreError::DetectionFailed(_)));
    }

    // -------------------------------------------------------------------------
    // Search Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_search_by_text_posts_json() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"[{"title":"Red Floral Summer Dress","price":49.99,"score":0.92},{"title":"Classic Denim Jacket","score":0.41}]"#,
        )
        .await;
        let backend = HttpSearchBackend::new(&base_url, Duration::from_secs(5)).unwrap();

        let results = backend.search_by_text("  red dress ", 5).await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("POST /search "));
        assert!(request.contains(r#""query_text":"red dress""#));
        assert!(request.contains(r#""top_k":5"#));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Red Floral Summer Dress");
        assert_eq!(results[1].title, "Classic Denim Jacket");
    }

    #[tokio::test]
    async fn test_search_by_text_empty_array() {
        let (base_url, server) = serve_once("200 OK", "[]").await;
        let backend = HttpSearchBackend::new(&base_url, Duration::from_secs(5)).unwrap();

        let results = backend.search_by_text("red dress", 10).await.unwrap();
        server.await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_blank_query_fails_before_dispatch() {
        // Nothing listens here; a dispatched request would fail differently.
        let backend =
            HttpSearchBackend::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = backend.search_by_text("   ", 10).await.unwrap_err();

        match err {
            CoreError::SearchFailed(detail) => assert!(detail.contains("empty")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_similar_sends_box_and_limit() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"results":[{"title":"White Sneakers","category":"Shoes","score":0.88}]}"#,
        )
        .await;
        let backend = HttpSearchBackend::new(&base_url, Duration::from_secs(5)).unwrap();

        let region = NormalizedBox::new(0.1, 0.2, 0.5, 0.6);
        let results = backend
            .search_similar(&test_image(), &region, 7)
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("POST /search/similar "));
        assert!(request.contains("name=\"box\""));
        assert!(request.contains(r#""xmin":0.1"#));
        assert!(request.contains("name=\"limit\""));
        assert_eq!(results[0].category.as_deref(), Some("Shoes"));
    }

    #[tokio::test]
    async fn test_search_similar_bad_json_is_similar_search_failed() {
        let (base_url, server) = serve_once("200 OK", "not json").await;
        let backend = HttpSearchBackend::new(&base_url, Duration::from_secs(5)).unwrap();

        let region = NormalizedBox::new(0.0, 0.0, 1.0, 1.0);
        let err = backend
            .search_similar(&test_image(), &region, 10)
            .await
            .unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, CoreError::SimilarSearchFailed(_)));
        assert_eq!(
            err.user_message(),
            "Failed to search for similar products. Please try again."
        );
    }

    // -------------------------------------------------------------------------
    // Transport Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let backend = HttpSearchBackend::new(&base_url, Duration::from_millis(200)).unwrap();
        let err = backend.search_by_text("jacket", 5).await.unwrap_err();
        match err {
            CoreError::SearchFailed(detail) => assert!(detail.contains("timed out")),
            other => panic!("unexpected error: {:?}", other),
        }
        server.abort();
    }

    #[tokio::test]
    async fn test_health_check() {
        let (base_url, server) = serve_once("200 OK", r#"{"status":"ok"}"#).await;
        let backend = HttpSearchBackend::new(&base_url, Duration::from_secs(5)).unwrap();

        backend.health_check().await.unwrap();
        let request = server.await.unwrap();
        assert!(request.starts_with("GET / HTTP/1.1"));

        let (base_url, _server) = serve_once("503 Service Unavailable", "{}").await;
        let backend = HttpSearchBackend::new(&base_url, Duration::from_secs(5)).unwrap();
        assert!(backend.health_check().await.is_err());
    }
}
