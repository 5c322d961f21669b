use crate::api::{ApiError, ImageDeleter, ImageFetcher};
use crate::core::models::{ImageResults, TrackedImage};
use crate::core::session::Session;
use crate::core::settings::Settings;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest image the upload endpoint accepts.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

const UPLOAD_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "bmp"];

#[derive(Debug, Deserialize)]
struct ImageListResponse {
    #[serde(default)]
    images: Vec<TrackedImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlRequest<'a> {
    file_name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadTicket {
    upload_url: String,
    image_id: String,
}

/// Content type the pre-signed upload URL is signed for.
///
/// The storage signature covers `image/<extension>` verbatim, so `.jpg`
/// maps to `image/jpg` rather than `image/jpeg`.
pub fn upload_content_type(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    UPLOAD_EXTENSIONS
        .contains(&extension.as_str())
        .then(|| format!("image/{extension}"))
}

/// Authenticated REST client for the image-analysis API.
pub struct GalleryClient {
    http: reqwest::Client,
    endpoint: Url,
    session_path: Option<PathBuf>,
}

impl GalleryClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.api.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let endpoint = Url::parse(&settings.api.endpoint)
            .with_context(|| format!("Invalid API endpoint: {}", settings.api.endpoint))?;
        if endpoint.cannot_be_a_base() {
            anyhow::bail!("API endpoint must be an http(s) URL: {endpoint}");
        }

        Ok(Self {
            http,
            endpoint,
            session_path: settings.session_path(),
        })
    }

    /// Appends percent-encoded path segments to the endpoint.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn bearer_token(&self) -> Result<Option<String>, ApiError> {
        let Some(path) = &self.session_path else {
            return Ok(None);
        };

        let session = Session::load(path).map_err(|e| ApiError::Auth(format!("{e:#}")))?;
        match session {
            Some(session) if session.is_expired() => {
                Err(ApiError::Auth("session token has expired".to_string()))
            }
            Some(session) => Ok(Some(session.id_token)),
            None => Ok(None),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let request = match self.bearer_token()? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    pub async fn fetch_results(&self, image_id: &str) -> Result<ImageResults, ApiError> {
        let response = self
            .send(self.http.get(self.url(&["images", image_id, "results"])))
            .await?;

        response
            .json::<ImageResults>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Requests a pre-signed storage URL, then PUTs the file to it directly.
    /// Returns the identifier the server assigned to the new image.
    pub async fn upload(&self, path: &Path) -> Result<String, ApiError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ApiError::InvalidUpload(format!("{} is not a file", path.display())))?;
        let content_type = upload_content_type(path).ok_or_else(|| {
            ApiError::InvalidUpload(
                "unsupported file type, expected a JPEG, PNG, GIF or BMP image".to_string(),
            )
        })?;

        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| ApiError::InvalidUpload(format!("{}: {e}", path.display())))?
            .len();
        if size > MAX_UPLOAD_BYTES {
            return Err(ApiError::InvalidUpload(format!(
                "file is too large, maximum size is {}MB",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::InvalidUpload(format!("{}: {e}", path.display())))?;

        let response = self
            .send(
                self.http
                    .post(self.url(&["images", "upload-url"]))
                    .json(&UploadUrlRequest { file_name }),
            )
            .await?;
        let ticket = response
            .json::<UploadTicket>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        tracing::debug!(image_id = %ticket.image_id, size, %content_type, "Uploading to storage");

        // The pre-signed URL carries its own credentials.
        let response = self
            .http
            .put(&ticket.upload_url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Server {
                status: status.as_u16(),
                message: "Failed to upload image to storage".to_string(),
            });
        }

        tracing::info!(image_id = %ticket.image_id, file_name, "Uploaded image");
        Ok(ticket.image_id)
    }
}

#[async_trait]
impl ImageFetcher for GalleryClient {
    async fn fetch_all(&self) -> Result<Vec<TrackedImage>, ApiError> {
        let response = self.send(self.http.get(self.url(&["images"]))).await?;

        let list = response
            .json::<ImageListResponse>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        tracing::debug!(count = list.images.len(), "Fetched image list");
        Ok(list.images)
    }
}

#[async_trait]
impl ImageDeleter for GalleryClient {
    async fn delete_by_id(&self, image_id: &str) -> Result<(), ApiError> {
        self.send(self.http.delete(self.url(&["images", image_id])))
            .await?;

        tracing::debug!(image_id, "Deleted image");
        Ok(())
    }
}

fn transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Network(format!("request timed out: {error}"))
    } else if error.is_decode() {
        ApiError::Decode(error.to_string())
    } else {
        ApiError::Network(error.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Auth(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        _ => ApiError::Server {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ImageStatus;
    use std::time::Duration;
    use wiremock::matchers::{body_bytes, body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, session_dir: &tempfile::TempDir) -> GalleryClient {
        let mut settings = Settings::default();
        settings.api.endpoint = format!("{}/dev/", server.uri());
        settings.api.request_timeout_ms = 300;
        settings.session_path = Some(session_dir.path().join("session.json"));
        GalleryClient::new(&settings).unwrap()
    }

    fn write_session(dir: &tempfile::TempDir, token: &str) {
        let body = serde_json::json!({ "idToken": token, "email": "me@example.com" });
        std::fs::write(dir.path().join("session.json"), body.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_fetch_all_sends_bearer_and_parses_images() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        write_session(&dir, "token-123");

        Mock::given(method("GET"))
            .and(path("/dev/images"))
            .and(header("Authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "images": [
                    {"imageId": "a", "status": "processing", "fileName": "a.png", "createdAt": 10},
                    {"imageId": "b", "status": "completed"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let images = client_for(&server, &dir).fetch_all().await.unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].image_id, "a");
        assert_eq!(images[0].status, ImageStatus::Processing);
        assert_eq!(images[1].file_name, "unknown");
    }

    #[tokio::test]
    async fn test_missing_images_key_is_empty_list() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/dev/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let images = client_for(&server, &dir).fetch_all().await.unwrap();
        assert!(images.is_empty());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/dev/images"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/dev/images/gone"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"message": "Image not found"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/dev/images/boom"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"message": "Internal server error"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, &dir);

        let err = client.fetch_all().await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Auth("Request failed with status 401".to_string())
        );

        let err = client.delete_by_id("gone").await.unwrap_err();
        assert_eq!(err, ApiError::NotFound("Image not found".to_string()));

        let err = client.delete_by_id("boom").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Server {
                status: 500,
                message: "Internal server error".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_image_id_is_a_single_path_segment() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("DELETE"))
            .and(path("/dev/images/..%2Fauth"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/dev/auth"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        client_for(&server, &dir)
            .delete_by_id("../auth")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_accepts_no_content() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("DELETE"))
            .and(path("/dev/images/a"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server, &dir).delete_by_id("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/dev/images"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"images": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, &dir).fetch_all().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_expired_session_fails_before_request() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let token = format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(r#"{"exp":1000}"#)
        );
        write_session(&dir, &token);

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server, &dir).fetch_all().await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/dev/images"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server, &dir).fetch_all().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fetch_results() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/dev/images/a/results"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "imageId": "a",
                "status": "completed",
                "fileName": "a.png",
                "results": {"summary": {"topLabels": [{"name": "Dog", "confidence": 91.5}]}}
            })))
            .mount(&server)
            .await;

        let results = client_for(&server, &dir).fetch_results("a").await.unwrap();
        assert_eq!(results.status, ImageStatus::Completed);
        let summary = results.results.summary.unwrap();
        assert_eq!(summary.top_labels[0].name.as_deref(), Some("Dog"));
    }

    fn write_image(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_upload_content_type() {
        assert_eq!(
            upload_content_type(Path::new("cat.PNG")).as_deref(),
            Some("image/png")
        );
        assert_eq!(
            upload_content_type(Path::new("beach.jpg")).as_deref(),
            Some("image/jpg")
        );
        assert_eq!(
            upload_content_type(Path::new("beach.jpeg")).as_deref(),
            Some("image/jpeg")
        );
        assert!(upload_content_type(Path::new("notes.txt")).is_none());
        assert!(upload_content_type(Path::new("README")).is_none());
    }

    #[tokio::test]
    async fn test_upload_requests_url_then_puts_file() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        write_session(&dir, "token-123");
        let file = write_image(&dir, "cat.png", b"\x89PNG fake image");

        Mock::given(method("POST"))
            .and(path("/dev/images/upload-url"))
            .and(header("Authorization", "Bearer token-123"))
            .and(body_json(serde_json::json!({ "fileName": "cat.png" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "uploadUrl": format!(
                    "{}/bucket/user-1/img-9.png?X-Amz-Signature=sig",
                    server.uri()
                ),
                "imageId": "img-9",
                "imageKey": "user-1/img-9.png"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/bucket/user-1/img-9.png"))
            .and(query_param("X-Amz-Signature", "sig"))
            .and(header("Content-Type", "image/png"))
            .and(body_bytes(b"\x89PNG fake image".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let image_id = client_for(&server, &dir).upload(&file).await.unwrap();
        assert_eq!(image_id, "img-9");
    }

    #[tokio::test]
    async fn test_upload_storage_rejection_is_server_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let file = write_image(&dir, "dog.gif", b"GIF89a");

        Mock::given(method("POST"))
            .and(path("/dev/images/upload-url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "uploadUrl": format!("{}/bucket/dog.gif", server.uri()),
                "imageId": "img-1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/bucket/dog.gif"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string("<Error>SignatureDoesNotMatch</Error>"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, &dir).upload(&file).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Server {
                status: 403,
                message: "Failed to upload image to storage".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_files_before_any_request() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, &dir);

        let notes = write_image(&dir, "notes.txt", b"hello");
        let err = client.upload(&notes).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidUpload(_)), "got {err:?}");

        let huge = write_image(&dir, "huge.bmp", &vec![0u8; MAX_UPLOAD_BYTES as usize + 1]);
        let err = client.upload(&huge).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidUpload(_)), "got {err:?}");

        let missing = dir.path().join("missing.png");
        let err = client.upload(&missing).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidUpload(_)), "got {err:?}");
    }
}
