//! `reqwest`-backed [`GenerativeModel`] for the Gemini v1beta REST API.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::GeminiError;
use crate::model::{GenerativeModel, TextStream};
use crate::sse::SseDecoder;
use crate::types::{
    Content, CountTokensRequest, CountTokensResponse, FileUpload, GenerateContentRequest,
    GenerateContentResponse, RemoteFile, UploadFileResponse,
};

/// Public Gemini endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Fragments buffered between the upstream reader and the consumer.
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Connection settings for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub model: String,
    /// Scheme + host, without the `/v1beta` suffix.
    pub base_url: String,
    /// Deadline for non-streaming calls. Streams are bounded by the consumer.
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// HTTP client for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: ClientConfig,
    http: Client,
}

impl GeminiClient {
    pub fn new(config: ClientConfig) -> Result<Self, GeminiError> {
        let http = Client::builder()
            .user_agent(concat!("relay-gemini/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { config, http })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn model_url(&self, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base(), self.config.model, method)
    }

    fn file_url(&self, name: &str) -> String {
        if name.starts_with("http://") || name.starts_with("https://") {
            name.to_owned()
        } else {
            format!("{}/v1beta/{}", self.base(), name.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        debug!(model = %self.config.model, turns = request.contents.len(), "generateContent");
        let resp = self
            .http
            .post(self.model_url("generateContent"))
            .timeout(self.config.request_timeout)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    async fn stream_generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<TextStream, GeminiError> {
        debug!(model = %self.config.model, turns = request.contents.len(), "streamGenerateContent");
        let url = format!("{}?alt=sse", self.model_url("streamGenerateContent"));
        let resp = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(forward_stream(resp, tx));
        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn count_tokens(&self, contents: Vec<Content>) -> Result<u32, GeminiError> {
        let resp = self
            .http
            .post(self.model_url("countTokens"))
            .timeout(self.config.request_timeout)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&CountTokensRequest { contents })
            .send()
            .await?;
        let body: CountTokensResponse = check_status(resp).await?.json().await?;
        Ok(body.total_tokens)
    }

    async fn upload_file(&self, upload: FileUpload) -> Result<RemoteFile, GeminiError> {
        debug!(
            file_name = %upload.file_name,
            mime_type = %upload.mime_type,
            size_bytes = upload.bytes.len(),
            "starting resumable upload"
        );

        // 1. Open an upload session.
        let resp = self
            .http
            .post(format!("{}/upload/v1beta/files", self.base()))
            .timeout(self.config.request_timeout)
            .header(API_KEY_HEADER, &self.config.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", upload.bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", &upload.mime_type)
            .json(&json!({ "file": { "display_name": upload.file_name } }))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let session_url = resp
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| GeminiError::invalid_response("upload start response lacks x-goog-upload-url"))?
            .to_owned();

        // 2. Send the bytes and finalize in one request.
        let resp = self
            .http
            .post(session_url)
            .timeout(self.config.request_timeout)
            .header(API_KEY_HEADER, &self.config.api_key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(upload.bytes)
            .send()
            .await?;
        let envelope: UploadFileResponse = check_status(resp).await?.json().await?;
        debug!(name = %envelope.file.name, state = ?envelope.file.state, "upload finalized");
        Ok(envelope.file)
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, GeminiError> {
        let resp = self
            .http
            .get(self.file_url(name))
            .timeout(self.config.request_timeout)
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Turn a non-2xx response into [`GeminiError::Api`].
async fn check_status(resp: Response) -> Result<Response, GeminiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorEnvelope>(&body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ if !body.is_empty() => body,
        _ => status.canonical_reason().unwrap_or("unknown error").to_owned(),
    };
    warn!(status = status.as_u16(), %message, "Gemini API returned an error");
    Err(GeminiError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Pump an SSE response into `tx` until the body ends or the receiver is gone.
async fn forward_stream(resp: Response, tx: mpsc::Sender<Result<String, GeminiError>>) {
    let mut decoder = SseDecoder::default();
    let mut body = resp.bytes_stream();

    while let Some(chunk) = body.next().await {
        let events = match chunk.map_err(GeminiError::from).and_then(|c| decoder.push(&c)) {
            Ok(events) => events,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        for data in events {
            if !send_fragment(&tx, &data).await {
                debug!("stream consumer dropped; closing upstream body");
                return;
            }
        }
    }
    if let Some(data) = decoder.finish() {
        send_fragment(&tx, &data).await;
    }
}

/// Returns `false` once the consumer is gone or an error was forwarded.
async fn send_fragment(tx: &mpsc::Sender<Result<String, GeminiError>>, data: &str) -> bool {
    match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(chunk) => match chunk.text() {
            Some(text) => tx.send(Ok(text)).await.is_ok(),
            None => !tx.is_closed(),
        },
        Err(e) => {
            let _ = tx.send(Err(e.into())).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileState;
    use bytes::Bytes;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new(ClientConfig::new("test-key", "gemini-test").with_base_url(server.uri()))
            .expect("client")
    }

    fn text_chunk(text: &str) -> serde_json::Value {
        json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
    }

    #[test]
    fn urls_are_built_from_base_and_model() {
        let client = GeminiClient::new(
            ClientConfig::new("k", "gemini-x").with_base_url("http://localhost:9/"),
        )
        .unwrap();
        assert_eq!(
            client.model_url("countTokens"),
            "http://localhost:9/v1beta/models/gemini-x:countTokens"
        );
        assert_eq!(client.file_url("files/abc"), "http://localhost:9/v1beta/files/abc");
        assert_eq!(client.file_url("https://h/v1beta/files/abc"), "https://h/v1beta/files/abc");
    }

    #[tokio::test]
    async fn generate_content_sends_key_and_parses_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_chunk("Hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client_for(&server)
            .generate_content(GenerateContentRequest::prompt("hello"))
            .await
            .unwrap();
        assert_eq!(resp.text().as_deref(), Some("Hi there"));
    }

    #[tokio::test]
    async fn api_error_envelope_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate_content(GenerateContentRequest::prompt("hello"))
            .await
            .unwrap_err();
        match err {
            GeminiError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn count_tokens_returns_total() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:countTokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "totalTokens": 7 })))
            .mount(&server)
            .await;

        let n = client_for(&server)
            .count_tokens(vec![Content::user_text("count me")])
            .await
            .unwrap();
        assert_eq!(n, 7);
    }

    #[tokio::test]
    async fn upload_runs_resumable_handshake() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("x-goog-upload-command", "start"))
            .and(header("x-goog-upload-header-content-type", "application/pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-goog-upload-url", format!("{}/upload-session/42", server.uri()).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload-session/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {
                    "name": "files/42",
                    "uri": "https://example.test/v1beta/files/42",
                    "mimeType": "application/pdf",
                    "state": "PROCESSING"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let file = client_for(&server)
            .upload_file(FileUpload {
                file_name: "report.pdf".into(),
                mime_type: "application/pdf".into(),
                bytes: Bytes::from_static(b"%PDF-1.7"),
            })
            .await
            .unwrap();
        assert_eq!(file.name, "files/42");
        assert_eq!(file.state, FileState::Processing);
    }

    #[tokio::test]
    async fn upload_without_session_url_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .upload_file(FileUpload {
                file_name: "a.png".into(),
                mime_type: "image/png".into(),
                bytes: Bytes::from_static(b"\x89PNG"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn get_file_reads_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/42",
                "uri": "https://example.test/v1beta/files/42",
                "state": "ACTIVE"
            })))
            .mount(&server)
            .await;

        let file = client_for(&server).get_file("files/42").await.unwrap();
        assert_eq!(file.state, FileState::Active);
    }

    #[tokio::test]
    async fn stream_yields_fragments_in_order() {
        let server = MockServer::start().await;
        let body = format!(
            "data: {}\r\n\r\ndata: {}\r\n\r\ndata: {}\r\n\r\n",
            text_chunk("Once "),
            text_chunk("upon "),
            text_chunk("a time")
        );
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = client_for(&server)
            .stream_generate_content(GenerateContentRequest::prompt("tell a story"))
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Once ", "upon ", "a time"]);
    }

    #[tokio::test]
    async fn stream_surfaces_malformed_chunk_as_error() {
        let server = MockServer::start().await;
        let body = format!("data: {}\n\ndata: not-json\n\n", text_chunk("ok"));
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:streamGenerateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let items: Vec<_> = client_for(&server)
            .stream_generate_content(GenerateContentRequest::prompt("x"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("ok"));
        assert!(matches!(items[1], Err(GeminiError::Json(_))));
    }
}
