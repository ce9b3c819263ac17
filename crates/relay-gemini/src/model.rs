//! The adapter seam between the relay and the remote generation API.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::GeminiError;
use crate::types::{Content, FileUpload, GenerateContentRequest, GenerateContentResponse, RemoteFile};

/// Incremental text fragments of a streamed generation, in arrival order.
///
/// Dropping the stream stops the producer.
pub type TextStream = BoxStream<'static, Result<String, GeminiError>>;

/// Everything the relay needs from a generative-AI provider.
///
/// [`crate::GeminiClient`] talks to the real API; tests substitute a
/// scripted implementation.
#[async_trait]
pub trait GenerativeModel: Send + Sync + 'static {
    /// One-shot generation.
    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError>;

    /// Streamed generation.
    async fn stream_generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<TextStream, GeminiError>;

    /// Token count of `contents` without generating anything.
    async fn count_tokens(&self, contents: Vec<Content>) -> Result<u32, GeminiError>;

    /// Push a file to remote storage, returning its provisional handle.
    async fn upload_file(&self, upload: FileUpload) -> Result<RemoteFile, GeminiError>;

    /// Fetch the current metadata (including processing state) of a file.
    async fn get_file(&self, name: &str) -> Result<RemoteFile, GeminiError>;
}
