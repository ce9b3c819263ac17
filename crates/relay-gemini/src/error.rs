use thiserror::Error;

/// Errors that can be returned by relay-gemini operations.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// An HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to serialize or deserialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The Gemini API answered with a non-2xx status.
    #[error("Gemini API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response had an unexpected shape (missing header, field, ...).
    #[error("Invalid Gemini API response: {message}")]
    InvalidResponse { message: String },

    /// The model produced no text (blocked, truncated or empty candidate list).
    #[error("Failed to get a valid response from Gemini")]
    EmptyResponse,

    /// The declared content type is outside the upload allow-list.
    #[error("Unsupported MIME type: {0}")]
    UnsupportedMediaType(String),

    /// Remote processing of an uploaded file ended in the FAILED state.
    #[error("File processing failed for {file_name}")]
    FileProcessingFailed { file_name: String },

    /// The file never became ACTIVE within the poll budget.
    #[error("File {file_name} was not ready after {attempts} status checks")]
    IngestTimeout { file_name: String, attempts: u32 },

    /// The model requested a tool call the relay could not execute.
    #[error("Invalid call to tool `{name}`: {message}")]
    InvalidToolCall { name: String, message: String },

    /// An unknown response-schema key was requested.
    #[error("Invalid schema type: {0}")]
    UnknownSchema(String),

    /// The operation was cancelled (server shutdown).
    #[error("operation cancelled")]
    Cancelled,
}

/// Coarse classification of a [`GeminiError`].
///
/// Request handlers branch on this instead of matching individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied media the relay refuses to forward.
    UnsupportedMedia,
    /// The caller supplied an argument that can never succeed.
    InvalidInput,
    /// The remote service (or its response) failed.
    Upstream,
    /// A bounded wait ran out.
    Timeout,
    /// Work was abandoned on purpose.
    Cancelled,
}

impl GeminiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeminiError::UnsupportedMediaType(_) => ErrorKind::UnsupportedMedia,
            GeminiError::UnknownSchema(_) => ErrorKind::InvalidInput,
            GeminiError::IngestTimeout { .. } => ErrorKind::Timeout,
            GeminiError::Cancelled => ErrorKind::Cancelled,
            GeminiError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            GeminiError::Http(_)
            | GeminiError::Json(_)
            | GeminiError::Api { .. }
            | GeminiError::InvalidResponse { .. }
            | GeminiError::EmptyResponse
            | GeminiError::FileProcessingFailed { .. }
            | GeminiError::InvalidToolCall { .. } => ErrorKind::Upstream,
        }
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        GeminiError::InvalidResponse {
            message: message.into(),
        }
    }
}
