//! Multipart endpoints that pair a prompt with an uploaded file.
//!
//! Images are sent inline. Documents and videos go through the remote file
//! store first, which may take a while; the wait is bounded by the poll
//! policy and aborted on server shutdown.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;
use utoipa::OpenApi;

use super::require;
use crate::error::ServerError;
use crate::extract::UploadForm;
use crate::schemas::gemini::{
    AnalyzeVideoForm, FileAnalysisUpload, ImageUpload, TextResponse, VideoDescriptionResponse,
    VideoUpload,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(generate_with_image, analyze_with_file, analyze_video),
    components(schemas(
        ImageUpload,
        FileAnalysisUpload,
        VideoUpload,
        TextResponse,
        VideoDescriptionResponse
    ))
)]
pub struct MediaApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate-with-image", post(generate_with_image))
        .route("/analyze-with-file", post(analyze_with_file))
        .route("/analyze-video", post(analyze_video))
}

/// Prompt plus an inline JPEG, PNG or WEBP image.
#[utoipa::path(
    post,
    path = "/api/gemini/generate-with-image",
    tag = "gemini",
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Text generated", body = TextResponse),
        (status = 400, description = "Message or image missing"),
        (status = 415, description = "Not an accepted image type"),
        (status = 500, description = "Gemini call failed"),
    )
)]
pub async fn generate_with_image(
    State(state): State<Arc<AppState>>,
    mut form: UploadForm,
) -> Result<Json<TextResponse>, ServerError> {
    const REQUIRED: &str = "Both message and image are required.";
    let message = require(form.text("message"), REQUIRED)?;
    let image = form
        .take_file("image")
        .ok_or_else(|| ServerError::BadRequest(REQUIRED.to_owned()))?;

    info!(
        file_name = %image.file_name,
        mime_type = %image.mime_type,
        size_bytes = image.bytes.len(),
        "generating with inline image"
    );
    let response = state.gemini.generate_with_image(&message, &image).await?;
    Ok(Json(TextResponse { message, response }))
}

/// Upload a PDF, MP4 or image to the remote file store and ask about it.
#[utoipa::path(
    post,
    path = "/api/gemini/analyze-with-file",
    tag = "gemini",
    request_body(content = FileAnalysisUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Analysis generated", body = TextResponse),
        (status = 400, description = "Message or file missing"),
        (status = 415, description = "Unsupported file type"),
        (status = 500, description = "Upload, processing or generation failed"),
        (status = 503, description = "Server shutting down"),
        (status = 504, description = "File was not processed in time"),
    )
)]
pub async fn analyze_with_file(
    State(state): State<Arc<AppState>>,
    mut form: UploadForm,
) -> Result<Json<TextResponse>, ServerError> {
    const REQUIRED: &str = "Both message and file are required.";
    let message = require(form.text("message"), REQUIRED)?;
    let file = form
        .take_file("file")
        .ok_or_else(|| ServerError::BadRequest(REQUIRED.to_owned()))?;

    info!(
        file_name = %file.file_name,
        mime_type = %file.mime_type,
        size_bytes = file.bytes.len(),
        "analyzing uploaded file"
    );
    let response = state.gemini.analyze_file(&message, file, &state.shutdown).await?;
    Ok(Json(TextResponse { message, response }))
}

/// Describe an MP4 video of at most 10 MiB.
///
/// Validation failures are reported per field with status 422.
#[utoipa::path(
    post,
    path = "/api/gemini/analyze-video",
    tag = "gemini",
    request_body(content = VideoUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video described", body = VideoDescriptionResponse),
        (status = 422, description = "Field validation failed"),
        (status = 500, description = "Upload, processing or generation failed"),
        (status = 503, description = "Server shutting down"),
        (status = 504, description = "Video was not processed in time"),
    )
)]
pub async fn analyze_video(
    State(state): State<Arc<AppState>>,
    mut form: UploadForm,
) -> Result<Json<VideoDescriptionResponse>, ServerError> {
    let video_form = AnalyzeVideoForm {
        message: form.text("message"),
        video: form.take_file("video"),
    };
    video_form.check()?;
    let (Some(message), Some(video)) = (video_form.message, video_form.video) else {
        return Err(ServerError::Internal("validated video form is incomplete".into()));
    };

    info!(
        file_name = %video.file_name,
        size_bytes = video.bytes.len(),
        "describing uploaded video"
    );
    let description = state.gemini.analyze_file(&message, video, &state.shutdown).await?;
    Ok(Json(VideoDescriptionResponse {
        message,
        description,
    }))
}
