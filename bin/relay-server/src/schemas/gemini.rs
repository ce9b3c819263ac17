//! Request / response types of the `/api/gemini` routes.

use relay_gemini::{FileUpload, MediaType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::entities::ChatMessage;

/// Largest accepted video for `analyze-video`.
pub const MAX_VIDEO_BYTES: usize = 10 * 1024 * 1024;

// ── JSON requests ────────────────────────────────────────────────────────────

/// Body of the single-prompt endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MessageRequest {
    /// Prompt text; required.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct StructuredRequest {
    #[serde(default)]
    pub message: Option<String>,
    /// One of `recipe`, `details`, `multiply`.
    #[serde(default)]
    pub schema_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    /// Continue this chat; omitted to start a new one.
    #[serde(default)]
    pub chat_id: Option<String>,
}

// ── Multipart requests (documentation only) ──────────────────────────────────

#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ImageUpload {
    pub message: String,
    /// JPEG, PNG or WEBP image.
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct FileAnalysisUpload {
    pub message: String,
    /// PDF, MP4, JPEG, PNG or WEBP file.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct VideoUpload {
    /// At most 255 characters.
    pub message: String,
    /// MP4 video of at most 10 MiB.
    #[schema(value_type = String, format = Binary)]
    pub video: Vec<u8>,
}

// ── analyze-video validation ─────────────────────────────────────────────────

/// Parsed `analyze-video` form; a blank message is stored as `None`.
#[derive(Debug, Default, Validate)]
pub struct AnalyzeVideoForm {
    #[validate(
        required(message = "The message field is required."),
        length(max = 255, message = "The message field must not be greater than 255 characters.")
    )]
    pub message: Option<String>,

    #[validate(required(message = "The video field is required."))]
    pub video: Option<FileUpload>,
}

impl AnalyzeVideoForm {
    /// Field rules plus the video's type and size.
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);

        if let Some(video) = &self.video {
            if MediaType::from_mime(&video.mime_type).ok() != Some(MediaType::Mp4) {
                errors.add("video", rule("mimetypes", "Only MP4 video files are supported."));
            }
            if video.bytes.len() > MAX_VIDEO_BYTES {
                errors.add("video", rule("max", "The video must be less than 10MB."));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut e = ValidationError::new(code);
    e.message = Some(message.into());
    e
}

// ── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TextResponse {
    pub message: String,
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StructuredResponse {
    pub message: String,
    /// Object shaped by the requested schema.
    #[schema(value_type = Object)]
    pub response: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VideoDescriptionResponse {
    pub message: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub chat_id: String,
    pub message: String,
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenCountResponse {
    pub tokens: u32,
}

/// `{success, output}` or `{success: false, error}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfiguredGenerationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessageResponse {
    pub id: String,
    pub chat_id: String,
    pub user: String,
    pub model: String,
    pub created_at: String,
}

impl ChatMessage {
    pub fn to_response(&self) -> ChatMessageResponse {
        ChatMessageResponse {
            id: self.id.clone(),
            chat_id: self.chat_id.clone(),
            user: self.user_text.clone(),
            model: self.model_text.clone(),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    fn video(mime: &str, size: usize) -> FileUpload {
        FileUpload {
            file_name: "clip.mp4".into(),
            mime_type: mime.into(),
            bytes: Bytes::from(vec![0u8; size]),
        }
    }

    #[test]
    fn valid_form_passes() {
        let form = AnalyzeVideoForm {
            message: Some("describe".into()),
            video: Some(video("video/mp4", 1024)),
        };
        assert!(form.check().is_ok());
    }

    #[test]
    fn missing_fields_are_reported_per_field() {
        let errors = AnalyzeVideoForm::default().check().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("message"));
        assert!(fields.contains_key("video"));
    }

    #[test]
    fn long_message_and_bad_video_are_rejected() {
        let form = AnalyzeVideoForm {
            message: Some("x".repeat(256)),
            video: Some(video("image/png", MAX_VIDEO_BYTES + 1)),
        };
        let errors = form.check().unwrap_err();
        let fields = errors.field_errors();
        assert_eq!(fields["message"].len(), 1);
        assert_eq!(fields["video"].len(), 2);
    }

    #[test]
    fn exactly_255_characters_is_allowed() {
        let form = AnalyzeVideoForm {
            message: Some("é".repeat(255)),
            video: Some(video("video/mp4", MAX_VIDEO_BYTES)),
        };
        assert!(form.check().is_ok());
    }
}
