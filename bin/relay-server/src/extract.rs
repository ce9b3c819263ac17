//! Request extractors shared by the Gemini routes.

use std::collections::HashMap;

use axum::extract::{FromRequest, Multipart, Request};
use relay_gemini::FileUpload;
use tracing::debug;

use crate::error::ServerError;

/// `axum::Json` whose rejection is a [`ServerError`] (400 with `{"error": ...}`).
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct ApiJson<T>(pub T);

/// Text fields and files of a `multipart/form-data` body.
///
/// Usable directly as an extractor; a non-multipart request is a 400.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, FileUpload>,
}

impl UploadForm {
    /// Drain `multipart`. Size is bounded by the router's body limit.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match field.file_name().map(str::to_owned) {
                Some(file_name) => {
                    let declared = field.content_type().map(str::to_owned);
                    let bytes = field.bytes().await?;
                    // Browsers send an empty, unnamed part for an untouched file input.
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    let mime_type = resolve_mime(declared.as_deref(), &file_name);
                    debug!(
                        field = %name,
                        file_name = %file_name,
                        mime_type = %mime_type,
                        size_bytes = bytes.len(),
                        "received file part"
                    );
                    form.files.insert(
                        name,
                        FileUpload {
                            file_name,
                            mime_type,
                            bytes,
                        },
                    );
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    /// A text field, or `None` when absent or blank.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).filter(|v| !v.trim().is_empty()).cloned()
    }

    pub fn take_file(&mut self, name: &str) -> Option<FileUpload> {
        self.files.remove(name)
    }
}

impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;
        Self::read(multipart).await
    }
}

/// The part's declared type, or a guess from its file name when the client
/// sent none or the generic `application/octet-stream`.
fn resolve_mime(declared: Option<&str>, file_name: &str) -> String {
    match declared.map(str::trim) {
        Some(m) if !m.is_empty() && !m.eq_ignore_ascii_case("application/octet-stream") => m.to_owned(),
        _ => mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_owned(),
    }
}
