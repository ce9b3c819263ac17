//! Generation variants offered by the relay, built on a [`GenerativeModel`].

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::GeminiError;
use crate::history::{Exchange, assemble_history};
use crate::ingest::{IngestPhase, MediaType, PollPolicy, ingest};
use crate::model::{GenerativeModel, TextStream};
use crate::schema::ResponseSchema;
use crate::tools::{Multiply, ToolRegistry};
use crate::types::{
    Content, FileUpload, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
    Role, SafetySetting,
};

/// Tunables applied by [`GeminiService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub poll: PollPolicy,
    /// Sampling preset for [`GeminiService::generate_with_config`].
    pub tuned_generation: GenerationConfig,
    pub safety: Vec<SafetySetting>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            tuned_generation: GenerationConfig::tuned(),
            safety: SafetySetting::block_only_high(),
        }
    }
}

/// Cheap to clone; all clones share the same model handle.
#[derive(Clone)]
pub struct GeminiService {
    model: Arc<dyn GenerativeModel>,
    tools: Arc<ToolRegistry>,
    settings: Arc<ServiceSettings>,
}

impl std::fmt::Debug for GeminiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiService")
            .field("tools", &self.tools)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl GeminiService {
    pub fn new(model: Arc<dyn GenerativeModel>, settings: ServiceSettings) -> Self {
        Self {
            model,
            tools: Arc::new(ToolRegistry::new().with(Multiply)),
            settings: Arc::new(settings),
        }
    }

    /// Plain prompt to text.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, GeminiError> {
        let resp = self.model.generate_content(GenerateContentRequest::prompt(prompt)).await?;
        expect_text(&resp)
    }

    /// Prompt constrained to `schema`; the JSON answer is parsed.
    pub async fn generate_structured(
        &self,
        prompt: &str,
        schema: ResponseSchema,
    ) -> Result<Value, GeminiError> {
        let req = GenerateContentRequest::prompt(prompt)
            .with_generation_config(GenerationConfig::structured(schema.schema()));
        let resp = self.model.generate_content(req).await?;
        let text = expect_text(&resp)?;
        debug!(%schema, len = text.len(), "parsing structured response");
        Ok(serde_json::from_str(&text)?)
    }

    /// Prompt plus an inline image (JPEG, PNG or WEBP).
    pub async fn generate_with_image(
        &self,
        prompt: &str,
        image: &FileUpload,
    ) -> Result<String, GeminiError> {
        let media = MediaType::from_mime(&image.mime_type)?;
        if !media.is_image() {
            return Err(GeminiError::UnsupportedMediaType(image.mime_type.clone()));
        }
        let parts = vec![
            Part::text(prompt),
            Part::inline_data(media.mime(), STANDARD.encode(&image.bytes)),
        ];
        let req = GenerateContentRequest::new(vec![Content::new(Role::User, parts)]);
        let resp = self.model.generate_content(req).await?;
        expect_text(&resp)
    }

    /// Upload `upload`, wait for it to be processed, then ask about it.
    pub async fn analyze_file(
        &self,
        prompt: &str,
        upload: FileUpload,
        cancel: &CancellationToken,
    ) -> Result<String, GeminiError> {
        let file_name = upload.file_name.clone();
        let file = ingest(self.model.as_ref(), upload, &self.settings.poll, cancel, |phase| {
            if let IngestPhase::Processing { attempt } = phase {
                debug!(%file_name, attempt, "waiting for remote processing");
            }
        })
        .await?;

        let parts = vec![Part::text(prompt), file.to_part()];
        let req = GenerateContentRequest::new(vec![Content::new(Role::User, parts)]);
        let resp = self.model.generate_content(req).await?;
        expect_text(&resp)
    }

    /// Continue a conversation: prior exchanges are replayed before `prompt`.
    pub async fn chat(&self, prompt: &str, history: &[Exchange]) -> Result<String, GeminiError> {
        let mut contents = assemble_history(history);
        contents.push(Content::user_text(prompt));
        debug!(turns = contents.len(), "sending chat turn");
        let resp = self.model.generate_content(GenerateContentRequest::new(contents)).await?;
        expect_text(&resp)
    }

    pub async fn stream_text(&self, prompt: &str) -> Result<TextStream, GeminiError> {
        self.model
            .stream_generate_content(GenerateContentRequest::prompt(prompt))
            .await
    }

    /// Single tool round: if the model asks for a registered function, run it
    /// locally and send the result back as a follow-up turn.
    pub async fn call_function(&self, prompt: &str) -> Result<String, GeminiError> {
        let tools = vec![self.tools.as_tool()];
        let mut contents = vec![Content::user_text(prompt)];

        let first = self
            .model
            .generate_content(GenerateContentRequest::new(contents.clone()).with_tools(tools.clone()))
            .await?;
        let Some(call) = first.function_calls().next().cloned() else {
            return expect_text(&first);
        };

        let result = self.tools.invoke(&call.name, &call.args)?;
        info!(tool = %call.name, %result, "executed local tool");

        if let Some(model_turn) = first.first_content() {
            contents.push(model_turn.clone());
        }
        contents.push(Content::function_response(call.name, result));

        let resp = self
            .model
            .generate_content(GenerateContentRequest::new(contents).with_tools(tools))
            .await?;
        expect_text(&resp)
    }

    pub async fn count_tokens(&self, prompt: &str) -> Result<u32, GeminiError> {
        self.model.count_tokens(vec![Content::user_text(prompt)]).await
    }

    /// Prompt with the tuned sampling preset and safety thresholds.
    pub async fn generate_with_config(&self, prompt: &str) -> Result<String, GeminiError> {
        let req = GenerateContentRequest::prompt(prompt)
            .with_generation_config(self.settings.tuned_generation.clone())
            .with_safety_settings(self.settings.safety.clone());
        let resp = self.model.generate_content(req).await?;
        expect_text(&resp)
    }
}

fn expect_text(resp: &GenerateContentResponse) -> Result<String, GeminiError> {
    resp.text().ok_or(GeminiError::EmptyResponse)
}
