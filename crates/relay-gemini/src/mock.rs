//! A scripted, call-recording [`GenerativeModel`] for tests.
//!
//! Replies are consumed in FIFO order. Every call is recorded before it is
//! answered, so tests can assert both how often the model was reached and
//! with which payloads.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::GeminiError;
use crate::model::{GenerativeModel, TextStream};
use crate::types::{
    Content, FileState, FileUpload, GenerateContentRequest, GenerateContentResponse, RemoteFile,
};

/// One observed adapter call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Generate(GenerateContentRequest),
    Stream(GenerateContentRequest),
    CountTokens(Vec<Content>),
    Upload { file_name: String, mime_type: String, size: usize },
    GetFile(String),
}

#[derive(Debug)]
struct Script {
    replies: VecDeque<Result<GenerateContentResponse, GeminiError>>,
    streams: VecDeque<Vec<Result<String, GeminiError>>>,
    token_count: u32,
    file_states: VecDeque<FileState>,
    last_state: FileState,
    uploaded: Option<(String, String)>,
    calls: Vec<RecordedCall>,
}

#[derive(Debug)]
pub struct ScriptedModel {
    script: Mutex<Script>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                replies: VecDeque::new(),
                streams: VecDeque::new(),
                token_count: 0,
                file_states: VecDeque::new(),
                last_state: FileState::Active,
                uploaded: None,
                calls: Vec::new(),
            }),
        }
    }

    /// Queue a text reply for the next `generate_content`.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_reply(Ok(GenerateContentResponse::from_text(text)))
    }

    pub fn with_reply(self, reply: Result<GenerateContentResponse, GeminiError>) -> Self {
        self.lock().replies.push_back(reply);
        self
    }

    /// Queue the fragments of the next `stream_generate_content`.
    pub fn with_stream(self, fragments: Vec<Result<String, GeminiError>>) -> Self {
        self.lock().streams.push_back(fragments);
        self
    }

    pub fn with_token_count(self, n: u32) -> Self {
        self.lock().token_count = n;
        self
    }

    /// States reported by `upload_file` then each `get_file`; the last one repeats.
    pub fn with_file_states(self, states: impl IntoIterator<Item = FileState>) -> Self {
        {
            let mut script = self.lock();
            script.file_states = states.into_iter().collect();
            if let Some(last) = script.file_states.back() {
                script.last_state = *last;
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Payloads of every `generate_content` call, in order.
    pub fn generate_requests(&self) -> Vec<GenerateContentRequest> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Generate(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remote_file(script: &mut Script) -> RemoteFile {
        let state = script.file_states.pop_front().unwrap_or(script.last_state);
        let (file_name, mime_type) = script.uploaded.clone().unwrap_or_default();
        RemoteFile {
            name: format!("files/{file_name}"),
            display_name: Some(file_name.clone()),
            mime_type: Some(mime_type),
            uri: format!("https://mock.invalid/v1beta/files/{file_name}"),
            state,
        }
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let mut script = self.lock();
        script.calls.push(RecordedCall::Generate(request));
        script
            .replies
            .pop_front()
            .unwrap_or_else(|| Err(GeminiError::invalid_response("no scripted reply left")))
    }

    async fn stream_generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<TextStream, GeminiError> {
        let mut script = self.lock();
        script.calls.push(RecordedCall::Stream(request));
        let fragments = script
            .streams
            .pop_front()
            .ok_or_else(|| GeminiError::invalid_response("no scripted stream left"))?;
        Ok(futures::stream::iter(fragments).boxed())
    }

    async fn count_tokens(&self, contents: Vec<Content>) -> Result<u32, GeminiError> {
        let mut script = self.lock();
        script.calls.push(RecordedCall::CountTokens(contents));
        Ok(script.token_count)
    }

    async fn upload_file(&self, upload: FileUpload) -> Result<RemoteFile, GeminiError> {
        let mut script = self.lock();
        script.calls.push(RecordedCall::Upload {
            file_name: upload.file_name.clone(),
            mime_type: upload.mime_type.clone(),
            size: upload.bytes.len(),
        });
        script.uploaded = Some((upload.file_name, upload.mime_type));
        Ok(Self::remote_file(&mut script))
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, GeminiError> {
        let mut script = self.lock();
        script.calls.push(RecordedCall::GetFile(name.to_owned()));
        Ok(Self::remote_file(&mut script))
    }
}
