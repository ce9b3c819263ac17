//! Upload a local asset and wait until the provider can use it.
//!
//! ```text
//! Uploading ──► Processing{1..n} ──► Ready
//!                     │
//!                     └──► FAILED / timeout / cancelled
//! ```

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use strum::{AsRefStr, Display, EnumIter, EnumString};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GeminiError;
use crate::model::GenerativeModel;
use crate::types::{FileState, FileUpload, Part};

/// Content types accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, EnumIter)]
pub enum MediaType {
    #[strum(serialize = "application/pdf")]
    Pdf,
    #[strum(serialize = "video/mp4")]
    Mp4,
    #[strum(serialize = "image/jpeg")]
    Jpeg,
    #[strum(serialize = "image/png")]
    Png,
    #[strum(serialize = "image/webp")]
    Webp,
}

impl MediaType {
    /// Resolve a declared content type; parameters (`; charset=...`) and case are ignored.
    pub fn from_mime(mime: &str) -> Result<Self, GeminiError> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        Self::from_str(&essence).map_err(|_| GeminiError::UnsupportedMediaType(mime.to_owned()))
    }

    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Mp4 => "video/mp4",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Webp => "image/webp",
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, MediaType::Jpeg | MediaType::Png | MediaType::Webp)
    }
}

/// Bounds of the wait-until-ready loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Status checks after the upload itself.
    pub max_attempts: u32,
    /// Wall-clock budget measured from the start of the upload.
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 30,
            deadline: Duration::from_secs(10 * 60),
        }
    }
}

impl PollPolicy {
    /// Delay before status check number `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let secs = (self.initial_interval.as_secs_f64() * factor).min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Progress notifications emitted by [`ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    Uploading,
    /// About to wait before status check number `attempt`.
    Processing { attempt: u32 },
    Ready,
}

/// A processed remote file, usable in generation requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRef {
    pub uri: String,
    pub mime_type: String,
}

impl RemoteFileRef {
    pub fn to_part(&self) -> Part {
        Part::file_data(self.mime_type.clone(), self.uri.clone())
    }
}

/// Upload `upload` and poll its state until the provider reports it ACTIVE.
///
/// The content type is checked before any call reaches `model`. Waiting
/// backs off exponentially per `policy` and stops early on `cancel`;
/// dropping the returned future abandons the wait as well.
pub async fn ingest(
    model: &dyn GenerativeModel,
    upload: FileUpload,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut on_phase: impl FnMut(IngestPhase) + Send,
) -> Result<RemoteFileRef, GeminiError> {
    let media = MediaType::from_mime(&upload.mime_type)?;
    let file_name = upload.file_name.clone();
    let deadline = Instant::now() + policy.deadline;

    on_phase(IngestPhase::Uploading);
    let mut file = until_cancelled(cancel, model.upload_file(upload)).await?;
    debug!(%file_name, remote = %file.name, state = ?file.state, "file uploaded");

    let mut attempt = 0;
    loop {
        match file.state {
            FileState::Active => break,
            FileState::Failed => {
                warn!(%file_name, remote = %file.name, "remote processing failed");
                return Err(GeminiError::FileProcessingFailed { file_name });
            }
            FileState::Processing | FileState::StateUnspecified => {}
        }

        let delay = policy.delay_for(attempt);
        if attempt >= policy.max_attempts || Instant::now() + delay > deadline {
            warn!(%file_name, attempts = attempt, "gave up waiting for file processing");
            return Err(GeminiError::IngestTimeout {
                file_name,
                attempts: attempt,
            });
        }

        attempt += 1;
        on_phase(IngestPhase::Processing { attempt });
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GeminiError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        file = until_cancelled(cancel, model.get_file(&file.name)).await?;
        debug!(%file_name, attempt, state = ?file.state, "polled file state");
    }

    if file.uri.is_empty() {
        return Err(GeminiError::invalid_response(format!(
            "file {} is ACTIVE but has no uri",
            file.name
        )));
    }
    info!(%file_name, attempts = attempt, "file ready");
    on_phase(IngestPhase::Ready);
    Ok(RemoteFileRef {
        uri: file.uri,
        mime_type: file.mime_type.unwrap_or_else(|| media.mime().to_owned()),
    })
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, GeminiError>>,
) -> Result<T, GeminiError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GeminiError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordedCall, ScriptedModel};
    use bytes::Bytes;
    use strum::IntoEnumIterator;
    use tracing_test::traced_test;

    fn upload(name: &str, mime: &str) -> FileUpload {
        FileUpload {
            file_name: name.into(),
            mime_type: mime.into(),
            bytes: Bytes::from_static(b"payload"),
        }
    }

    fn polls(model: &ScriptedModel) -> usize {
        model
            .calls()
            .iter()
            .filter(|c| matches!(c, RecordedCall::GetFile(_)))
            .count()
    }

    #[test]
    fn media_types_round_trip_and_ignore_parameters() {
        for media in MediaType::iter() {
            assert_eq!(MediaType::from_mime(media.mime()).unwrap(), media);
            assert_eq!(media.as_ref(), media.mime());
        }
        assert_eq!(MediaType::from_mime("Image/PNG; q=1").unwrap(), MediaType::Png);
        assert!(MediaType::Webp.is_image());
        assert!(!MediaType::Mp4.is_image());
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(16));
        assert_eq!(policy.delay_for(4), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn unsupported_type_fails_without_any_call() {
        let model = ScriptedModel::new();
        let err = ingest(
            &model,
            upload("notes.txt", "text/plain"),
            &PollPolicy::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GeminiError::UnsupportedMediaType(ref m) if m == "text/plain"));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_with_backoff_until_active() {
        let model = ScriptedModel::new().with_file_states([
            FileState::Processing,
            FileState::Processing,
            FileState::Active,
        ]);
        let mut phases = Vec::new();
        let started = Instant::now();

        let file = ingest(
            &model,
            upload("clip.mp4", "video/mp4"),
            &PollPolicy::default(),
            &CancellationToken::new(),
            |p| phases.push(p),
        )
        .await
        .unwrap();

        assert_eq!(file.mime_type, "video/mp4");
        assert!(file.uri.ends_with("clip.mp4"));
        assert_eq!(
            phases,
            vec![
                IngestPhase::Uploading,
                IngestPhase::Processing { attempt: 1 },
                IngestPhase::Processing { attempt: 2 },
                IngestPhase::Ready,
            ]
        );
        assert_eq!(polls(&model), 2);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn already_active_upload_is_not_polled() {
        let model = ScriptedModel::new().with_file_states([FileState::Active]);
        let file = ingest(
            &model,
            upload("photo.png", "image/png"),
            &PollPolicy::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();
        assert_eq!(file.to_part().file_data.unwrap().mime_type, "image/png");
        assert_eq!(polls(&model), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_state_names_the_original_file() {
        let model = ScriptedModel::new().with_file_states([FileState::Processing, FileState::Failed]);
        let err = ingest(
            &model,
            upload("broken.pdf", "application/pdf"),
            &PollPolicy::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GeminiError::FileProcessingFailed { ref file_name } if file_name == "broken.pdf"));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_attempts() {
        let model = ScriptedModel::new().with_file_states([FileState::Processing]);
        let policy = PollPolicy {
            max_attempts: 3,
            ..PollPolicy::default()
        };
        let err = ingest(&model, upload("slow.mp4", "video/mp4"), &policy, &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::IngestTimeout { attempts: 3, .. }));
        assert_eq!(polls(&model), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_before_sleeping_past_the_deadline() {
        let model = ScriptedModel::new().with_file_states([FileState::Processing]);
        let policy = PollPolicy {
            deadline: Duration::from_secs(5),
            ..PollPolicy::default()
        };
        let err = ingest(&model, upload("slow.mp4", "video/mp4"), &policy, &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        // 2s first wait fits, the 4s second wait would end at t=6s.
        assert!(matches!(err, GeminiError::IngestTimeout { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let model = ScriptedModel::new().with_file_states([FileState::Processing]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let err = ingest(&model, upload("clip.mp4", "video/mp4"), &PollPolicy::default(), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Cancelled));
        assert_eq!(polls(&model), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_skips_the_upload() {
        let model = ScriptedModel::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ingest(&model, upload("a.pdf", "application/pdf"), &PollPolicy::default(), &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Cancelled));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn logs_readiness() {
        let model = ScriptedModel::new().with_file_states([FileState::Processing, FileState::Active]);
        ingest(&model, upload("doc.pdf", "application/pdf"), &PollPolicy::default(), &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert!(logs_contain("file ready"));
    }
}
