//! Publish fan-out: speech synthesis, content publishing and social posting.
//!
//! Each action is isolated. A failing action becomes a [`AttemptOutcome::Failed`]
//! result and never stops the remaining ones.

pub mod webhook;
pub mod wordpress;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::draft::render_html;
use crate::error::PublishError;
use crate::handoff::PublishPayload;

pub use webhook::WebhookSocialPoster;
pub use wordpress::WordPressPublisher;

#[async_trait]
pub trait SpeechSynth: Send + Sync {
    /// Synthesize `text` and return references to the uploaded audio files.
    async fn speech_upload(&self, text: &str) -> Result<Vec<String>, PublishError>;
}

#[async_trait]
pub trait ContentPublisher: Send + Sync {
    /// Publish rendered HTML and return the public URL.
    async fn content_publish(
        &self,
        title: &str,
        html: &str,
        meta_description: Option<&str>,
        audio_refs: &[String],
    ) -> Result<String, PublishError>;
}

#[async_trait]
pub trait SocialPoster: Send + Sync {
    /// Announce a published URL. `Ok(false)` means the target declined.
    async fn social_post(
        &self,
        title: &str,
        url: &str,
        excerpt: Option<&str>,
    ) -> Result<bool, PublishError>;
}

#[derive(Clone, Default)]
pub struct PublishTargets {
    /// No speech backend ships with the binary, so audio is reported as
    /// "not configured" unless one is wired in here.
    pub speech: Option<Arc<dyn SpeechSynth>>,
    pub content: Option<Arc<dyn ContentPublisher>>,
    pub social: Option<Arc<dyn SocialPoster>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Speech,
    ContentPublish,
    SocialPost,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Speech => "speech",
            ActionKind::ContentPublish => "content publish",
            ActionKind::SocialPost => "social post",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded(String),
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishAttemptResult {
    pub kind: ActionKind,
    pub outcome: AttemptOutcome,
}

impl PublishAttemptResult {
    fn succeeded(kind: ActionKind, reference: impl Into<String>) -> Self {
        Self {
            kind,
            outcome: AttemptOutcome::Succeeded(reference.into()),
        }
    }

    fn failed(kind: ActionKind, err: impl fmt::Display) -> Self {
        Self {
            kind,
            outcome: AttemptOutcome::Failed(err.to_string()),
        }
    }

    fn skipped(kind: ActionKind, reason: &str) -> Self {
        Self {
            kind,
            outcome: AttemptOutcome::Skipped(reason.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded(_))
    }
}

/// What the fan-out produced, ready to be written back to the job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanOutSummary {
    pub results: Vec<PublishAttemptResult>,
    pub published_url: Option<String>,
    pub audio_refs: Vec<String>,
}

impl FanOutSummary {
    pub fn audio_generated(&self) -> bool {
        !self.audio_refs.is_empty()
    }

    pub fn any_succeeded(&self) -> bool {
        self.results.iter().any(PublishAttemptResult::is_success)
    }
}

impl PublishTargets {
    /// Run every configured action in order for `job_id`.
    pub async fn fan_out(&self, job_id: &str, payload: &PublishPayload) -> FanOutSummary {
        let mut summary = FanOutSummary::default();

        let speech = match (&self.speech, payload.generate_audio) {
            (_, false) => PublishAttemptResult::skipped(ActionKind::Speech, "audio not requested"),
            (None, true) => PublishAttemptResult::skipped(ActionKind::Speech, "not configured"),
            (Some(synth), true) => {
                let text = payload.script.as_deref().unwrap_or(&payload.body);
                match synth.speech_upload(text).await {
                    Ok(refs) if refs.is_empty() => {
                        PublishAttemptResult::failed(ActionKind::Speech, "no audio produced")
                    }
                    Ok(refs) => {
                        let result = PublishAttemptResult::succeeded(ActionKind::Speech, refs.join(", "));
                        summary.audio_refs = refs;
                        result
                    }
                    Err(err) => PublishAttemptResult::failed(ActionKind::Speech, err),
                }
            }
        };
        log_result(job_id, &speech);
        summary.results.push(speech);

        let content = match &self.content {
            None => PublishAttemptResult::skipped(ActionKind::ContentPublish, "not configured"),
            Some(publisher) => {
                let html = render_html(&payload.body);
                match publisher
                    .content_publish(
                        &payload.title,
                        &html,
                        payload.meta_description.as_deref(),
                        &summary.audio_refs,
                    )
                    .await
                {
                    Ok(url) => {
                        summary.published_url = Some(url.clone());
                        PublishAttemptResult::succeeded(ActionKind::ContentPublish, url)
                    }
                    Err(err) => PublishAttemptResult::failed(ActionKind::ContentPublish, err),
                }
            }
        };
        log_result(job_id, &content);
        summary.results.push(content);

        let social = match (&self.social, summary.published_url.as_deref()) {
            (None, _) => PublishAttemptResult::skipped(ActionKind::SocialPost, "not configured"),
            (Some(_), None) => {
                PublishAttemptResult::skipped(ActionKind::SocialPost, "no published URL to share")
            }
            (Some(poster), Some(url)) => {
                let excerpt = payload.excerpt.as_deref().or(payload.meta_description.as_deref());
                match poster.social_post(&payload.title, url, excerpt).await {
                    Ok(true) => PublishAttemptResult::succeeded(ActionKind::SocialPost, url),
                    Ok(false) => PublishAttemptResult::failed(ActionKind::SocialPost, "post declined"),
                    Err(err) => PublishAttemptResult::failed(ActionKind::SocialPost, err),
                }
            }
        };
        log_result(job_id, &social);
        summary.results.push(social);

        summary
    }
}

fn log_result(job_id: &str, result: &PublishAttemptResult) {
    match &result.outcome {
        AttemptOutcome::Succeeded(reference) => {
            info!(job_id, action = %result.kind, reference = %reference, "publish action succeeded")
        }
        AttemptOutcome::Failed(err) => {
            warn!(job_id, action = %result.kind, error = %err, "publish action failed")
        }
        AttemptOutcome::Skipped(reason) => {
            info!(job_id, action = %result.kind, reason = %reason, "publish action skipped")
        }
    }
}
