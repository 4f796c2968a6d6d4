use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::draft::{DRAFT_TITLE_PREFIX, DraftArtifact, amendment_blocks, word_count};
use crate::engine::{ContentEngine, Research, ResearchRequest};
use crate::error::{PipelineError, Stage};
use crate::handoff::{HandoffCache, HandoffEntry, PublishPayload};
use crate::notify::Notifier;
use crate::publish::{PublishAttemptResult, PublishTargets};
use crate::state_machine::{JobPatch, JobStatus, NewJob, RunOptions, short_id};
use crate::store::{CreateOutcome, TaskStore, find_active_by_topic};

/// Critique/revise rounds before the last draft is accepted as-is.
pub const QA_MAX_CYCLES: u32 = 2;

/// Wall-clock limits for detached execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub run: Duration,
    pub publish: Duration,
    pub amend: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            run: Duration::from_secs(600),
            publish: Duration::from_secs(600),
            amend: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub topic: String,
    pub context: Option<String>,
    pub options: RunOptions,
}

impl RunRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            context: None,
            options: RunOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    pub word_count: u32,
    /// Score of the last critique. When the QA cycle limit is hit, that
    /// critique judged the body before its final revision.
    pub quality_score: f64,
    pub lookups_used: u32,
    pub cost_usd: f64,
    pub qa_cycles: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewReady {
    pub job_id: String,
    pub title: String,
    pub draft_url: String,
    pub metrics: RunMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateJob {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

impl DuplicateJob {
    fn new(topic: &str, job_id: String, status: JobStatus) -> Self {
        let short = short_id(&job_id);
        let mut message = format!("\"{topic}\" is already in progress as {short} (status: {status})");
        if status == JobStatus::Review {
            message.push_str(&format!(". Approve it with `approve {short}`"));
        }
        Self {
            job_id,
            status,
            message,
        }
    }
}

#[derive(Debug)]
pub struct RunFailure {
    /// Absent when the run failed before a job was created.
    pub job_id: Option<String>,
    pub error: PipelineError,
}

impl RunFailure {
    pub fn stage(&self) -> Option<Stage> {
        match &self.error {
            PipelineError::StageFailure { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    ReadyForReview(ReviewReady),
    Duplicate(DuplicateJob),
    Failed(RunFailure),
}

impl RunOutcome {
    pub fn error_code(&self) -> &'static str {
        match self {
            RunOutcome::ReadyForReview(_) => "ready_for_review",
            RunOutcome::Duplicate(_) => "duplicate",
            RunOutcome::Failed(failure) => failure.error.code(),
        }
    }

    pub fn into_result(self) -> Result<ReviewReady, PipelineError> {
        match self {
            RunOutcome::ReadyForReview(ready) => Ok(ready),
            RunOutcome::Duplicate(dup) => Err(PipelineError::DuplicateJob {
                job_id: dup.job_id,
                status: dup.status,
            }),
            RunOutcome::Failed(failure) => Err(failure.error),
        }
    }

    fn notification(&self, topic: &str) -> String {
        match self {
            RunOutcome::ReadyForReview(ready) => {
                let short = short_id(&ready.job_id);
                format!(
                    "Ready for review: {} ({short})\nDraft: {}\nApprove with: approve {short}",
                    ready.title, ready.draft_url
                )
            }
            RunOutcome::Duplicate(dup) => dup.message.clone(),
            RunOutcome::Failed(failure) => match &failure.job_id {
                Some(id) => format!("Run {} for \"{topic}\" failed: {}", short_id(id), failure.error),
                None => format!("Run for \"{topic}\" failed: {}", failure.error),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishReport {
    pub job_id: String,
    pub title: String,
    pub results: Vec<PublishAttemptResult>,
    pub published_url: Option<String>,
    pub audio_generated: bool,
}

impl PublishReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn message(&self) -> String {
        let short = short_id(&self.job_id);
        if self.succeeded() == 0 {
            return format!(
                "Published {} ({short}) but no publish action succeeded",
                self.title
            );
        }
        format!(
            "Published {} ({short}): {}, {}/{} actions succeeded",
            self.title,
            self.published_url.as_deref().unwrap_or("no public URL"),
            self.succeeded(),
            self.results.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmendReport {
    pub job_id: String,
    pub title: String,
    pub draft_url: String,
    pub blocks_added: usize,
    pub word_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingReview {
    pub job_id: String,
    pub title: String,
    pub topic: String,
    pub stored_at: DateTime<Utc>,
    pub reconstructed: bool,
}

/// Drives jobs from a topic to a draft in review, and from approval to
/// published artifacts.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn TaskStore>,
    engine: Arc<dyn ContentEngine>,
    notifier: Arc<dyn Notifier>,
    targets: PublishTargets,
    cache: Arc<HandoffCache>,
    timeouts: Timeouts,
}

fn stage_error(stage: Stage) -> impl FnOnce(crate::error::EngineError) -> PipelineError {
    move |err| PipelineError::StageFailure {
        stage,
        message: err.to_string(),
    }
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn TaskStore>,
        engine: Arc<dyn ContentEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            engine,
            notifier,
            targets: PublishTargets::default(),
            cache: Arc::new(HandoffCache::new()),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_targets(mut self, targets: PublishTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn cache(&self) -> &HandoffCache {
        &self.cache
    }

    /// Rebuild the handoff cache from jobs awaiting review. Never fails.
    pub async fn start(&self) -> usize {
        match self.cache.reconcile_all(self.store.as_ref()).await {
            Ok(added) => added,
            Err(err) => {
                warn!(error = %err, "startup reconciliation failed");
                0
            }
        }
    }

    // ── run ─────────────────────────────────────────────────────────

    /// Take a topic through research, drafting and QA into review.
    /// Sends exactly one notification and never returns an error.
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        let topic = request.topic.trim().to_string();
        let outcome = self.execute_run(&topic, &request).await;
        match &outcome {
            RunOutcome::ReadyForReview(ready) => {
                info!(job_id = %ready.job_id, "job ready for review")
            }
            RunOutcome::Duplicate(dup) => info!(job_id = %dup.job_id, status = %dup.status, "duplicate topic"),
            RunOutcome::Failed(failure) => warn!(
                job_id = failure.job_id.as_deref().unwrap_or("-"),
                code = failure.error.code(),
                error = %failure.error,
                "run failed"
            ),
        }
        self.notifier.send(&outcome.notification(&topic)).await;
        outcome
    }

    async fn execute_run(&self, topic: &str, request: &RunRequest) -> RunOutcome {
        if topic.is_empty() {
            return RunOutcome::Failed(RunFailure {
                job_id: None,
                error: PipelineError::InvalidInput("topic must not be empty".into()),
            });
        }

        // Not transactional: two concurrent runs may both pass this check.
        // The store's own create-time check narrows the window.
        match find_active_by_topic(self.store.as_ref(), topic).await {
            Ok(Some(job)) => return RunOutcome::Duplicate(DuplicateJob::new(topic, job.id, job.status)),
            Ok(None) => {}
            Err(err) => {
                return RunOutcome::Failed(RunFailure {
                    job_id: None,
                    error: err.into(),
                });
            }
        }

        let new_job = NewJob {
            topic: topic.to_string(),
            content_type: request.options.content_type,
            audience: request.options.audience.clone(),
            notes: request.context.clone(),
        };
        let job_id = match self.store.create_record(topic, &new_job).await {
            Ok(CreateOutcome::Created(id)) => id,
            Ok(CreateOutcome::Exists(id)) => {
                let status = match self.store.get_record(&id).await {
                    Ok(Some(job)) => job.status,
                    _ => JobStatus::Idea,
                };
                return RunOutcome::Duplicate(DuplicateJob::new(topic, id, status));
            }
            Err(err) => {
                return RunOutcome::Failed(RunFailure {
                    job_id: None,
                    error: err.into(),
                });
            }
        };
        info!(job_id = %job_id, topic, "job created");

        match self.stages(&job_id, topic, request).await {
            Ok(ready) => RunOutcome::ReadyForReview(ready),
            Err(error) => {
                self.reject(&job_id).await;
                RunOutcome::Failed(RunFailure {
                    job_id: Some(job_id),
                    error,
                })
            }
        }
    }

    async fn stages(
        &self,
        job_id: &str,
        topic: &str,
        request: &RunRequest,
    ) -> Result<ReviewReady, PipelineError> {
        let options = &request.options;

        self.advance(job_id, JobPatch::status(JobStatus::Researching)).await?;
        let research_request = ResearchRequest {
            topic: topic.to_string(),
            context: request.context.clone(),
            max_lookups: options.max_lookups,
        };
        let research = match self.engine.research(&research_request).await {
            Ok(research) => research,
            Err(err) => {
                warn!(job_id, error = %err, "research failed, drafting without it");
                Research::default()
            }
        };
        let lookups_used = research.lookups_used();

        self.advance(
            job_id,
            JobPatch {
                status: Some(JobStatus::Drafting),
                lookups_used: Some(lookups_used),
                ..JobPatch::default()
            },
        )
        .await?;
        let draft = self
            .engine
            .generate(topic, &research, options.audience.as_deref(), options.content_type)
            .await
            .map_err(stage_error(Stage::Draft))?;

        self.advance(job_id, JobPatch::status(JobStatus::Qa)).await?;
        let mut body = draft.body;
        let mut qa_cycles = 0;
        let quality_score = loop {
            qa_cycles += 1;
            let critique = self
                .engine
                .critique(&body, topic)
                .await
                .map_err(stage_error(Stage::Qa))?;
            debug!(job_id, cycle = qa_cycles, score = critique.quality_score, "critique");
            if critique.passed() {
                break critique.quality_score;
            }
            body = self
                .engine
                .revise(&body, &critique.issues, topic)
                .await
                .map_err(stage_error(Stage::Qa))?;
            if qa_cycles >= QA_MAX_CYCLES {
                info!(job_id, "QA cycle limit reached, keeping the last revision");
                break critique.quality_score;
            }
        };

        let title = if draft.title.trim().is_empty() {
            topic.to_string()
        } else {
            draft.title.trim().to_string()
        };
        let script = if options.generate_audio {
            match self.engine.derive_script(&title, &body).await {
                Ok(script) => script,
                Err(err) => {
                    warn!(job_id, error = %err, "script derivation failed");
                    None
                }
            }
        } else {
            None
        };

        let artifact = DraftArtifact {
            title: title.clone(),
            body,
            meta_description: draft.metadata.meta_description.clone(),
            script,
        };
        let persist = |err: crate::error::StoreError| PipelineError::StageFailure {
            stage: Stage::Persist,
            message: err.to_string(),
        };
        let document = self
            .store
            .create_child_document(job_id, &artifact.document_title(), &artifact.to_blocks())
            .await
            .map_err(persist)?;

        let metrics = RunMetrics {
            word_count: word_count(&artifact.body),
            quality_score,
            lookups_used,
            cost_usd: research.cost_usd + draft.metadata.cost_usd,
            qa_cycles,
        };
        self.store
            .update_record(
                job_id,
                &JobPatch {
                    status: Some(JobStatus::Review),
                    title: Some(title.clone()),
                    quality_score: Some(metrics.quality_score),
                    word_count: Some(metrics.word_count),
                    cost_usd: Some(metrics.cost_usd),
                    draft_artifact_ref: Some(document.url.clone()),
                    ..JobPatch::default()
                },
            )
            .await
            .map_err(persist)?;

        self.cache.insert(HandoffEntry::new(
            job_id,
            PublishPayload {
                title: title.clone(),
                body: artifact.body,
                meta_description: artifact.meta_description,
                excerpt: draft.metadata.excerpt,
                topic: topic.to_string(),
                research,
                script: artifact.script,
                generate_audio: options.generate_audio,
            },
        ));

        Ok(ReviewReady {
            job_id: job_id.to_string(),
            title,
            draft_url: document.url,
            metrics,
        })
    }

    async fn advance(&self, job_id: &str, patch: JobPatch) -> Result<(), PipelineError> {
        self.store.update_record(job_id, &patch).await?;
        if let Some(status) = patch.status {
            info!(job_id, %status, "stage");
        }
        Ok(())
    }

    async fn reject(&self, job_id: &str) {
        if let Err(err) = self
            .store
            .update_record(job_id, &JobPatch::status(JobStatus::Rejected))
            .await
        {
            warn!(job_id, error = %err, "could not mark job rejected");
        }
    }

    // ── resolution ──────────────────────────────────────────────────

    /// The single cached job id matching `prefix`. Reconciles with the
    /// store once before giving up.
    pub async fn resolve(&self, prefix: &str) -> Result<String, PipelineError> {
        let mut matches = self.cache.resolve(prefix);
        if matches.is_empty() {
            if let Err(err) = self.cache.reconcile_all(self.store.as_ref()).await {
                warn!(error = %err, "reconciliation during lookup failed");
            }
            matches = self.cache.resolve(prefix);
        }
        match matches.len() {
            0 => Err(PipelineError::NotFound(prefix.to_string())),
            1 => Ok(matches.remove(0)),
            count => Err(PipelineError::Ambiguous {
                prefix: prefix.to_string(),
                count,
            }),
        }
    }

    // ── publish ─────────────────────────────────────────────────────

    /// Approve a job in review and fan it out to the publish targets.
    /// Sends exactly one closing notification.
    pub async fn publish(&self, prefix: &str) -> Result<PublishReport, PipelineError> {
        let result = self.execute_publish(prefix).await;
        let message = match &result {
            Ok(report) => report.message(),
            Err(err) => format!("Publish of `{prefix}` failed: {err}"),
        };
        self.notifier.send(&message).await;
        result
    }

    async fn execute_publish(&self, prefix: &str) -> Result<PublishReport, PipelineError> {
        let job_id = self.resolve(prefix).await?;
        // Claimed entries are invisible to other callers until released.
        let entry = self
            .cache
            .claim_or_reconstruct(self.store.as_ref(), &job_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(prefix.to_string()))?;

        if let Err(err) = self.advance(&job_id, JobPatch::status(JobStatus::Approved)).await {
            self.cache.restore(entry);
            return Err(err);
        }
        let summary = self.targets.fan_out(&job_id, &entry.payload).await;

        let patch = JobPatch {
            status: Some(JobStatus::Published),
            publish_target_url: summary.published_url.clone(),
            published_at: Some(Utc::now().date_naive()),
            audio_generated: Some(summary.audio_generated()),
            ..JobPatch::default()
        };
        // The fan-out already happened; a job must not stay at Approved.
        if let Err(err) = self.store.update_record(&job_id, &patch).await {
            warn!(job_id = %job_id, error = %err, "final status write failed, retrying once");
            if let Err(err) = self.store.update_record(&job_id, &patch).await {
                self.cache.release(&job_id);
                return Err(err.into());
            }
        }
        self.cache.release(&job_id);
        info!(job_id = %job_id, succeeded = summary.any_succeeded(), "job published");

        Ok(PublishReport {
            job_id,
            title: entry.payload.title,
            audio_generated: summary.audio_generated(),
            published_url: summary.published_url,
            results: summary.results,
        })
    }

    // ── amend ───────────────────────────────────────────────────────

    /// Append an addition to a job's draft document. The job stays in review.
    pub async fn amend(&self, prefix: &str, instruction: &str) -> Result<AmendReport, PipelineError> {
        let result = self.execute_amend(prefix, instruction).await;
        let message = match &result {
            Ok(report) => format!(
                "Amended {} ({}): {} blocks added\nDraft: {}",
                report.title,
                short_id(&report.job_id),
                report.blocks_added,
                report.draft_url
            ),
            Err(err) => format!("Amendment of `{prefix}` failed: {err}"),
        };
        self.notifier.send(&message).await;
        result
    }

    async fn execute_amend(
        &self,
        prefix: &str,
        instruction: &str,
    ) -> Result<AmendReport, PipelineError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(PipelineError::InvalidInput(
                "amendment instruction must not be empty".into(),
            ));
        }
        let job_id = self.resolve(prefix).await?;
        let entry = self
            .cache
            .get_or_reconstruct(self.store.as_ref(), &job_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(prefix.to_string()))?;
        let document = self
            .store
            .find_child_document(&job_id, DRAFT_TITLE_PREFIX)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("draft of {}", short_id(&job_id))))?;

        let addition = self.engine.extend(&entry.payload.title, instruction).await?;
        let blocks = amendment_blocks(instruction, &addition);
        self.store.append_blocks(&document.id, &blocks).await?;

        let addition = addition.trim().to_string();
        self.cache.update_body(&job_id, |body| {
            body.push_str("\n\n");
            body.push_str(&addition);
        });
        let words = word_count(&entry.payload.body) + word_count(&addition);
        let patch = JobPatch {
            word_count: Some(words),
            ..JobPatch::default()
        };
        if let Err(err) = self.store.update_record(&job_id, &patch).await {
            warn!(job_id = %job_id, error = %err, "word count update failed");
        }
        info!(job_id = %job_id, blocks = blocks.len(), "draft amended");

        Ok(AmendReport {
            job_id,
            title: entry.payload.title,
            draft_url: document.url,
            blocks_added: blocks.len(),
            word_count: words,
        })
    }

    // ── listing ─────────────────────────────────────────────────────

    /// Jobs awaiting review, oldest first.
    pub async fn list_pending(&self) -> Vec<PendingReview> {
        if let Err(err) = self.cache.reconcile_all(self.store.as_ref()).await {
            warn!(error = %err, "reconciliation before listing failed");
        }
        self.cache
            .entries()
            .into_iter()
            .map(|entry| PendingReview {
                job_id: entry.job_id,
                title: entry.payload.title,
                topic: entry.payload.topic,
                stored_at: entry.stored_at,
                reconstructed: entry.reconstructed,
            })
            .collect()
    }

    // ── detached execution ──────────────────────────────────────────

    /// Run on a separate task, waiting at most the run timeout. A timed-out
    /// run keeps going in the background and may still write to the store.
    pub async fn run_detached(&self, request: RunRequest) -> Result<RunOutcome, PipelineError> {
        let pipeline = self.clone();
        let handle = tokio::spawn(async move { pipeline.run(request).await });
        join_within(handle, self.timeouts.run).await
    }

    pub async fn publish_detached(&self, prefix: &str) -> Result<PublishReport, PipelineError> {
        let pipeline = self.clone();
        let prefix = prefix.to_string();
        let handle = tokio::spawn(async move { pipeline.publish(&prefix).await });
        join_within(handle, self.timeouts.publish).await?
    }

    pub async fn amend_detached(
        &self,
        prefix: &str,
        instruction: &str,
    ) -> Result<AmendReport, PipelineError> {
        let pipeline = self.clone();
        let prefix = prefix.to_string();
        let instruction = instruction.to_string();
        let handle = tokio::spawn(async move { pipeline.amend(&prefix, &instruction).await });
        join_within(handle, self.timeouts.amend).await?
    }
}

async fn join_within<T>(handle: JoinHandle<T>, limit: Duration) -> Result<T, PipelineError> {
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_err)) => Err(PipelineError::Worker(join_err.to_string())),
        Err(_) => {
            warn!(limit_secs = limit.as_secs(), "task exceeded its time limit, leaving it running");
            Err(PipelineError::Timeout(limit.as_secs()))
        }
    }
}
