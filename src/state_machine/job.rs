use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::state::JobStatus;

/// The kind of piece a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Article,
    Podcast,
    LinkedIn,
    Thread,
    Newsletter,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Article => write!(f, "Article"),
            ContentType::Podcast => write!(f, "Podcast"),
            ContentType::LinkedIn => write!(f, "LinkedIn"),
            ContentType::Thread => write!(f, "Thread"),
            ContentType::Newsletter => write!(f, "Newsletter"),
        }
    }
}

impl ContentType {
    /// Unknown names fall back to `Article`.
    pub fn parse(raw: &str) -> ContentType {
        match raw.trim().to_lowercase().as_str() {
            "podcast" => ContentType::Podcast,
            "linkedin" => ContentType::LinkedIn,
            "thread" => ContentType::Thread,
            "newsletter" => ContentType::Newsletter,
            _ => ContentType::Article,
        }
    }
}

/// Per-run knobs supplied with a work request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub content_type: ContentType,
    pub audience: Option<String>,
    /// Maximum number of external lookups the research stage may spend.
    pub max_lookups: u32,
    /// Whether the publish phase should synthesize audio.
    pub generate_audio: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            content_type: ContentType::Article,
            audience: None,
            max_lookups: 6,
            generate_audio: true,
        }
    }
}

/// A single content job as recorded in the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub topic: String,
    pub content_type: ContentType,
    pub audience: Option<String>,
    pub status: JobStatus,
    pub title: String,
    pub quality_score: Option<f64>,
    pub word_count: Option<u32>,
    pub lookups_used: Option<u32>,
    pub cost_usd: Option<f64>,
    pub draft_artifact_ref: Option<String>,
    pub publish_target_url: Option<String>,
    pub published_at: Option<NaiveDate>,
    pub audio_generated: bool,
    pub last_edited: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh record at `Idea`, titled after its topic.
    pub fn new(id: String, new_job: &NewJob) -> Self {
        Self {
            id,
            topic: new_job.topic.clone(),
            content_type: new_job.content_type,
            audience: new_job.audience.clone(),
            status: JobStatus::Idea,
            title: new_job.topic.clone(),
            quality_score: None,
            word_count: None,
            lookups_used: None,
            cost_usd: None,
            draft_artifact_ref: None,
            publish_target_url: None,
            published_at: None,
            audio_generated: false,
            last_edited: Some(Utc::now()),
        }
    }

    /// First eight characters of the id, the form shown to reviewers.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Same dedup key: topics compare trimmed and case-insensitively.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topic.trim().eq_ignore_ascii_case(topic.trim())
    }

    /// Apply a patch locally, mirroring what a store write does.
    pub fn apply(&mut self, patch: &JobPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if patch.quality_score.is_some() {
            self.quality_score = patch.quality_score;
        }
        if patch.word_count.is_some() {
            self.word_count = patch.word_count;
        }
        if patch.lookups_used.is_some() {
            self.lookups_used = patch.lookups_used;
        }
        if patch.cost_usd.is_some() {
            self.cost_usd = patch.cost_usd;
        }
        if patch.draft_artifact_ref.is_some() {
            self.draft_artifact_ref = patch.draft_artifact_ref.clone();
        }
        if patch.publish_target_url.is_some() {
            self.publish_target_url = patch.publish_target_url.clone();
        }
        if patch.published_at.is_some() {
            self.published_at = patch.published_at;
        }
        if let Some(audio) = patch.audio_generated {
            self.audio_generated = audio;
        }
        self.last_edited = Some(Utc::now());
    }
}

/// The first eight characters of an id (or the whole id when shorter).
pub fn short_id(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(8)
        .map(|(idx, _)| idx)
        .unwrap_or(id.len());
    &id[..end]
}

/// Properties for a record about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub topic: String,
    pub content_type: ContentType,
    pub audience: Option<String>,
    pub notes: Option<String>,
}

/// A partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub title: Option<String>,
    pub quality_score: Option<f64>,
    pub word_count: Option<u32>,
    pub lookups_used: Option<u32>,
    pub cost_usd: Option<f64>,
    pub draft_artifact_ref: Option<String>,
    pub publish_target_url: Option<String>,
    pub published_at: Option<NaiveDate>,
    pub audio_generated: Option<bool>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(topic: &str) -> NewJob {
        NewJob {
            topic: topic.into(),
            content_type: ContentType::Article,
            audience: None,
            notes: None,
        }
    }

    #[test]
    fn job_creation_defaults() {
        let job = Job::new("abc".into(), &new_job("Rust async"));
        assert_eq!(job.status, JobStatus::Idea);
        assert_eq!(job.title, "Rust async");
        assert!(job.draft_artifact_ref.is_none());
        assert!(!job.audio_generated);
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut job = Job::new("abc".into(), &new_job("Rust async"));
        job.apply(&JobPatch {
            status: Some(JobStatus::Review),
            word_count: Some(1200),
            ..Default::default()
        });
        assert_eq!(job.status, JobStatus::Review);
        assert_eq!(job.word_count, Some(1200));
        assert_eq!(job.title, "Rust async");
        assert!(job.quality_score.is_none());
    }

    #[test]
    fn short_id_uses_first_eight_chars() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn topic_match_ignores_case_and_padding() {
        let job = Job::new("abc".into(), &new_job("Zero-day disclosure timelines"));
        assert!(job.has_topic("  zero-day DISCLOSURE timelines "));
        assert!(!job.has_topic("Zero-day disclosure"));
    }

    #[test]
    fn content_type_parse_falls_back_to_article() {
        assert_eq!(ContentType::parse("Newsletter"), ContentType::Newsletter);
        assert_eq!(ContentType::parse("tiktok"), ContentType::Article);
    }
}
