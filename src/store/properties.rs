//! Property mapping between [`Job`] and semi-structured board records.
//!
//! Reads go through one accessor per field. Every accessor fails closed: a
//! missing or ill-typed property yields the field's default, never an error.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value, json};

use crate::state_machine::{ContentType, Job, JobPatch, JobStatus, NewJob};

pub const TITLE: &str = "Title";
pub const TOPIC: &str = "Topic";
pub const CONTENT_TYPE: &str = "Content Type";
pub const AUDIENCE: &str = "Audience";
pub const NOTES: &str = "Notes";
pub const STATUS: &str = "Status";
pub const QUALITY_SCORE: &str = "Quality Score";
pub const WORD_COUNT: &str = "Word Count";
pub const LOOKUPS_USED: &str = "URLs Browsed";
pub const COST_USD: &str = "Cost USD";
pub const DRAFT_PAGE: &str = "Draft Page";
pub const PUBLISHED_URL: &str = "WordPress URL";
pub const PUBLISHED_DATE: &str = "Published Date";
pub const AUDIO_GENERATED: &str = "Audio Generated";

/// Board label for a status.
pub fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Idea => "💡 Idea",
        JobStatus::Researching => "🔬 Researching",
        JobStatus::Drafting => "✍️ Drafting",
        JobStatus::Qa => "🔍 QA",
        JobStatus::Review => "👀 Your Review",
        JobStatus::Approved => "✅ Approved",
        JobStatus::Published => "🚀 Published",
        JobStatus::Rejected => "❌ Rejected",
    }
}

/// Accepts a board label, a bare display name, or a machine name.
pub fn parse_status_label(label: &str) -> Option<JobStatus> {
    if let Some(status) = JobStatus::ALL
        .into_iter()
        .find(|s| status_label(*s) == label)
    {
        return Some(status);
    }
    // Drop a leading emoji (anything up to the first ASCII letter).
    let stripped = label.trim_start_matches(|c: char| !c.is_ascii_alphabetic());
    JobStatus::parse(stripped)
}

pub fn content_type_label(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Article => "📝 Article",
        ContentType::Podcast => "🎙️ Podcast",
        ContentType::LinkedIn => "💼 LinkedIn",
        ContentType::Thread => "🐦 Thread",
        ContentType::Newsletter => "📧 Newsletter",
    }
}

fn title(value: &str) -> Value {
    json!({ "title": [{ "text": { "content": value } }] })
}

fn text(value: &str) -> Value {
    json!({ "rich_text": [{ "text": { "content": value } }] })
}

fn select(value: &str) -> Value {
    json!({ "select": { "name": value } })
}

fn number(value: f64) -> Value {
    json!({ "number": value })
}

fn url(value: &str) -> Value {
    json!({ "url": value })
}

fn date(value: NaiveDate) -> Value {
    json!({ "date": { "start": value.format("%Y-%m-%d").to_string() } })
}

fn checkbox(value: bool) -> Value {
    json!({ "checkbox": value })
}

/// Properties for a new record at `Idea`.
pub fn encode_new(new_job: &NewJob) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert(TITLE.into(), title(&new_job.topic));
    props.insert(TOPIC.into(), text(&new_job.topic));
    props.insert(
        CONTENT_TYPE.into(),
        select(content_type_label(new_job.content_type)),
    );
    props.insert(STATUS.into(), select(status_label(JobStatus::Idea)));
    if let Some(audience) = &new_job.audience {
        props.insert(AUDIENCE.into(), text(audience));
    }
    if let Some(notes) = &new_job.notes {
        props.insert(NOTES.into(), text(notes));
    }
    props
}

/// Properties for a partial update; unset fields are omitted.
pub fn encode_patch(patch: &JobPatch) -> Map<String, Value> {
    let mut props = Map::new();
    if let Some(status) = patch.status {
        props.insert(STATUS.into(), select(status_label(status)));
    }
    if let Some(t) = &patch.title {
        props.insert(TITLE.into(), title(t));
    }
    if let Some(score) = patch.quality_score {
        props.insert(QUALITY_SCORE.into(), number(score));
    }
    if let Some(words) = patch.word_count {
        props.insert(WORD_COUNT.into(), number(f64::from(words)));
    }
    if let Some(lookups) = patch.lookups_used {
        props.insert(LOOKUPS_USED.into(), number(f64::from(lookups)));
    }
    if let Some(cost) = patch.cost_usd {
        props.insert(COST_USD.into(), number(cost));
    }
    if let Some(draft) = &patch.draft_artifact_ref {
        props.insert(DRAFT_PAGE.into(), url(draft));
    }
    if let Some(published) = &patch.publish_target_url {
        props.insert(PUBLISHED_URL.into(), url(published));
    }
    if let Some(day) = patch.published_at {
        props.insert(PUBLISHED_DATE.into(), date(day));
    }
    if let Some(audio) = patch.audio_generated {
        props.insert(AUDIO_GENERATED.into(), checkbox(audio));
    }
    props
}

/// Typed view over one record's `properties` object.
pub struct Properties<'a>(&'a Value);

impl<'a> Properties<'a> {
    pub fn new(properties: &'a Value) -> Self {
        Self(properties)
    }

    fn field(&self, name: &str) -> &'a Value {
        &self.0[name]
    }

    pub fn title(&self, name: &str) -> String {
        rich_text_content(&self.field(name)["title"]).unwrap_or_else(|| "Untitled".to_string())
    }

    pub fn text(&self, name: &str) -> Option<String> {
        rich_text_content(&self.field(name)["rich_text"])
    }

    pub fn select(&self, name: &str) -> Option<&'a str> {
        self.field(name)["select"]["name"].as_str()
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.field(name)["number"].as_f64()
    }

    pub fn url(&self, name: &str) -> Option<String> {
        self.field(name)["url"]
            .as_str()
            .filter(|u| !u.is_empty())
            .map(str::to_string)
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        let start = self.field(name)["date"]["start"].as_str()?;
        let day = start.get(..10).unwrap_or(start);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }

    pub fn checkbox(&self, name: &str) -> bool {
        self.field(name)["checkbox"].as_bool().unwrap_or(false)
    }
}

fn rich_text_content(array: &Value) -> Option<String> {
    let parts = array.as_array()?;
    let joined: String = parts
        .iter()
        .filter_map(|part| {
            part["plain_text"]
                .as_str()
                .or_else(|| part["text"]["content"].as_str())
        })
        .collect();
    if joined.is_empty() { None } else { Some(joined) }
}

fn non_negative_u32(value: Option<f64>) -> Option<u32> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round().min(f64::from(u32::MAX)) as u32)
}

/// Decode a full page object (`{"id": ..., "properties": {...}}`) into a job.
///
/// Returns `None` only when the page has no id. A record with an
/// unrecognized status decodes as `Idea`.
pub fn decode_job(page: &Value) -> Option<Job> {
    let id = page["id"].as_str()?.to_string();
    let props = Properties::new(&page["properties"]);

    let title = props.title(TITLE);
    let topic = props.text(TOPIC).unwrap_or_else(|| title.clone());
    let status = props
        .select(STATUS)
        .and_then(parse_status_label)
        .unwrap_or(JobStatus::Idea);
    let content_type = props
        .select(CONTENT_TYPE)
        .map(|label| ContentType::parse(label.trim_start_matches(|c: char| !c.is_ascii_alphabetic())))
        .unwrap_or_default();
    let last_edited = page["last_edited_time"]
        .as_str()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    Some(Job {
        id,
        topic,
        content_type,
        audience: props.text(AUDIENCE),
        status,
        title,
        quality_score: props.number(QUALITY_SCORE),
        word_count: non_negative_u32(props.number(WORD_COUNT)),
        lookups_used: non_negative_u32(props.number(LOOKUPS_USED)),
        cost_usd: props.number(COST_USD),
        draft_artifact_ref: props.url(DRAFT_PAGE),
        publish_target_url: props.url(PUBLISHED_URL),
        published_at: props.date(PUBLISHED_DATE),
        audio_generated: props.checkbox(AUDIO_GENERATED),
        last_edited,
    })
}
