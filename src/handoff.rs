//! Handoff cache: everything the publish phase needs, keyed by job id.
//!
//! The cache is an optimization over the task store. Entries lost to a
//! restart are rebuilt from the stored draft document, minus the research.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::draft::{DRAFT_TITLE_PREFIX, DraftArtifact, word_count};
use crate::engine::Research;
use crate::error::StoreError;
use crate::state_machine::{JobStatus, RunOptions};
use crate::store::TaskStore;

/// The approved-for-review content and the options the publish phase honors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishPayload {
    pub title: String,
    pub body: String,
    pub meta_description: Option<String>,
    pub excerpt: Option<String>,
    pub topic: String,
    pub research: Research,
    pub script: Option<String>,
    pub generate_audio: bool,
}

impl PublishPayload {
    pub fn word_count(&self) -> u32 {
        word_count(&self.body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandoffEntry {
    pub job_id: String,
    pub payload: PublishPayload,
    pub stored_at: DateTime<Utc>,
    /// Rebuilt from the task store rather than handed over by a run.
    pub reconstructed: bool,
}

impl HandoffEntry {
    pub fn new(job_id: impl Into<String>, payload: PublishPayload) -> Self {
        Self {
            job_id: job_id.into(),
            payload,
            stored_at: Utc::now(),
            reconstructed: false,
        }
    }
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<String, HandoffEntry>,
    /// Jobs taken by a publish that has not finished yet.
    claimed: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct HandoffCache {
    slots: Mutex<Slots>,
}

fn strip_dashes(s: &str) -> String {
    s.chars().filter(|c| *c != '-').collect()
}

impl HandoffCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, entry: HandoffEntry) {
        self.lock().entries.insert(entry.job_id.clone(), entry);
    }

    pub fn get(&self, job_id: &str) -> Option<HandoffEntry> {
        self.lock().entries.get(job_id).cloned()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().entries.contains_key(job_id)
    }

    /// Remove the entry and mark the job claimed, in one step. At most one
    /// caller gets `Some` until the claim is released.
    pub fn take(&self, job_id: &str) -> Option<HandoffEntry> {
        let mut slots = self.lock();
        let entry = slots.entries.remove(job_id)?;
        slots.claimed.insert(job_id.to_string());
        Some(entry)
    }

    pub fn is_claimed(&self, job_id: &str) -> bool {
        self.lock().claimed.contains(job_id)
    }

    /// Give a claimed entry back, e.g. when approval could not be recorded.
    pub fn restore(&self, entry: HandoffEntry) {
        let mut slots = self.lock();
        slots.claimed.remove(&entry.job_id);
        slots.entries.insert(entry.job_id.clone(), entry);
    }

    /// Drop the claim on a job whose publish has finished.
    pub fn release(&self, job_id: &str) {
        self.lock().claimed.remove(job_id);
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry, oldest first.
    pub fn entries(&self) -> Vec<HandoffEntry> {
        let mut all: Vec<_> = self.lock().entries.values().cloned().collect();
        all.sort_by_key(|e| e.stored_at);
        all
    }

    /// Update the cached body of `job_id` in place. Returns false when absent.
    pub fn update_body(&self, job_id: &str, f: impl FnOnce(&mut String)) -> bool {
        match self.lock().entries.get_mut(job_id) {
            Some(entry) => {
                f(&mut entry.payload.body);
                true
            }
            None => false,
        }
    }

    /// Job ids whose raw or dash-stripped form starts with `prefix`.
    pub fn resolve(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Vec::new();
        }
        let bare = strip_dashes(prefix);
        let mut ids: Vec<String> = self
            .lock()
            .entries
            .keys()
            .filter(|id| id.starts_with(prefix) || strip_dashes(id).starts_with(&bare))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// The cached entry for `job_id`, rebuilding it from the store on a miss.
    pub async fn get_or_reconstruct(
        &self,
        store: &dyn TaskStore,
        job_id: &str,
    ) -> Result<Option<HandoffEntry>, StoreError> {
        if let Some(entry) = self.get(job_id) {
            return Ok(Some(entry));
        }
        if self.is_claimed(job_id) {
            return Ok(None);
        }
        let Some(entry) = reconstruct(store, job_id).await? else {
            return Ok(None);
        };
        let mut slots = self.lock();
        if slots.claimed.contains(job_id) {
            return Ok(None);
        }
        slots.entries.insert(job_id.to_string(), entry.clone());
        Ok(Some(entry))
    }

    /// Like [`HandoffCache::take`], rebuilding the entry from the store on a
    /// miss. `None` when the job is already claimed or has nothing to publish.
    pub async fn claim_or_reconstruct(
        &self,
        store: &dyn TaskStore,
        job_id: &str,
    ) -> Result<Option<HandoffEntry>, StoreError> {
        if let Some(entry) = self.take(job_id) {
            return Ok(Some(entry));
        }
        if self.is_claimed(job_id) {
            return Ok(None);
        }
        let Some(entry) = reconstruct(store, job_id).await? else {
            return Ok(None);
        };
        let mut slots = self.lock();
        if !slots.claimed.insert(job_id.to_string()) {
            return Ok(None);
        }
        slots.entries.remove(job_id);
        Ok(Some(entry))
    }

    /// Rebuild entries for every job awaiting review that is not cached.
    /// Returns how many were added.
    pub async fn reconcile_all(&self, store: &dyn TaskStore) -> Result<usize, StoreError> {
        let pending = store.query_by_status(JobStatus::Review).await?;
        let mut added = 0;
        for job in pending {
            if self.contains(&job.id) || self.is_claimed(&job.id) {
                continue;
            }
            match reconstruct(store, &job.id).await {
                Ok(Some(entry)) => {
                    let mut slots = self.lock();
                    if slots.claimed.contains(&job.id) || slots.entries.contains_key(&job.id) {
                        continue;
                    }
                    slots.entries.insert(job.id.clone(), entry);
                    added += 1;
                }
                Ok(None) => debug!(job_id = %job.id, "no draft document to reconstruct from"),
                Err(err) => warn!(job_id = %job.id, error = %err, "reconstruction failed"),
            }
        }
        if added > 0 {
            info!(added, "reconciled handoff cache with the task store");
        }
        Ok(added)
    }
}

/// Build an entry from the stored draft document of `job_id`, if the job
/// is still in review. Research is not persisted, so the rebuilt payload
/// carries none.
async fn reconstruct(
    store: &dyn TaskStore,
    job_id: &str,
) -> Result<Option<HandoffEntry>, StoreError> {
    let Some(job) = store.get_record(job_id).await? else {
        return Ok(None);
    };
    if job.status != JobStatus::Review {
        return Ok(None);
    }
    let Some(doc) = store.find_child_document(job_id, DRAFT_TITLE_PREFIX).await? else {
        return Ok(None);
    };
    let blocks = store.read_blocks(&doc.id).await?;
    let draft = DraftArtifact::from_blocks(&job.title, &blocks);

    let payload = PublishPayload {
        title: draft.title,
        body: draft.body,
        meta_description: draft.meta_description,
        excerpt: None,
        topic: job.topic,
        research: Research::default(),
        script: draft.script,
        generate_audio: RunOptions::default().generate_audio,
    };
    Ok(Some(HandoffEntry {
        job_id: job_id.to_string(),
        payload,
        stored_at: job.last_edited.unwrap_or_else(Utc::now),
        reconstructed: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::Block;
    use crate::state_machine::{ContentType, JobPatch, NewJob};
    use crate::store::{CreateOutcome, MemoryStore};

    fn payload(title: &str) -> PublishPayload {
        PublishPayload {
            title: title.into(),
            body: "Body text".into(),
            meta_description: None,
            excerpt: None,
            topic: title.to_lowercase(),
            research: Research::default(),
            script: None,
            generate_audio: false,
        }
    }

    async fn job_in_review(store: &MemoryStore, topic: &str, with_draft: bool) -> String {
        let new_job = NewJob {
            topic: topic.into(),
            content_type: ContentType::Article,
            audience: None,
            notes: None,
        };
        let CreateOutcome::Created(id) = store.create_record(topic, &new_job).await.unwrap() else {
            panic!("expected a new record");
        };
        if with_draft {
            let draft = DraftArtifact {
                title: topic.into(),
                body: "## Section\n\nStored text.".into(),
                meta_description: Some("stored meta".into()),
                script: None,
            };
            store
                .create_child_document(&id, &draft.document_title(), &draft.to_blocks())
                .await
                .unwrap();
        }
        store
            .update_record(&id, &JobPatch::status(JobStatus::Review))
            .await
            .unwrap();
        id
    }

    #[test]
    fn resolves_raw_and_dashless_prefixes() {
        let cache = HandoffCache::new();
        cache.insert(HandoffEntry::new("1f2e3d4c-aaaa-bbbb", payload("A")));
        cache.insert(HandoffEntry::new("1f2e9999-cccc-dddd", payload("B")));

        assert_eq!(cache.resolve("1f2e3d4c"), vec!["1f2e3d4c-aaaa-bbbb"]);
        assert_eq!(cache.resolve("1f2e3d4caaaa"), vec!["1f2e3d4c-aaaa-bbbb"]);
        assert_eq!(cache.resolve("1f2e").len(), 2);
        assert!(cache.resolve("ffff").is_empty());
        assert!(cache.resolve("  ").is_empty());
    }

    #[test]
    fn update_body_only_touches_present_entries() {
        let cache = HandoffCache::new();
        cache.insert(HandoffEntry::new("a", payload("A")));
        assert!(cache.update_body("a", |b| b.push_str("\n\nMore")));
        assert!(!cache.update_body("missing", |b| b.clear()));
        assert_eq!(cache.get("a").unwrap().payload.body, "Body text\n\nMore");
    }

    #[tokio::test]
    async fn reconstructs_from_the_stored_draft() {
        let store = MemoryStore::new();
        let id = job_in_review(&store, "Kernel Rust", true).await;
        let cache = HandoffCache::new();

        let entry = cache.get_or_reconstruct(&store, &id).await.unwrap().unwrap();
        assert!(entry.reconstructed);
        assert!(entry.payload.research.is_empty());
        assert_eq!(entry.payload.body, "## Section\n\nStored text.");
        assert_eq!(entry.payload.meta_description.as_deref(), Some("stored meta"));
        assert!(cache.contains(&id));
    }

    #[tokio::test]
    async fn missing_draft_yields_none() {
        let store = MemoryStore::new();
        let id = job_in_review(&store, "No Draft", false).await;
        let cache = HandoffCache::new();
        assert!(cache.get_or_reconstruct(&store, &id).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn reconcile_skips_cached_and_tolerates_gaps() {
        let store = MemoryStore::new();
        let cached = job_in_review(&store, "Cached", true).await;
        let fresh = job_in_review(&store, "Fresh", true).await;
        job_in_review(&store, "Broken", false).await;

        let cache = HandoffCache::new();
        cache.insert(HandoffEntry::new(cached.clone(), payload("Cached")));

        let added = cache.reconcile_all(&store).await.unwrap();
        assert_eq!(added, 1);
        assert!(!cache.get(&cached).unwrap().reconstructed);
        assert!(cache.get(&fresh).unwrap().reconstructed);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn amended_sections_fold_into_reconstructed_body() {
        let store = MemoryStore::new();
        let id = job_in_review(&store, "Amended", true).await;
        let doc = store
            .find_child_document(&id, DRAFT_TITLE_PREFIX)
            .await
            .unwrap()
            .unwrap();
        store
            .append_blocks(
                &doc.id,
                &[
                    Block::Divider,
                    Block::Heading2("Added: a case study".into()),
                    Block::Paragraph("Case study text.".into()),
                ],
            )
            .await
            .unwrap();

        let entry = HandoffCache::new()
            .get_or_reconstruct(&store, &id)
            .await
            .unwrap()
            .unwrap();
        assert!(entry.payload.body.ends_with("Case study text."));
    }

    #[test]
    fn take_claims_until_released() {
        let cache = HandoffCache::new();
        cache.insert(HandoffEntry::new("a", payload("A")));

        let entry = cache.take("a").unwrap();
        assert!(cache.take("a").is_none());
        assert!(cache.is_claimed("a"));
        assert!(cache.resolve("a").is_empty());

        cache.restore(entry);
        assert!(!cache.is_claimed("a"));
        assert!(cache.take("a").is_some());
        cache.release("a");
        assert!(!cache.is_claimed("a"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn claimed_jobs_are_not_rebuilt() {
        let store = MemoryStore::new();
        let id = job_in_review(&store, "Claimed", true).await;
        let cache = HandoffCache::new();

        let entry = cache.claim_or_reconstruct(&store, &id).await.unwrap().unwrap();
        assert!(entry.reconstructed);
        assert!(cache.is_empty());
        assert!(cache.claim_or_reconstruct(&store, &id).await.unwrap().is_none());
        assert!(cache.get_or_reconstruct(&store, &id).await.unwrap().is_none());
        assert_eq!(cache.reconcile_all(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn jobs_past_review_are_not_rebuilt() {
        let store = MemoryStore::new();
        let id = job_in_review(&store, "Approved", true).await;
        store
            .update_record(&id, &JobPatch::status(JobStatus::Approved))
            .await
            .unwrap();
        let cache = HandoffCache::new();
        assert!(cache.get_or_reconstruct(&store, &id).await.unwrap().is_none());
        assert!(cache.claim_or_reconstruct(&store, &id).await.unwrap().is_none());
    }
}
