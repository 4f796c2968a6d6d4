//! The durable task store: the authoritative record of every job and its draft.

pub mod memory;
pub mod notion;
pub mod properties;

use async_trait::async_trait;

use crate::draft::Block;
use crate::error::StoreError;
use crate::state_machine::{Job, JobPatch, JobStatus, NewJob};

pub use memory::MemoryStore;
pub use notion::NotionStore;

/// Outcome of [`TaskStore::create_record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(String),
    /// A non-terminal record for the same topic already exists.
    Exists(String),
}

/// A child document attached to a job record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDocument {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_record(&self, topic: &str, new_job: &NewJob)
    -> Result<CreateOutcome, StoreError>;

    async fn update_record(&self, id: &str, patch: &JobPatch) -> Result<(), StoreError>;

    async fn get_record(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Records whose title or topic starts with `text`.
    async fn query_by_title_prefix(&self, text: &str) -> Result<Vec<Job>, StoreError>;

    async fn query_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError>;

    async fn create_child_document(
        &self,
        parent_id: &str,
        title: &str,
        blocks: &[Block],
    ) -> Result<ChildDocument, StoreError>;

    async fn find_child_document(
        &self,
        parent_id: &str,
        title_prefix: &str,
    ) -> Result<Option<ChildDocument>, StoreError>;

    async fn read_blocks(&self, child_id: &str) -> Result<Vec<Block>, StoreError>;

    async fn append_blocks(&self, child_id: &str, blocks: &[Block]) -> Result<(), StoreError>;
}

/// The first non-terminal job recorded for `topic`, if any.
pub async fn find_active_by_topic(
    store: &dyn TaskStore,
    topic: &str,
) -> Result<Option<Job>, StoreError> {
    let candidates = store.query_by_title_prefix(topic.trim()).await?;
    Ok(candidates
        .into_iter()
        .find(|job| job.has_topic(topic) && !job.status.is_terminal()))
}
