//! In-process task store.
//!
//! Used by `pressline demo` and by tests. Creation is atomic with its dedup
//! check, and status writes are validated against [`StateMachine`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{ChildDocument, CreateOutcome, TaskStore};
use crate::draft::Block;
use crate::error::StoreError;
use crate::state_machine::{Job, JobPatch, JobStatus, NewJob, StateMachine};

#[derive(Debug, Clone)]
struct Document {
    parent_id: String,
    title: String,
    blocks: Vec<Block>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: Vec<Job>,
    documents: HashMap<String, Document>,
    fail_child_documents: bool,
    /// Pending injected failures for updates that move a job to a status.
    failing_updates: Option<(JobStatus, usize)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.lock().jobs.clone()
    }

    pub fn job(&self, id: &str) -> Option<Job> {
        self.lock().jobs.iter().find(|j| j.id == id).cloned()
    }

    /// Number of child documents under `parent_id`.
    pub fn document_count(&self, parent_id: &str) -> usize {
        self.lock()
            .documents
            .values()
            .filter(|d| d.parent_id == parent_id)
            .count()
    }

    pub fn block_count(&self, child_id: &str) -> usize {
        self.lock()
            .documents
            .get(child_id)
            .map(|d| d.blocks.len())
            .unwrap_or(0)
    }

    /// Fail the next `count` updates whose patch moves a job to `status`.
    pub fn fail_next_updates(&self, status: JobStatus, count: usize) {
        self.lock().failing_updates = Some((status, count));
    }

    /// Make every subsequent `create_child_document` fail.
    pub fn fail_child_documents(&self, fail: bool) {
        self.lock().fail_child_documents = fail;
    }
}

fn document_url(id: &str) -> String {
    format!("memory://drafts/{id}")
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_record(
        &self,
        topic: &str,
        new_job: &NewJob,
    ) -> Result<CreateOutcome, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .jobs
            .iter()
            .find(|j| j.has_topic(topic) && !j.status.is_terminal())
        {
            return Ok(CreateOutcome::Exists(existing.id.clone()));
        }
        let id = Uuid::new_v4().to_string();
        inner.jobs.push(Job::new(id.clone(), new_job));
        Ok(CreateOutcome::Created(id))
    }

    async fn update_record(&self, id: &str, patch: &JobPatch) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some((status, remaining)) = inner.failing_updates.as_mut() {
            if patch.status == Some(*status) && *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Api {
                    status: 503,
                    message: "record store unavailable".into(),
                });
            }
        }
        let job = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let target = patch.status.unwrap_or(job.status);
        if !StateMachine::is_allowed(job.status, target) {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: target,
            });
        }
        job.apply(patch);
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.job(id))
    }

    async fn query_by_title_prefix(&self, text: &str) -> Result<Vec<Job>, StoreError> {
        let needle = text.to_lowercase();
        Ok(self
            .lock()
            .jobs
            .iter()
            .filter(|j| {
                j.title.to_lowercase().starts_with(&needle)
                    || j.topic.to_lowercase().starts_with(&needle)
            })
            .cloned()
            .collect())
    }

    async fn query_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .lock()
            .jobs
            .iter()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }

    async fn create_child_document(
        &self,
        parent_id: &str,
        title: &str,
        blocks: &[Block],
    ) -> Result<ChildDocument, StoreError> {
        let mut inner = self.lock();
        if inner.fail_child_documents {
            return Err(StoreError::Api {
                status: 503,
                message: "document store unavailable".into(),
            });
        }
        if !inner.jobs.iter().any(|j| j.id == parent_id) {
            return Err(StoreError::NotFound(parent_id.to_string()));
        }
        let id = Uuid::new_v4().to_string();
        inner.documents.insert(
            id.clone(),
            Document {
                parent_id: parent_id.to_string(),
                title: title.to_string(),
                blocks: blocks.to_vec(),
            },
        );
        Ok(ChildDocument {
            url: document_url(&id),
            id,
        })
    }

    async fn find_child_document(
        &self,
        parent_id: &str,
        title_prefix: &str,
    ) -> Result<Option<ChildDocument>, StoreError> {
        Ok(self
            .lock()
            .documents
            .iter()
            .find(|(_, d)| d.parent_id == parent_id && d.title.starts_with(title_prefix))
            .map(|(id, _)| ChildDocument {
                id: id.clone(),
                url: document_url(id),
            }))
    }

    async fn read_blocks(&self, child_id: &str) -> Result<Vec<Block>, StoreError> {
        self.lock()
            .documents
            .get(child_id)
            .map(|d| d.blocks.clone())
            .ok_or_else(|| StoreError::NotFound(child_id.to_string()))
    }

    async fn append_blocks(&self, child_id: &str, blocks: &[Block]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let doc = inner
            .documents
            .get_mut(child_id)
            .ok_or_else(|| StoreError::NotFound(child_id.to_string()))?;
        doc.blocks.extend_from_slice(blocks);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::ContentType;

    fn new_job(topic: &str) -> NewJob {
        NewJob {
            topic: topic.into(),
            content_type: ContentType::Article,
            audience: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn create_dedups_active_topics() {
        let store = MemoryStore::new();
        let first = store.create_record("Rust", &new_job("Rust")).await.unwrap();
        let CreateOutcome::Created(id) = first else {
            panic!("expected a new record");
        };
        let second = store.create_record("rust", &new_job("rust")).await.unwrap();
        assert_eq!(second, CreateOutcome::Exists(id));
        assert_eq!(store.jobs().len(), 1);
    }

    #[tokio::test]
    async fn terminal_jobs_do_not_block_a_new_run() {
        let store = MemoryStore::new();
        let CreateOutcome::Created(id) = store.create_record("Rust", &new_job("Rust")).await.unwrap()
        else {
            panic!("expected a new record");
        };
        store
            .update_record(&id, &JobPatch::status(JobStatus::Rejected))
            .await
            .unwrap();
        let again = store.create_record("Rust", &new_job("Rust")).await.unwrap();
        assert!(matches!(again, CreateOutcome::Created(other) if other != id));
    }

    #[tokio::test]
    async fn refuses_status_regressions() {
        let store = MemoryStore::new();
        let CreateOutcome::Created(id) = store.create_record("Rust", &new_job("Rust")).await.unwrap()
        else {
            panic!("expected a new record");
        };
        store
            .update_record(&id, &JobPatch::status(JobStatus::Rejected))
            .await
            .unwrap();
        let err = store
            .update_record(&id, &JobPatch::status(JobStatus::Review))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(store.job(&id).unwrap().status, JobStatus::Rejected);
    }

    #[tokio::test]
    async fn child_documents_append_only() {
        let store = MemoryStore::new();
        let CreateOutcome::Created(id) = store.create_record("Rust", &new_job("Rust")).await.unwrap()
        else {
            panic!("expected a new record");
        };
        let doc = store
            .create_child_document(&id, "Draft: Rust", &[Block::Paragraph("a".into())])
            .await
            .unwrap();
        store
            .append_blocks(&doc.id, &[Block::Divider, Block::Paragraph("b".into())])
            .await
            .unwrap();
        assert_eq!(store.block_count(&doc.id), 3);

        let found = store.find_child_document(&id, "Draft:").await.unwrap();
        assert_eq!(found, Some(doc));
    }

    #[tokio::test]
    async fn injected_update_failures_target_one_status() {
        let store = MemoryStore::new();
        let CreateOutcome::Created(id) = store.create_record("Rust", &new_job("Rust")).await.unwrap()
        else {
            panic!("expected a new record");
        };
        store.fail_next_updates(JobStatus::Review, 1);
        store
            .update_record(&id, &JobPatch::status(JobStatus::Researching))
            .await
            .unwrap();
        let err = store
            .update_record(&id, &JobPatch::status(JobStatus::Review))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 503, .. }));
        assert_eq!(store.job(&id).unwrap().status, JobStatus::Researching);
        store
            .update_record(&id, &JobPatch::status(JobStatus::Review))
            .await
            .unwrap();
        assert_eq!(store.job(&id).unwrap().status, JobStatus::Review);
    }
}
