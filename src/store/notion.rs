//! Task store backed by a Notion database.
//!
//! Jobs are pages of the content database; drafts are child pages of their
//! job page. Writes are limited to 100 blocks per request, so longer block
//! lists are appended in batches.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::properties::{self, decode_job, status_label};
use super::{ChildDocument, CreateOutcome, TaskStore, find_active_by_topic};
use crate::config::NotionConfig;
use crate::draft::Block;
use crate::error::StoreError;
use crate::state_machine::{Job, JobPatch, JobStatus, NewJob, short_id};

const NOTION_VERSION: &str = "2022-06-28";
const MAX_BLOCKS_PER_REQUEST: usize = 100;
const PAGE_SIZE: u32 = 100;

pub struct NotionStore {
    client: Client,
    token: String,
    database_id: String,
    base_url: String,
}

/// Public URL of a page, as shown to reviewers.
pub fn page_url(page_id: &str) -> String {
    format!("https://notion.so/{}", page_id.replace('-', ""))
}

impl NotionStore {
    pub fn new(config: &NotionConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            token: config.token.clone(),
            database_id: config.database_id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Value, StoreError> {
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<Value>().await?)
    }

    async fn query(&self, filter: Value) -> Result<Vec<Job>, StoreError> {
        let mut jobs = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "filter": filter, "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let path = format!("databases/{}/query", self.database_id);
            let result = self
                .send(self.request(reqwest::Method::POST, &path).json(&body))
                .await?;
            if let Some(results) = result["results"].as_array() {
                jobs.extend(results.iter().filter_map(decode_job));
            }
            cursor = next_cursor(&result);
            if cursor.is_none() {
                break;
            }
        }
        Ok(jobs)
    }

    async fn list_children(&self, block_id: &str) -> Result<Vec<Value>, StoreError> {
        let mut children = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let path = format!("blocks/{}/children", block_id);
            let mut req = self
                .request(reqwest::Method::GET, &path)
                .query(&[("page_size", PAGE_SIZE.to_string())]);
            if let Some(c) = &cursor {
                req = req.query(&[("start_cursor", c.as_str())]);
            }
            let result = self.send(req).await?;
            if let Some(results) = result["results"].as_array() {
                children.extend(results.iter().cloned());
            }
            cursor = next_cursor(&result);
            if cursor.is_none() {
                break;
            }
        }
        Ok(children)
    }
}

fn next_cursor(result: &Value) -> Option<String> {
    if result["has_more"].as_bool().unwrap_or(false) {
        result["next_cursor"].as_str().map(str::to_string)
    } else {
        None
    }
}

fn rich_text(content: &str) -> Value {
    json!({ "rich_text": [{ "type": "text", "text": { "content": content } }] })
}

pub fn encode_block(block: &Block) -> Value {
    let (kind, body) = match block {
        Block::Divider => ("divider", json!({})),
        Block::Callout(t) => {
            let mut body = rich_text(t);
            body["icon"] = json!({ "type": "emoji", "emoji": "📝" });
            ("callout", body)
        }
        Block::Quote(t) => ("quote", rich_text(t)),
        Block::Heading1(t) => ("heading_1", rich_text(t)),
        Block::Heading2(t) => ("heading_2", rich_text(t)),
        Block::Heading3(t) => ("heading_3", rich_text(t)),
        Block::Paragraph(t) => ("paragraph", rich_text(t)),
        Block::Bullet(t) => ("bulleted_list_item", rich_text(t)),
    };
    let mut value = json!({ "object": "block", "type": kind });
    value[kind] = body;
    value
}

/// Unknown block types decode to `None` and are ignored.
pub fn decode_block(value: &Value) -> Option<Block> {
    let kind = value["type"].as_str()?;
    let text = || -> String {
        value[kind]["rich_text"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| {
                        p["plain_text"]
                            .as_str()
                            .or_else(|| p["text"]["content"].as_str())
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    let block = match kind {
        "divider" => Block::Divider,
        "callout" => Block::Callout(text()),
        "quote" => Block::Quote(text()),
        "heading_1" => Block::Heading1(text()),
        "heading_2" => Block::Heading2(text()),
        "heading_3" => Block::Heading3(text()),
        "paragraph" => Block::Paragraph(text()),
        "bulleted_list_item" => Block::Bullet(text()),
        _ => return None,
    };
    Some(block)
}

#[async_trait]
impl TaskStore for NotionStore {
    async fn create_record(
        &self,
        topic: &str,
        new_job: &NewJob,
    ) -> Result<CreateOutcome, StoreError> {
        if let Some(existing) = find_active_by_topic(self, topic).await? {
            info!(job_id = %existing.id, status = %existing.status, "content item already exists");
            return Ok(CreateOutcome::Exists(existing.id));
        }
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": properties::encode_new(new_job),
        });
        let result = self
            .send(self.request(reqwest::Method::POST, "pages").json(&body))
            .await?;
        let id = result["id"]
            .as_str()
            .ok_or_else(|| StoreError::Malformed("created page has no id".into()))?
            .to_string();
        info!(job_id = %short_id(&id), topic, "content item created");
        Ok(CreateOutcome::Created(id))
    }

    async fn update_record(&self, id: &str, patch: &JobPatch) -> Result<(), StoreError> {
        let body = json!({ "properties": properties::encode_patch(patch) });
        self.send(
            self.request(reqwest::Method::PATCH, &format!("pages/{id}"))
                .json(&body),
        )
        .await?;
        if let Some(status) = patch.status {
            debug!(job_id = %short_id(id), "content status -> {}", status_label(status));
        }
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<Job>, StoreError> {
        match self
            .send(self.request(reqwest::Method::GET, &format!("pages/{id}")))
            .await
        {
            Ok(page) => Ok(decode_job(&page)),
            Err(StoreError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn query_by_title_prefix(&self, text: &str) -> Result<Vec<Job>, StoreError> {
        let filter = json!({
            "or": [
                { "property": properties::TITLE, "title": { "starts_with": text } },
                { "property": properties::TOPIC, "rich_text": { "starts_with": text } },
            ]
        });
        self.query(filter).await
    }

    async fn query_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StoreError> {
        let filter = json!({
            "property": properties::STATUS,
            "select": { "equals": status_label(status) },
        });
        self.query(filter).await
    }

    async fn create_child_document(
        &self,
        parent_id: &str,
        title: &str,
        blocks: &[Block],
    ) -> Result<ChildDocument, StoreError> {
        let encoded: Vec<Value> = blocks.iter().map(encode_block).collect();
        let (first, rest) = encoded.split_at(encoded.len().min(MAX_BLOCKS_PER_REQUEST));
        let body = json!({
            "parent": { "page_id": parent_id },
            "icon": { "type": "emoji", "emoji": "📄" },
            "properties": {
                "title": { "title": [{ "type": "text", "text": { "content": title } }] }
            },
            "children": first,
        });
        let result = self
            .send(self.request(reqwest::Method::POST, "pages").json(&body))
            .await?;
        let id = result["id"]
            .as_str()
            .ok_or_else(|| StoreError::Malformed("created child page has no id".into()))?
            .to_string();
        for batch in rest.chunks(MAX_BLOCKS_PER_REQUEST) {
            self.send(
                self.request(reqwest::Method::PATCH, &format!("blocks/{id}/children"))
                    .json(&json!({ "children": batch })),
            )
            .await?;
        }
        let url = page_url(&id);
        info!(parent = %short_id(parent_id), %url, blocks = blocks.len(), "draft saved");
        Ok(ChildDocument { id, url })
    }

    async fn find_child_document(
        &self,
        parent_id: &str,
        title_prefix: &str,
    ) -> Result<Option<ChildDocument>, StoreError> {
        let children = self.list_children(parent_id).await?;
        Ok(children.iter().find_map(|block| {
            if block["type"].as_str() != Some("child_page") {
                return None;
            }
            let title = block["child_page"]["title"].as_str().unwrap_or_default();
            if !title.starts_with(title_prefix) {
                return None;
            }
            let id = block["id"].as_str()?.to_string();
            let url = page_url(&id);
            Some(ChildDocument { id, url })
        }))
    }

    async fn read_blocks(&self, child_id: &str) -> Result<Vec<Block>, StoreError> {
        let children = self.list_children(child_id).await?;
        Ok(children.iter().filter_map(decode_block).collect())
    }

    async fn append_blocks(&self, child_id: &str, blocks: &[Block]) -> Result<(), StoreError> {
        let encoded: Vec<Value> = blocks.iter().map(encode_block).collect();
        for batch in encoded.chunks(MAX_BLOCKS_PER_REQUEST) {
            self.send(
                self.request(reqwest::Method::PATCH, &format!("blocks/{child_id}/children"))
                    .json(&json!({ "children": batch })),
            )
            .await?;
        }
        info!(page = %short_id(child_id), blocks = blocks.len(), "appended blocks");
        Ok(())
    }
}
