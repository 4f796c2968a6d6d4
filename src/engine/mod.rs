//! The content engine: research, drafting and critique behind one seam.

pub mod anthropic;
pub mod offline;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::state_machine::ContentType;

pub use anthropic::AnthropicEngine;
pub use offline::OfflineEngine;

/// A draft passes QA at or above this score when no revision is requested.
pub const PASSING_SCORE: f64 = 7.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchRequest {
    pub topic: String,
    pub context: Option<String>,
    pub max_lookups: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Research {
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(skip)]
    pub cost_usd: f64,
}

impl Research {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.findings.is_empty()
    }

    pub fn lookups_used(&self) -> u32 {
        u32::try_from(self.sources.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftMetadata {
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(skip)]
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDraft {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub metadata: DraftMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub quality_score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub needs_revision: bool,
}

impl Critique {
    pub fn passed(&self) -> bool {
        !self.needs_revision && self.quality_score >= PASSING_SCORE
    }
}

#[async_trait]
pub trait ContentEngine: Send + Sync {
    async fn research(&self, request: &ResearchRequest) -> Result<Research, EngineError>;

    async fn generate(
        &self,
        topic: &str,
        research: &Research,
        audience: Option<&str>,
        content_type: ContentType,
    ) -> Result<GeneratedDraft, EngineError>;

    async fn critique(&self, body: &str, topic: &str) -> Result<Critique, EngineError>;

    async fn revise(&self, body: &str, issues: &[String], topic: &str)
    -> Result<String, EngineError>;

    /// A spoken-word script derived from the finished piece, if one applies.
    async fn derive_script(&self, title: &str, body: &str) -> Result<Option<String>, EngineError>;

    /// A short addition for an existing draft. Never a rewrite.
    async fn extend(&self, title: &str, instruction: &str) -> Result<String, EngineError>;
}
