//! A deterministic engine that needs no network. Drives `pressline demo`
//! and stands in when no API key is configured.

use async_trait::async_trait;

use super::{ContentEngine, Critique, DraftMetadata, GeneratedDraft, Research, ResearchRequest};
use crate::error::EngineError;
use crate::state_machine::ContentType;

#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineEngine;

fn title_case(topic: &str) -> String {
    topic
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl ContentEngine for OfflineEngine {
    async fn research(&self, request: &ResearchRequest) -> Result<Research, EngineError> {
        // Offline mode has nothing to look up.
        let _ = request;
        Ok(Research::default())
    }

    async fn generate(
        &self,
        topic: &str,
        _research: &Research,
        audience: Option<&str>,
        content_type: ContentType,
    ) -> Result<GeneratedDraft, EngineError> {
        let title = title_case(topic);
        let audience = audience.unwrap_or("practitioners");
        let body = format!(
            "# {title}\n\n\
             This {kind} introduces {topic} for {audience}.\n\n\
             ## Background\n\n\
             Placeholder background section written without a content engine.\n\n\
             ## Key points\n\n\
             - What {topic} is\n\
             - Why it matters now\n\
             - Where to go next",
            kind = content_type.to_string().to_lowercase(),
        );
        Ok(GeneratedDraft {
            title,
            body,
            metadata: DraftMetadata {
                meta_description: Some(format!("An introduction to {topic}.")),
                excerpt: Some(format!("A short primer on {topic}.")),
                cost_usd: 0.0,
            },
        })
    }

    async fn critique(&self, _body: &str, _topic: &str) -> Result<Critique, EngineError> {
        Ok(Critique {
            quality_score: 7.0,
            issues: Vec::new(),
            needs_revision: false,
        })
    }

    async fn revise(
        &self,
        body: &str,
        _issues: &[String],
        _topic: &str,
    ) -> Result<String, EngineError> {
        Ok(body.to_string())
    }

    async fn derive_script(&self, title: &str, _body: &str) -> Result<Option<String>, EngineError> {
        Ok(Some(format!("Welcome. Today we talk about {title}.")))
    }

    async fn extend(&self, _title: &str, instruction: &str) -> Result<String, EngineError> {
        Ok(format!("## Addendum\n\nNotes requested by the editor: {instruction}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_draft_passes_its_own_critique() {
        let engine = OfflineEngine;
        let draft = engine
            .generate("rust in the kernel", &Research::default(), None, ContentType::Article)
            .await
            .unwrap();
        assert_eq!(draft.title, "Rust In The Kernel");
        assert!(engine.critique(&draft.body, "x").await.unwrap().passed());
    }
}
