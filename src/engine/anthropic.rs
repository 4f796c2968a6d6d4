use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{ContentEngine, Critique, DraftMetadata, GeneratedDraft, Research, ResearchRequest};
use crate::anthropic::{MessageSender, MessagesRequest, MessagesResponse};
use crate::error::EngineError;
use crate::state_machine::ContentType;

const SYSTEM: &str = "You are a research writer for a technical publication. \
                      When asked for JSON, reply with a single JSON object and nothing else.";

/// Content engine backed by the Anthropic Messages API.
pub struct AnthropicEngine<C> {
    client: C,
    model: String,
}

#[derive(Debug, Deserialize)]
struct DraftReply {
    title: String,
    body: String,
    #[serde(default)]
    meta_description: Option<String>,
    #[serde(default)]
    excerpt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScriptReply {
    #[serde(default)]
    script: Option<String>,
}

impl<C: MessageSender> AnthropicEngine<C> {
    pub fn new(client: C, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    async fn ask(&self, max_tokens: u32, prompt: String) -> Result<MessagesResponse, EngineError> {
        let req = MessagesRequest::single(&self.model, max_tokens, Some(SYSTEM), prompt);
        let response = match self.client.send_message(&req).await {
            Ok(response) => response,
            Err(err) => {
                warn!(model = %self.model, transient = err.is_transient(), error = %err, "engine call failed");
                return Err(err.into());
            }
        };
        debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "engine call complete"
        );
        Ok(response)
    }

    async fn ask_json<T: DeserializeOwned>(
        &self,
        max_tokens: u32,
        prompt: String,
    ) -> Result<(T, f64), EngineError> {
        let response = self.ask(max_tokens, prompt).await?;
        let parsed = parse_json(&response.text())?;
        Ok((parsed, response.usage.estimated_cost_usd()))
    }
}

/// Parse the outermost JSON object in `text`, tolerating code fences or chatter.
fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, EngineError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if e > s => &text[s..=e],
        _ => return Err(EngineError::Parse(format!("no JSON object in: {text:.80}"))),
    };
    serde_json::from_str(slice).map_err(|e| EngineError::Parse(e.to_string()))
}

fn research_notes(research: &Research) -> String {
    if research.is_empty() {
        return "No external research is available; rely on well-established facts.".into();
    }
    let mut notes = String::from("Research findings:\n");
    for finding in &research.findings {
        notes.push_str(&format!("- {finding}\n"));
    }
    if !research.sources.is_empty() {
        notes.push_str("Sources:\n");
        for source in &research.sources {
            notes.push_str(&format!("- {} ({})\n", source.title, source.url));
        }
    }
    notes
}

#[async_trait]
impl<C: MessageSender> ContentEngine for AnthropicEngine<C> {
    async fn research(&self, request: &ResearchRequest) -> Result<Research, EngineError> {
        let scope = request
            .context
            .as_deref()
            .map(|c| format!("\nFocus on: {c}"))
            .unwrap_or_default();
        let prompt = format!(
            "Research the topic \"{}\".{scope}\n\
             Return JSON: {{\"sources\": [{{\"title\": \"...\", \"url\": \"...\"}}], \
             \"findings\": [\"...\"]}} with at most {} sources.",
            request.topic, request.max_lookups
        );
        let (mut research, cost): (Research, f64) = self.ask_json(2048, prompt).await?;
        research
            .sources
            .truncate(usize::try_from(request.max_lookups).unwrap_or(usize::MAX));
        research.cost_usd = cost;
        Ok(research)
    }

    async fn generate(
        &self,
        topic: &str,
        research: &Research,
        audience: Option<&str>,
        content_type: ContentType,
    ) -> Result<GeneratedDraft, EngineError> {
        let audience = audience.unwrap_or("technical practitioners");
        let prompt = format!(
            "Write a {content_type} about \"{topic}\" for {audience} in markdown.\n\
             {}\n\
             Return JSON: {{\"title\": \"...\", \"body\": \"...\", \
             \"meta_description\": \"...\", \"excerpt\": \"...\"}}",
            research_notes(research)
        );
        let (reply, cost): (DraftReply, f64) = self.ask_json(8192, prompt).await?;
        if reply.body.trim().is_empty() {
            return Err(EngineError::Empty);
        }
        Ok(GeneratedDraft {
            title: reply.title,
            body: reply.body,
            metadata: DraftMetadata {
                meta_description: reply.meta_description,
                excerpt: reply.excerpt,
                cost_usd: cost,
            },
        })
    }

    async fn critique(&self, body: &str, topic: &str) -> Result<Critique, EngineError> {
        let prompt = format!(
            "Review this draft about \"{topic}\" for accuracy, structure and completeness.\n\
             Return JSON: {{\"quality_score\": 0-10, \"issues\": [\"...\"], \
             \"needs_revision\": true|false}}\n\n{body}"
        );
        let (critique, _): (Critique, f64) = self.ask_json(1024, prompt).await?;
        Ok(critique)
    }

    async fn revise(
        &self,
        body: &str,
        issues: &[String],
        topic: &str,
    ) -> Result<String, EngineError> {
        let prompt = format!(
            "Revise this markdown draft about \"{topic}\" to fix these issues:\n- {}\n\n\
             Reply with the full revised markdown only.\n\n{body}",
            issues.join("\n- ")
        );
        let revised = self.ask(8192, prompt).await?.text();
        if revised.is_empty() {
            return Err(EngineError::Empty);
        }
        Ok(revised)
    }

    async fn derive_script(&self, title: &str, body: &str) -> Result<Option<String>, EngineError> {
        let prompt = format!(
            "Turn the article \"{title}\" into a spoken podcast script without markdown.\n\
             Return JSON: {{\"script\": \"...\"}}, or {{\"script\": null}} if it does not suit audio.\n\n{body}"
        );
        let (reply, _): (ScriptReply, f64) = self.ask_json(4096, prompt).await?;
        Ok(reply.script.filter(|s| !s.trim().is_empty()))
    }

    async fn extend(&self, title: &str, instruction: &str) -> Result<String, EngineError> {
        let prompt = format!(
            "You are helping revise the article \"{title}\". The editor asks: {instruction}\n\
             Write ONLY the new content to add, in markdown with ## headings, at most 600 words."
        );
        let addition = self.ask(1200, prompt).await?.text();
        if addition.is_empty() {
            return Err(EngineError::Empty);
        }
        Ok(addition)
    }
}
