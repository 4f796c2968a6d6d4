//! Request and response bodies for the Anthropic Messages endpoint.

use serde::{Deserialize, Serialize};

/// Body of a `POST /v1/messages` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

impl MessagesRequest {
    /// A single-turn request: one user message, optional system prompt.
    pub fn single(model: &str, max_tokens: u32, system: Option<&str>, prompt: String) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            system: system.map(str::to_string),
            messages: vec![Message {
                role: "user".into(),
                content: prompt,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

impl MessagesResponse {
    /// Concatenated text of every `text` block, trimmed.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.content_type == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string()
    }
}

/// `content_type` is serialized as `"type"` to match the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

// USD per million tokens (input, output).
const INPUT_RATE_PER_MTOK: f64 = 3.0;
const OUTPUT_RATE_PER_MTOK: f64 = 15.0;

impl Usage {
    /// Rough spend for this call at list price.
    pub fn estimated_cost_usd(&self) -> f64 {
        (f64::from(self.input_tokens) * INPUT_RATE_PER_MTOK
            + f64::from(self.output_tokens) * OUTPUT_RATE_PER_MTOK)
            / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_omitted_when_absent() {
        let req = MessagesRequest::single("m", 100, None, "hi".into());
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("system"));

        let req = MessagesRequest::single("m", 100, Some("be terse"), "hi".into());
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""system":"be terse""#));
    }

    #[test]
    fn response_text_joins_text_blocks() {
        let api_json = r#"{
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "  first "},
                {"type": "tool_use"},
                {"type": "text", "text": "second  "}
            ],
            "model": "test",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 15}
        }"#;
        let resp: MessagesResponse = serde_json::from_str(api_json).unwrap();
        assert_eq!(resp.text(), "first second");
    }

    #[test]
    fn usage_cost_estimate() {
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
        };
        assert!((usage.estimated_cost_usd() - 4.5).abs() < 1e-9);
    }
}
