//! Operator notifications. Delivery is fire-and-forget: a failed send is
//! logged and never affects the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use console::{Style, Term};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str);
}

/// Writes notifications to stdout.
pub struct ConsoleNotifier {
    term: Term,
    style: Style,
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self {
            term: Term::stdout(),
            style: Style::new().cyan().bold(),
        }
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, message: &str) {
        let line = format!("{} {message}", self.style.apply_to("»"));
        if let Err(err) = self.term.write_line(&line) {
            warn!(error = %err, "console notification failed");
        }
    }
}

/// Posts notifications as `{"text": ...}` to a chat webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) {
        let result = self
            .client
            .post(&self.url)
            .json(&json!({ "text": message }))
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => debug!("notification delivered"),
            Err(err) => warn!(error = %err, "notification delivery failed"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Keeps every message for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub messages: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        pub(crate) fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    #[tokio::test]
    async fn webhook_posts_text_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"text": "ready for review"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        WebhookNotifier::new(server.uri())
            .unwrap()
            .send("ready for review")
            .await;
    }

    #[tokio::test]
    async fn webhook_failures_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        // Returns normally even though delivery failed.
        WebhookNotifier::new(server.uri()).unwrap().send("x").await;
    }
}
