use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::SocialPoster;
use crate::error::PublishError;

/// Announces published posts by POSTing JSON to a webhook.
pub struct WebhookSocialPoster {
    client: Client,
    url: String,
}

impl WebhookSocialPoster {
    pub fn new(url: impl Into<String>) -> Result<Self, PublishError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SocialPoster for WebhookSocialPoster {
    async fn social_post(
        &self,
        title: &str,
        url: &str,
        excerpt: Option<&str>,
    ) -> Result<bool, PublishError> {
        let text = match excerpt {
            Some(e) if !e.is_empty() => format!("{title}\n\n{e}\n\n{url}"),
            _ => format!("{title}\n\n{url}"),
        };
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "text": text, "title": title, "url": url }))
            .send()
            .await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(PublishError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(status.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_title_and_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"url": "https://blog.example/p"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let poster = WebhookSocialPoster::new(server.uri()).unwrap();
        assert!(poster.social_post("T", "https://blog.example/p", Some("e")).await.unwrap());
    }

    #[tokio::test]
    async fn client_errors_mean_declined() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let poster = WebhookSocialPoster::new(server.uri()).unwrap();
        assert!(!poster.social_post("T", "u", None).await.unwrap());
    }
}
