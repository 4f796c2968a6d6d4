//! Content publishing through the WordPress REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::ContentPublisher;
use crate::config::WordPressConfig;
use crate::error::PublishError;

pub struct WordPressPublisher {
    client: Client,
    base_url: String,
    username: String,
    app_password: String,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: u64,
    #[serde(default)]
    link: Option<String>,
}

impl WordPressPublisher {
    pub fn new(config: &WordPressConfig) -> Result<Self, PublishError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            app_password: config.app_password.clone(),
        })
    }
}

fn with_audio(html: &str, audio_refs: &[String]) -> String {
    let players: String = audio_refs
        .iter()
        .map(|src| format!("<audio controls src=\"{src}\"></audio>\n"))
        .collect();
    format!("{players}{html}")
}

#[async_trait]
impl ContentPublisher for WordPressPublisher {
    async fn content_publish(
        &self,
        title: &str,
        html: &str,
        meta_description: Option<&str>,
        audio_refs: &[String],
    ) -> Result<String, PublishError> {
        let body = json!({
            "title": title,
            "content": with_audio(html, audio_refs),
            "excerpt": meta_description.unwrap_or_default(),
            "status": "publish",
        });
        let response = self
            .client
            .post(format!("{}/wp-json/wp/v2/posts", self.base_url))
            .basic_auth(&self.username, Some(&self.app_password))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let post: PostResponse = response.json().await?;
        debug!(post_id = post.id, "wordpress post created");
        post.link
            .filter(|l| !l.is_empty())
            .ok_or_else(|| PublishError::Rejected(format!("post {} has no public link", post.id)))
    }
}
