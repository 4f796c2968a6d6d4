//! Configuração do pressline carregada a partir de `pressline.toml`.
//!
//! A struct [`PresslineConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis. Variáveis de
//! ambiente têm precedência sobre o arquivo para segredos e endpoints.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::orchestrator::Timeouts;

/// Caminho padrão do arquivo de configuração.
pub const DEFAULT_PATH: &str = "pressline.toml";

/// Configuração de nível superior carregada de `pressline.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresslineConfig {
    #[serde(default)]
    pub notion: NotionConfig,

    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Destino de publicação; ausente desativa a publicação de conteúdo.
    #[serde(default)]
    pub wordpress: Option<WordPressConfig>,

    /// Webhook para anúncios em redes sociais.
    #[serde(default)]
    pub social_webhook_url: Option<String>,

    /// Webhook de notificações do operador; ausente usa o console.
    #[serde(default)]
    pub notify_webhook_url: Option<String>,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Acesso ao banco de dados de conteúdo no Notion.
#[derive(Debug, Clone, Deserialize)]
pub struct NotionConfig {
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub database_id: String,

    #[serde(default = "default_notion_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicConfig {
    /// Chave da API Anthropic.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordPressConfig {
    pub base_url: String,
    pub username: String,
    pub app_password: String,
}

/// Limites de tempo, em segundos, para cada fase.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,

    #[serde(default = "default_amend_timeout_secs")]
    pub amend_timeout_secs: u64,
}

// Endpoint público da API do Notion.
fn default_notion_base_url() -> String {
    "https://api.notion.com/v1".to_string()
}

// Modelo padrão para pesquisa, redação e revisão.
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_run_timeout_secs() -> u64 {
    600
}

fn default_publish_timeout_secs() -> u64 {
    600
}

fn default_amend_timeout_secs() -> u64 {
    120
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            database_id: String::new(),
            base_url: default_notion_base_url(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: default_run_timeout_secs(),
            publish_timeout_secs: default_publish_timeout_secs(),
            amend_timeout_secs: default_amend_timeout_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn to_timeouts(self) -> Timeouts {
        Timeouts {
            run: Duration::from_secs(self.run_timeout_secs),
            publish: Duration::from_secs(self.publish_timeout_secs),
            amend: Duration::from_secs(self.amend_timeout_secs),
        }
    }
}

impl NotionConfig {
    /// Verdadeiro quando há token e banco configurados.
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty() && !self.database_id.is_empty()
    }
}

impl PresslineConfig {
    /// Carrega a configuração de `path` e aplica as variáveis de ambiente.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<PresslineConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Sobrescreve campos com valores não vazios devolvidos por `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("NOTION_TOKEN") {
            self.notion.token = v;
        }
        if let Some(v) = get("NOTION_CONTENT_DB") {
            self.notion.database_id = v;
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.anthropic.api_key = v;
        }
        if let Some(v) = get("ANTHROPIC_MODEL") {
            self.anthropic.model = v;
        }

        // Sem seção no arquivo, o WordPress só é ativado quando as três variáveis existem.
        let (url, user, pass) = (
            get("WORDPRESS_URL"),
            get("WORDPRESS_USERNAME"),
            get("WORDPRESS_APP_PASSWORD"),
        );
        if let Some(existing) = self.wordpress.as_mut() {
            if let Some(v) = url {
                existing.base_url = v;
            }
            if let Some(v) = user {
                existing.username = v;
            }
            if let Some(v) = pass {
                existing.app_password = v;
            }
        } else if let (Some(base_url), Some(username), Some(app_password)) = (url, user, pass) {
            self.wordpress = Some(WordPressConfig {
                base_url,
                username,
                app_password,
            });
        }

        if let Some(v) = get("SOCIAL_WEBHOOK_URL") {
            self.social_webhook_url = Some(v);
        }
        if let Some(v) = get("NOTIFY_WEBHOOK_URL") {
            self.notify_webhook_url = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_values() {
        let config = PresslineConfig::default();
        assert_eq!(config.notion.base_url, "https://api.notion.com/v1");
        assert!(!config.notion.is_configured());
        assert!(config.wordpress.is_none());
        assert_eq!(config.timeouts.run_timeout_secs, 600);
        assert_eq!(config.timeouts.publish_timeout_secs, 600);
        assert_eq!(config.timeouts.amend_timeout_secs, 120);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            notify_webhook_url = "https://hooks.example/notify"

            [notion]
            database_id = "db-1"

            [timeouts]
            amend_timeout_secs = 30
        "#;
        let config: PresslineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.notion.database_id, "db-1");
        assert_eq!(config.notion.base_url, "https://api.notion.com/v1");
        assert_eq!(config.timeouts.amend_timeout_secs, 30);
        assert_eq!(config.timeouts.run_timeout_secs, 600);
        assert_eq!(config.notify_webhook_url.as_deref(), Some("https://hooks.example/notify"));
        assert_eq!(config.timeouts.to_timeouts().amend, Duration::from_secs(30));
    }

    #[test]
    fn environment_takes_precedence() {
        let mut config: PresslineConfig = toml::from_str(
            r#"
            [anthropic]
            api_key = "from-file"
            "#,
        )
        .unwrap();
        config.apply_env(env(&[
            ("ANTHROPIC_API_KEY", "from-env"),
            ("NOTION_TOKEN", "secret"),
            ("NOTION_CONTENT_DB", "db"),
            ("SOCIAL_WEBHOOK_URL", "  "),
        ]));
        assert_eq!(config.anthropic.api_key, "from-env");
        assert!(config.notion.is_configured());
        assert!(config.social_webhook_url.is_none());
    }

    #[test]
    fn wordpress_needs_all_three_variables() {
        let mut config = PresslineConfig::default();
        config.apply_env(env(&[("WORDPRESS_URL", "https://blog.example")]));
        assert!(config.wordpress.is_none());

        config.apply_env(env(&[
            ("WORDPRESS_URL", "https://blog.example"),
            ("WORDPRESS_USERNAME", "editor"),
            ("WORDPRESS_APP_PASSWORD", "pw"),
        ]));
        let wp = config.wordpress.unwrap();
        assert_eq!(wp.username, "editor");
    }

    #[test]
    fn load_reads_file_and_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\nrun_timeout_secs = 42").unwrap();
        let config = PresslineConfig::load(file.path()).unwrap();
        assert_eq!(config.timeouts.run_timeout_secs, 42);

        let dir = tempfile::tempdir().unwrap();
        let missing = PresslineConfig::load(&dir.path().join("none.toml")).unwrap();
        assert_eq!(missing.timeouts.run_timeout_secs, 600);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeouts = 3").unwrap();
        assert!(PresslineConfig::load(file.path()).is_err());
    }
}
