//! Erros do cliente Anthropic usados pelo motor de conteúdo.
//!
//! Uma chamada ao motor é única: nenhum destes erros é retentado aqui.
//! [`AnthropicError::is_transient`] só informa os logs do chamador.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnthropicError {
    /// Cliente criado sem chave de API.
    #[error("missing API key")]
    MissingApiKey,

    /// HTTP 429; `retry_after_ms` vem do cabeçalho `retry-after`.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// HTTP 529, a API está sobrecarregada.
    #[error("API overloaded")]
    Overloaded,

    /// Qualquer outro status 4xx/5xx, com o corpo da resposta como mensagem.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl AnthropicError {
    /// Verdadeiro quando repetir mais tarde provavelmente funcionaria.
    pub fn is_transient(&self) -> bool {
        match self {
            AnthropicError::RateLimited { .. } | AnthropicError::Overloaded => true,
            AnthropicError::ApiError { status, .. } => *status >= 500,
            AnthropicError::NetworkError(err) => err.is_timeout() || err.is_connect(),
            AnthropicError::MissingApiKey => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(AnthropicError::Overloaded.is_transient());
        assert!(AnthropicError::RateLimited { retry_after_ms: 1 }.is_transient());
        let bad_request = AnthropicError::ApiError {
            status: 400,
            message: "prompt too long".into(),
        };
        assert!(!bad_request.is_transient());
        assert!(!AnthropicError::MissingApiKey.is_transient());
    }

    #[test]
    fn api_error_display() {
        let err = AnthropicError::ApiError {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "API error (status 502): bad gateway");
    }
}
