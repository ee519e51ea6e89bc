//! Documentation generation client
//!
//! Thin wrapper over an OpenAI-compatible chat completions endpoint. The
//! model turns source code into reference docs, docstrings, or a README
//! depending on the requested doc type.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Result of one generation call
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub tokens_used: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum DocGenError {
    #[error("Generation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Generation API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Generation API returned no content")]
    EmptyResponse,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    total_tokens: Option<i32>,
}

#[derive(Clone)]
pub struct DocGenClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl DocGenClient {
    /// Build from environment; None when DOCGEN_API_KEY is unset
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("DOCGEN_API_KEY").ok().filter(|k| !k.is_empty())?;
        let base_url = std::env::var("DOCGEN_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model =
            std::env::var("DOCGEN_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Some(Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
        })
    }

    #[cfg(test)]
    fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }

    /// Generate documentation for one source file
    pub async fn generate(
        &self,
        language: &str,
        doc_type: &str,
        source: &str,
    ) -> Result<Generation, DocGenError> {
        let prompt = format!(
            "Write {} documentation in Markdown for the following {} code. \
             Document every public item; do not restate the code.\n\n```{}\n{}\n```",
            doc_type, language, language, source
        );

        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a technical writer producing precise, idiomatic code documentation."
                },
                { "role": "user", "content": prompt }
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DocGenError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        let tokens_used = completion.usage.and_then(|u| u.total_tokens);
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.is_empty())
            .ok_or(DocGenError::EmptyResponse)?;

        Ok(Generation { text, tokens_used })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_parses_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(
                r#"{
                    "choices": [{"message": {"content": "# Docs\n\nGenerated."}}],
                    "usage": {"total_tokens": 321}
                }"#,
            )
            .create_async()
            .await;

        let client = DocGenClient::with_base_url("test-key", &server.url());
        let generation = client
            .generate("rust", "reference", "pub fn add(a: i32, b: i32) -> i32 { a + b }")
            .await
            .unwrap();

        assert_eq!(generation.text, "# Docs\n\nGenerated.");
        assert_eq!(generation.tokens_used, Some(321));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": "rate limited"}"#)
            .create_async()
            .await;

        let client = DocGenClient::with_base_url("test-key", &server.url());
        let err = client.generate("rust", "reference", "fn main() {}").await;

        match err {
            Err(DocGenError::Api { status, .. }) => assert_eq!(status, 429),
            other => panic!("expected Api error, got {:?}", other.map(|g| g.text)),
        }
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": ""}}], "usage": null}"#)
            .create_async()
            .await;

        let client = DocGenClient::with_base_url("test-key", &server.url());
        let err = client.generate("rust", "reference", "fn main() {}").await;

        assert!(matches!(err, Err(DocGenError::EmptyResponse)));
    }
}
