//! LLM contract. `meta.decision` is absent when the provider declines
//! to decide; the worker falls back to the rule evaluator in that case.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("llm provider error: {0}")]
    ProviderError(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LlmMeta {
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub interest_rate_suggestion: Option<f64>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub raw_response: Option<serde_json::Value>,
}

#[async_trait]
pub trait MemoGenerator: Send + Sync {
    async fn generate(&self, features: &serde_json::Value) -> Result<(String, LlmMeta), LlmError>;
}

/// Deterministic stand-in under `SANDBOX_MODE` — produces a templated memo
/// and always defers the decision to the rule evaluator.
pub struct SandboxMemoGenerator;

#[async_trait]
impl MemoGenerator for SandboxMemoGenerator {
    async fn generate(&self, features: &serde_json::Value) -> Result<(String, LlmMeta), LlmError> {
        let memo = format!(
            "# Credit Memo (sandbox)\n\nGenerated from {} feature keys.",
            features.as_object().map(|o| o.len()).unwrap_or(0)
        );
        Ok((memo, LlmMeta::default()))
    }
}

pub struct HttpMemoGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMemoGenerator {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a bounded timeout");
        Self { client, endpoint }
    }
}

#[derive(Serialize, Deserialize)]
struct MemoResponse {
    memo_markdown: String,
    meta: LlmMeta,
}

#[async_trait]
impl MemoGenerator for HttpMemoGenerator {
    async fn generate(&self, features: &serde_json::Value) -> Result<(String, LlmMeta), LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(features)
            .send()
            .await
            .map_err(|e| LlmError::ProviderError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ProviderError(format!(
                "llm provider returned {}",
                response.status()
            )));
        }

        let parsed: MemoResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ProviderError(e.to_string()))?;
        Ok((parsed.memo_markdown, parsed.meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sandbox_generator_never_supplies_a_decision() {
        let generator = SandboxMemoGenerator;
        let (_, meta) = generator
            .generate(&serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert!(meta.decision.is_none());
    }

    #[tokio::test]
    async fn http_generator_parses_decision_and_memo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "memo_markdown": "# Memo",
                "meta": {"decision": "APPROVE", "risk_score": 0.2, "interest_rate_suggestion": 7.5},
            })))
            .mount(&server)
            .await;

        let client = HttpMemoGenerator::new(server.uri(), Duration::from_secs(5));
        let (memo, meta) = client.generate(&serde_json::json!({})).await.unwrap();
        assert_eq!(memo, "# Memo");
        assert_eq!(meta.decision.as_deref(), Some("APPROVE"));
    }
}
