//! Webhook Emitter: synchronous retrying POST with linear backoff.
//! Signature travels in the `X-Softmax-Signature` header over the exact
//! POSTed bytes.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::auth::sign_payload;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("webhook delivery exhausted {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Field order here is the wire order the receiver signs against — a plain
/// derive keeps it stable without a custom canonicalizer.
#[derive(Clone, Debug, Serialize)]
pub struct WebhookPayload {
    pub event: &'static str,
    pub job_id: String,
    pub client_job_id: String,
    pub decision: String,
    pub interest_rate_suggestion: Option<f64>,
    pub risk_score: Option<f64>,
    pub llm_input: serde_json::Value,
    pub credit_memo_markdown: String,
    pub attachments: Vec<String>,
    pub audit_ref: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct WebhookEmitter {
    client: reqwest::Client,
    max_attempts: u32,
    backoff_seconds: u64,
}

impl WebhookEmitter {
    pub fn new(timeout: Duration, max_attempts: u32, backoff_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a bounded timeout");
        Self {
            client,
            max_attempts,
            backoff_seconds,
        }
    }

    /// POSTs `payload` to `callback_url`, signed with `webhook_secret`.
    /// Sleeps `backoff_seconds * attempt` between attempts (linear backoff).
    /// Returns `Ok(attempts_made)` on a 2xx, `Err` after exhaustion.
    pub async fn emit(
        &self,
        callback_url: &str,
        payload: &WebhookPayload,
        webhook_secret: &str,
    ) -> Result<u32, WebhookError> {
        let body = serde_json::to_vec(payload).expect("WebhookPayload always serializes");
        let signature = sign_payload(webhook_secret, &body);

        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            let result = self
                .client
                .post(callback_url)
                .header("Content-Type", "application/json")
                .header("X-Softmax-Signature", &signature)
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(attempt),
                Ok(response) => {
                    last_error = format!("non-2xx status {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(Duration::from_secs(self.backoff_seconds * attempt as u64))
                    .await;
            }
        }

        Err(WebhookError::Exhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}
