//! Collateral enrichment contract. Grounded in the teacher's
//! `MarketDataClient` (`trading-runtime/src/market_data.rs`): `reqwest`
//! client with a bounded timeout, `wiremock`-testable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::job::CanonicalPayload;

#[derive(Error, Debug)]
pub enum CollateralError {
    #[error("collateral enrichment unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralSource {
    MlModel,
    WebSearch,
    DeclaredFallback,
    NotProvided,
    Unavailable,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollateralValuation {
    pub value: f64,
    pub currency: String,
    pub confidence: f64,
    pub source: CollateralSource,
    pub risk_score: f64,
    #[serde(default)]
    pub market: Option<serde_json::Value>,
}

#[async_trait]
pub trait CollateralValuator: Send + Sync {
    async fn valuate(&self, payload: &CanonicalPayload) -> Result<CollateralValuation, CollateralError>;
}

/// Deterministic stand-in under `SANDBOX_MODE`: always returns a
/// `declared_fallback` valuation derived from the payload's own declared
/// collateral map, with no network call.
pub struct SandboxCollateralValuator;

#[async_trait]
impl CollateralValuator for SandboxCollateralValuator {
    async fn valuate(&self, payload: &CanonicalPayload) -> Result<CollateralValuation, CollateralError> {
        let declared_value = payload
            .collateral
            .get("declared_value")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        Ok(CollateralValuation {
            value: declared_value,
            currency: "USD".into(),
            confidence: if declared_value > 0.0 { 0.4 } else { 0.0 },
            source: if declared_value > 0.0 {
                CollateralSource::DeclaredFallback
            } else {
                CollateralSource::NotProvided
            },
            risk_score: 0.5,
            market: None,
        })
    }
}

/// Production client backed by an HTTP valuation service.
pub struct HttpCollateralValuator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCollateralValuator {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a bounded timeout");
        Self { client, endpoint }
    }
}

#[async_trait]
impl CollateralValuator for HttpCollateralValuator {
    async fn valuate(&self, payload: &CanonicalPayload) -> Result<CollateralValuation, CollateralError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| CollateralError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CollateralError::Unavailable(format!(
                "collateral service returned {}",
                response.status()
            )));
        }

        response
            .json::<CollateralValuation>()
            .await
            .map_err(|e| CollateralError::Unavailable(e.to_string()))
    }
}
