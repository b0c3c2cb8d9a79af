//! Job Store data model: Job, Payload, Features, Result, Audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates an opaque id with the given prefix, e.g. `uwo_` for jobs.
pub fn prefixed_id(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Terminal states never revert.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub job_id: String,
    pub tenant_id: String,
    pub client_job_id: String,
    pub status: String,
    pub idempotency_key: Option<String>,
    pub callback_url: String,
    pub request_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        JobStatus::parse(&self.status).expect("status column always holds a valid JobStatus")
    }
}

/// 1:1 with Job; holds the original canonical submission, encrypted at rest.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Payload {
    pub job_id: String,
    pub json_encrypted: Vec<u8>,
}

/// 1:1 with Job, optional until the worker fuses raw+parser+enrichment data.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Features {
    pub job_id: String,
    pub json_encrypted: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approve,
    Review,
    Decline,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Review => "REVIEW",
            Decision::Decline => "DECLINE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "APPROVE" => Some(Decision::Approve),
            "REVIEW" => Some(Decision::Review),
            "DECLINE" => Some(Decision::Decline),
            _ => None,
        }
    }
}

/// 1:1 with Job, optional until terminal.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ResultRecord {
    pub job_id: String,
    pub memo_markdown: String,
    pub memo_pdf_url: Option<String>,
    pub risk_score: Option<f64>,
    pub decision: String,
    pub interest_rate_suggestion: Option<f64>,
    pub json_tail_encrypted: Vec<u8>,
}

/// Append-only, many per Job. Never mutated or deleted.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Audit {
    pub id: i64,
    pub job_id: String,
    pub actor: String,
    pub action: String,
    pub hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The canonical submission body. Known fields are typed; the
/// free-form regions (`third_party_data`, `collateral`) stay opaque JSON so
/// the vault can seal them byte-for-byte without the core reasoning about
/// their shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalPayload {
    pub job_id: String,
    pub tenant_id: String,
    pub applicant: Applicant,
    pub loan: Loan,
    pub consent_artifact: ConsentArtifact,
    #[serde(default)]
    pub third_party_data: serde_json::Value,
    pub documents: Documents,
    #[serde(default)]
    pub collateral: serde_json::Value,
    pub callback_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Applicant {
    pub citizen_id: String,
    pub full_name: String,
    pub phone: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Loan {
    #[serde(rename = "type")]
    pub loan_type: String,
    pub amount: f64,
    pub term_months: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsentArtifact {
    pub provider: String,
    pub reference: String,
    pub scopes: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Documents {
    #[serde(default)]
    pub bank_statement_url: Option<String>,
    #[serde(default)]
    pub bank_statement_period: Option<BankStatementPeriod>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BankStatementPeriod {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}
