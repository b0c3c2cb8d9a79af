//! Bank statement parser contract. The core never calls this over the
//! network — it downloads the PDF itself and surrenders the local path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("parser failed: {0}")]
    Failed(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub bank_code: String,
    pub customer_name: String,
    pub account_number: String,
    pub rows: Vec<StatementRow>,
    pub stats: StatementStats,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatementRow {
    pub date: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub reference: String,
    pub debit: Option<f64>,
    pub credit: Option<f64>,
    pub balance: f64,
    pub description: String,
    pub tx_account: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatementStats {
    pub row_count: usize,
    pub period_from: Option<String>,
    pub period_to: Option<String>,
}

#[async_trait]
pub trait BankStatementParser: Send + Sync {
    async fn parse(&self, pdf_path: &Path) -> Result<ParsedStatement, ParserError>;
}

/// Deterministic stand-in selected under `SANDBOX_MODE` — returns a
/// fixed statement shape without touching the filesystem.
pub struct SandboxParser;

#[async_trait]
impl BankStatementParser for SandboxParser {
    async fn parse(&self, _pdf_path: &Path) -> Result<ParsedStatement, ParserError> {
        Ok(ParsedStatement {
            bank_code: "SANDBOX".into(),
            customer_name: "Sandbox Customer".into(),
            account_number: "0000000000".into(),
            rows: Vec::new(),
            stats: StatementStats {
                row_count: 0,
                period_from: None,
                period_to: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sandbox_parser_returns_empty_statement() {
        let parser = SandboxParser;
        let result = parser.parse(Path::new("/tmp/doesnotmatter.pdf")).await.unwrap();
        assert_eq!(result.stats.row_count, 0);
        assert!(result.rows.is_empty());
    }
}
