//! Rule evaluator contract: a synchronous fallback invoked only when
//! the LLM's `meta.decision` is absent. It never overrides a
//! `risk_score`/`interest_rate_suggestion` the LLM did supply — only the
//! `decision` field is substituted.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleDecision {
    pub decision: String,
    pub reasons: Vec<String>,
}

pub trait RuleEvaluator: Send + Sync {
    fn evaluate(&self, features: &serde_json::Value) -> RuleDecision;
}

/// Simple declared-collateral/risk-score heuristic, deterministic and
/// dependency-free — the fallback of last resort.
pub struct DefaultRuleEvaluator;

impl RuleEvaluator for DefaultRuleEvaluator {
    fn evaluate(&self, features: &serde_json::Value) -> RuleDecision {
        let collateral_risk = features
            .get("collateral")
            .and_then(|c| c.get("risk_score"))
            .and_then(|v| v.as_f64());

        match collateral_risk {
            Some(risk) if risk >= 0.8 => RuleDecision {
                decision: "DECLINE".into(),
                reasons: vec!["collateral risk score too high".into()],
            },
            Some(risk) if risk >= 0.4 => RuleDecision {
                decision: "REVIEW".into(),
                reasons: vec!["collateral risk score requires manual review".into()],
            },
            Some(_) => RuleDecision {
                decision: "APPROVE".into(),
                reasons: vec!["collateral risk score within tolerance".into()],
            },
            None => RuleDecision {
                decision: "REVIEW".into(),
                reasons: vec!["no collateral risk signal available".into()],
            },
        }
    }
}
