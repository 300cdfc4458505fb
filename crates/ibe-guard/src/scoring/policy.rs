// scoring/policy.rs — external-policy-v1: operator-supplied keyword policy.

use serde::{Deserialize, Serialize};

use ibe_attest::{AgentPlan, Evidence, IntentDeclaration};

use super::{
    clamp_unit, contains_any, coverage_of, extract_keywords, AlignmentScorer,
    EMPTY_PLAN_EVIDENCE, EXTERNAL_POLICY_V1,
};

/// Risk contributed by predicted writes when no policy is configured.
pub const DEFAULT_WRITE_RISK: f64 = 0.5;

/// Keyword policy fed to `external-policy-v1`.
///
/// ```toml
/// [external_policy]
/// keywords = ["summary", "brief"]
/// write_risk = 0.7
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalPolicy {
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default = "default_write_risk", alias = "writeRisk")]
    pub write_risk: f64,
}

fn default_write_risk() -> f64 {
    DEFAULT_WRITE_RISK
}

impl ExternalPolicy {
    /// Non-empty keywords, lower-cased.
    fn normalized_keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| k.to_lowercase())
            .collect()
    }
}

/// A step is aligned when its prompt or URL contains any policy keyword.
/// Risk is the policy's write risk when any write is predicted.
///
/// Without a configured policy, keywords come from the intent's purpose and
/// write risk is [`DEFAULT_WRITE_RISK`].
#[derive(Debug, Clone, Default)]
pub struct ExternalPolicyScorer {
    policy: Option<ExternalPolicy>,
}

impl ExternalPolicyScorer {
    pub fn new(policy: Option<ExternalPolicy>) -> Self {
        Self { policy }
    }

    fn effective_policy(&self, intent: &IntentDeclaration) -> (Vec<String>, f64) {
        match &self.policy {
            Some(policy) => (policy.normalized_keywords(), policy.write_risk),
            None => (extract_keywords(&intent.purpose), DEFAULT_WRITE_RISK),
        }
    }
}

impl AlignmentScorer for ExternalPolicyScorer {
    fn method(&self) -> &str {
        EXTERNAL_POLICY_V1
    }

    fn score(&self, intent: &IntentDeclaration, plan: &AgentPlan) -> Evidence {
        if plan.steps.is_empty() {
            return EMPTY_PLAN_EVIDENCE;
        }
        let (keywords, write_risk) = self.effective_policy(intent);
        let coverage = coverage_of(plan, |step| {
            step.alignment_text()
                .is_some_and(|text| contains_any(&text, &keywords))
        });

        let risk = if plan.totals.predicted_writes > 0 {
            write_risk
        } else {
            0.0
        };
        Evidence {
            coverage,
            risk: clamp_unit(risk),
        }
    }
}
