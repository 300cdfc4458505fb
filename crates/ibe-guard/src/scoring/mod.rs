// scoring/mod.rs — Alignment scoring strategies and their lookup table.
//
// A scorer judges how well a plan serves an intent and returns evidence:
// `coverage` (fraction of steps judged aligned) and `risk` (heuristic
// hazard), both in [0, 1]. Strategies are keyed by method tag so the guard
// can select one from configuration and recompute what an alignment proof
// declares. An empty plan always scores (0, 1).

mod classifier;
mod policy;
mod semantic;

use std::collections::HashMap;
use std::sync::Arc;

use ibe_attest::{AgentPlan, Evidence, IntentDeclaration};

pub use classifier::ClassifierScorer;
pub use policy::{ExternalPolicy, ExternalPolicyScorer};
pub use semantic::SemanticEntailmentScorer;

/// Method tag of the keyword-entailment scorer (the default).
pub const SEMANTIC_ENTAILMENT_V1: &str = "semantic-entailment-v1";
/// Method tag of the externally supplied keyword policy scorer.
pub const EXTERNAL_POLICY_V1: &str = "external-policy-v1";
/// Method tag of the majority-overlap scorer.
pub const CLASSIFIER_V1: &str = "classifier-v1";

/// Absolute tolerance when comparing declared and recomputed evidence.
pub const EVIDENCE_TOLERANCE: f64 = 1e-9;

/// Evidence for a plan with no steps: maximally unaligned and risky.
pub const EMPTY_PLAN_EVIDENCE: Evidence = Evidence {
    coverage: 0.0,
    risk: 1.0,
};

/// Write-flavoured verbs that raise the risk of a purpose.
pub(crate) const RISKY_VERBS: &[&str] = &["send", "post", "write", "export", "email", "delete"];

/// A deterministic alignment scoring strategy.
pub trait AlignmentScorer: Send + Sync {
    /// The method tag this scorer answers to.
    fn method(&self) -> &str;

    /// Score `plan` against `intent`. Both values must lie in [0, 1].
    fn score(&self, intent: &IntentDeclaration, plan: &AgentPlan) -> Evidence;
}

/// Scorers keyed by method tag.
pub struct ScorerRegistry {
    scorers: HashMap<String, Arc<dyn AlignmentScorer>>,
}

impl ScorerRegistry {
    /// A registry with no scorers.
    pub fn empty() -> Self {
        Self {
            scorers: HashMap::new(),
        }
    }

    /// A registry holding the three built-in strategies.
    ///
    /// `external_policy` feeds `external-policy-v1`; without one it derives
    /// keywords from each intent's purpose.
    pub fn builtin(external_policy: Option<ExternalPolicy>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SemanticEntailmentScorer));
        registry.register(Arc::new(ExternalPolicyScorer::new(external_policy)));
        registry.register(Arc::new(ClassifierScorer));
        registry
    }

    /// Add or replace the scorer for its method tag.
    pub fn register(&mut self, scorer: Arc<dyn AlignmentScorer>) {
        self.scorers.insert(scorer.method().to_string(), scorer);
    }

    /// Look up the scorer for `method`.
    pub fn get(&self, method: &str) -> Option<Arc<dyn AlignmentScorer>> {
        self.scorers.get(method).cloned()
    }

    /// The scorer for `method`, falling back to semantic entailment when the
    /// tag is not registered.
    pub fn resolve(&self, method: &str) -> Arc<dyn AlignmentScorer> {
        if let Some(scorer) = self.get(method) {
            return scorer;
        }
        tracing::warn!(
            method,
            fallback = SEMANTIC_ENTAILMENT_V1,
            "unknown scoring method, using default"
        );
        self.get(SEMANTIC_ENTAILMENT_V1)
            .unwrap_or_else(|| Arc::new(SemanticEntailmentScorer))
    }

    /// Registered method tags, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.scorers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }
}

impl Default for ScorerRegistry {
    fn default() -> Self {
        Self::builtin(None)
    }
}

/// Whether declared and recomputed evidence agree within [`EVIDENCE_TOLERANCE`].
pub fn evidence_matches(declared: &Evidence, recomputed: &Evidence) -> bool {
    (declared.coverage - recomputed.coverage).abs() <= EVIDENCE_TOLERANCE
        && (declared.risk - recomputed.risk).abs() <= EVIDENCE_TOLERANCE
}

/// Keywords of a text: lower-cased ASCII alphabetic runs of at least four
/// letters, de-duplicated, in first-seen order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();
    for word in lowered.split(|c: char| !c.is_ascii_lowercase()) {
        if word.len() < 4 || keywords.iter().any(|k| k == word) {
            continue;
        }
        keywords.push(word.to_string());
    }
    keywords
}

pub(crate) fn contains_any(text: &str, terms: &[String]) -> bool {
    terms.iter().any(|t| text.contains(t.as_str()))
}

/// Clamp a risk into [0, 1]. NaN counts as maximal risk.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 1.0;
    }
    value.clamp(0.0, 1.0)
}

/// Fraction of `plan` steps for which `aligned` holds.
pub(crate) fn coverage_of<F>(plan: &AgentPlan, aligned: F) -> f64
where
    F: Fn(&ibe_attest::PlanStep) -> bool,
{
    let hits = plan.steps.iter().filter(|s| aligned(s)).count();
    hits as f64 / plan.steps.len() as f64
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};
    use ibe_attest::{
        AgentPlan, Constraints, IntentDeclaration, ModelInfo, PlanStep, PlanTotals, Principal,
        Proof, RiskBudget, StepAlignment, StepExpected, TimeBound,
    };
    use serde_json::{json, Map, Value};

    pub fn intent(purpose: &str) -> IntentDeclaration {
        IntentDeclaration {
            record_type: "UIA".to_string(),
            id: "urn:uia:test".to_string(),
            subject: Principal {
                id: "user:demo".to_string(),
            },
            purpose: purpose.to_string(),
            constraints: Constraints {
                data_classes: vec!["derived".to_string()],
                jurisdictions: vec![],
                time_window: TimeBound {
                    not_after: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
                },
            },
            risk_budget: RiskBudget {
                level: 1,
                max_writes: 0,
                max_records: 1000,
                max_external_calls: 0,
            },
            policy_profile: "research-readonly".to_string(),
            proof: Proof::default(),
        }
    }

    pub fn step(id: &str, tool: &str, args: Value) -> PlanStep {
        let args: Map<String, Value> = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        PlanStep {
            id: id.to_string(),
            tool: tool.to_string(),
            args,
            expected: StepExpected {
                data_classes: vec!["derived".to_string()],
                writes: 0,
            },
            alignment: StepAlignment::default(),
        }
    }

    pub fn generate(id: &str, prompt: &str) -> PlanStep {
        step(id, "ollama.generate", json!({ "prompt": prompt }))
    }

    pub fn fetch(id: &str, url: &str) -> PlanStep {
        step(id, "http.get", json!({ "url": url }))
    }

    pub fn plan(steps: Vec<PlanStep>, predicted_writes: u32) -> AgentPlan {
        AgentPlan {
            record_type: "APA".to_string(),
            id: "apa-test".to_string(),
            uia: "urn:uia:test".to_string(),
            model: ModelInfo {
                hash: "ollama-local".to_string(),
                ..ModelInfo::default()
            },
            steps,
            totals: PlanTotals {
                predicted_writes,
                predicted_records: 1,
            },
            proof: Proof::default(),
        }
    }
}
