// scoring/semantic.rs — semantic-entailment-v1: keyword entailment of the purpose.

use ibe_attest::{AgentPlan, Evidence, IntentDeclaration, PlanStep, ToolKind};

use super::{
    clamp_unit, contains_any, coverage_of, extract_keywords, AlignmentScorer,
    EMPTY_PLAN_EVIDENCE, RISKY_VERBS, SEMANTIC_ENTAILMENT_V1,
};

/// A step is aligned when its prompt or URL mentions a purpose keyword.
///
/// Fetches with a URL are also aligned when the purpose yields no keywords.
/// Risk is 0.5 for any predicted write plus 0.3 when the purpose reads like
/// an outbound action (send, export, delete, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticEntailmentScorer;

fn entails(step: &PlanStep, keywords: &[String]) -> bool {
    let Some(text) = step.alignment_text() else {
        return false;
    };
    match step.kind() {
        Some(ToolKind::Fetch) => keywords.is_empty() || contains_any(&text, keywords),
        _ => contains_any(&text, keywords),
    }
}

impl AlignmentScorer for SemanticEntailmentScorer {
    fn method(&self) -> &str {
        SEMANTIC_ENTAILMENT_V1
    }

    fn score(&self, intent: &IntentDeclaration, plan: &AgentPlan) -> Evidence {
        if plan.steps.is_empty() {
            return EMPTY_PLAN_EVIDENCE;
        }
        let purpose = intent.purpose.to_lowercase();
        let keywords = extract_keywords(&purpose);
        let coverage = coverage_of(plan, |step| entails(step, &keywords));

        let mut risk = 0.0;
        if plan.totals.predicted_writes > 0 {
            risk += 0.5;
        }
        if RISKY_VERBS.iter().any(|verb| purpose.contains(verb)) {
            risk += 0.3;
        }
        Evidence {
            coverage,
            risk: clamp_unit(risk),
        }
    }
}
