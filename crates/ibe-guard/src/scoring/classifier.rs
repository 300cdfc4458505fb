// scoring/classifier.rs — classifier-v1: majority keyword overlap per step.

use ibe_attest::{AgentPlan, Evidence, IntentDeclaration};

use super::{
    clamp_unit, coverage_of, extract_keywords, AlignmentScorer, CLASSIFIER_V1,
    EMPTY_PLAN_EVIDENCE,
};

/// A step is aligned when its prompt or URL contains at least half of the
/// purpose keywords. Every step aligns when the purpose has no keywords.
/// Risk is 0.5 for any predicted write.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierScorer;

impl AlignmentScorer for ClassifierScorer {
    fn method(&self) -> &str {
        CLASSIFIER_V1
    }

    fn score(&self, intent: &IntentDeclaration, plan: &AgentPlan) -> Evidence {
        if plan.steps.is_empty() {
            return EMPTY_PLAN_EVIDENCE;
        }
        let keywords = extract_keywords(&intent.purpose);
        let coverage = coverage_of(plan, |step| {
            if keywords.is_empty() {
                return true;
            }
            let text = step.alignment_text().unwrap_or_default();
            let matches = keywords
                .iter()
                .filter(|k| text.contains(k.as_str()))
                .count();
            matches * 2 >= keywords.len()
        });

        let risk = if plan.totals.predicted_writes > 0 { 0.5 } else { 0.0 };
        Evidence {
            coverage,
            risk: clamp_unit(risk),
        }
    }
}
