//! Fan-in reduction of per-artifact outcomes into the gate decision.

use serde::{Deserialize, Serialize};

use crate::model::{CodeBuildInput, PerArtifactOutcome};

/// How per-artifact verdicts combine.
///
/// Both rules agree whenever every outcome carries a real boolean, which the
/// evaluator guarantees by mapping failures to `false`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationRule {
    /// Pass iff no outcome is non-compliant.
    #[default]
    NoneNonCompliant,
    /// Pass iff every outcome is compliant.
    AllCompliant,
}

/// Verdict for a run that produced no outcomes at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPolicy {
    /// Nothing to evaluate, nothing to block.
    #[default]
    Pass,
    Fail,
}

/// Aggregated decision plus the detail needed to explain it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AggregateReport {
    pub verdict: bool,
    pub rule: AggregationRule,
    pub total: usize,
    pub compliant: usize,
    pub non_compliant: Vec<CodeBuildInput>,
}

/// Reduces outcomes under a rule and an empty-input policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceAggregator {
    pub rule: AggregationRule,
    pub empty: EmptyPolicy,
}

impl ComplianceAggregator {
    pub fn new(rule: AggregationRule, empty: EmptyPolicy) -> Self {
        Self { rule, empty }
    }

    /// Pure and order-independent; call only once every outcome is resolved.
    pub fn aggregate(&self, outcomes: &[PerArtifactOutcome]) -> AggregateReport {
        let non_compliant: Vec<CodeBuildInput> = outcomes
            .iter()
            .filter(|o| !o.is_compliant)
            .map(|o| o.artifact.clone())
            .collect();
        let compliant = outcomes.len() - non_compliant.len();

        let verdict = if outcomes.is_empty() {
            self.empty == EmptyPolicy::Pass
        } else {
            match self.rule {
                AggregationRule::NoneNonCompliant => !outcomes.iter().any(|o| !o.is_compliant),
                AggregationRule::AllCompliant => outcomes.iter().all(|o| o.is_compliant),
            }
        };

        AggregateReport {
            verdict,
            rule: self.rule,
            total: outcomes.len(),
            compliant,
            non_compliant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;

    fn outcome(key: &str, ok: bool) -> PerArtifactOutcome {
        PerArtifactOutcome {
            artifact: CodeBuildInput::new("b", key),
            is_compliant: ok,
            error: None,
            handlers: vec![],
            duration_ms: 0,
        }
    }

    fn verdicts(agg: &ComplianceAggregator, flags: &[bool]) -> bool {
        let outcomes: Vec<_> = flags
            .iter()
            .enumerate()
            .map(|(i, ok)| outcome(&format!("k{i}"), *ok))
            .collect();
        agg.aggregate(&outcomes).verdict
    }

    #[test]
    fn aggregation_correctness() {
        let agg = ComplianceAggregator::default();
        assert!(verdicts(&agg, &[true, true, true]));
        assert!(!verdicts(&agg, &[true, false, true]));
        assert!(verdicts(&agg, &[]));
    }

    #[test]
    fn rules_agree_on_typed_outcomes() {
        let none = ComplianceAggregator::new(AggregationRule::NoneNonCompliant, EmptyPolicy::Pass);
        let all = ComplianceAggregator::new(AggregationRule::AllCompliant, EmptyPolicy::Pass);
        for flags in [
            vec![true],
            vec![false],
            vec![true, false],
            vec![false, false, true],
            vec![true, true, true, true],
        ] {
            assert_eq!(verdicts(&none, &flags), verdicts(&all, &flags), "{flags:?}");
        }
    }

    #[test]
    fn empty_policy_fail_rejects_vacuous_run() {
        let agg = ComplianceAggregator::new(AggregationRule::NoneNonCompliant, EmptyPolicy::Fail);
        let report = agg.aggregate(&[]);
        assert!(!report.verdict);
        assert_eq!(report.total, 0);
    }

    #[test]
    fn order_does_not_matter() {
        let agg = ComplianceAggregator::default();
        let mut outcomes = vec![outcome("a", true), outcome("b", false), outcome("c", true)];
        let first = agg.aggregate(&outcomes).verdict;
        outcomes.reverse();
        assert_eq!(agg.aggregate(&outcomes).verdict, first);
        outcomes.rotate_left(1);
        assert_eq!(agg.aggregate(&outcomes).verdict, first);
    }

    #[test]
    fn report_lists_failed_artifacts() {
        let agg = ComplianceAggregator::default();
        let failed = PerArtifactOutcome::failed(
            CodeBuildInput::new("b", "missing"),
            EvaluationError::ArtifactUnavailable {
                bucket: "b".into(),
                key: "missing".into(),
                reason: "not found".into(),
            },
            3,
        );
        let report = agg.aggregate(&[outcome("ok", true), failed]);
        assert!(!report.verdict);
        assert_eq!(report.compliant, 1);
        assert_eq!(report.non_compliant, vec![CodeBuildInput::new("b", "missing")]);
    }
}
