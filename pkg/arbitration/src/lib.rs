//! Arbitration engine — architecture §4.5. Fuses independent
//! `ValidatorResult`s for one claim into a single `Disposition` under a
//! configured strategy, with conflict-resolution rules evaluated first.

use std::collections::HashMap;

use ranking::jaccard_overlap;
use schema::{
    ArbitrationConfig, ArbitrationStrategy, Claim, ConflictAction, ConflictRule, Disposition,
    EvidenceSpan, PipelineError, Verdict, ValidatorResult,
};

pub struct ArbitrationEngine {
    config: ArbitrationConfig,
}

impl ArbitrationEngine {
    /// Validates configuration eagerly; a malformed policy must fail at
    /// construction, not silently misbehave mid-pipeline.
    pub fn new(config: ArbitrationConfig) -> Result<Self, PipelineError> {
        if config.strategy == ArbitrationStrategy::WeightedVoting && config.default_weights.is_empty() {
            return Err(PipelineError::MissingWeights);
        }

        let mut seen = std::collections::HashSet::new();
        for verdict in &config.verdict_priority {
            if !seen.insert(*verdict) {
                return Err(PipelineError::InvalidPriority(format!(
                    "duplicate verdict in priority list: {verdict:?}"
                )));
            }
        }
        if seen.len() != 3 {
            return Err(PipelineError::InvalidPriority(
                "verdict_priority must name each verdict exactly once".to_string(),
            ));
        }

        for rule in &config.conflict_resolution {
            validate_rule(rule)?;
        }

        Ok(ArbitrationEngine { config })
    }

    pub fn arbitrate(&self, claim: &Claim, evidence: &[EvidenceSpan], results: Vec<ValidatorResult>) -> Disposition {
        let max_evidence_spans = 5;

        if results.is_empty() {
            tracing::debug!(claim = %claim.text, "arbitration: zero validator results");
            return Disposition {
                claim: claim.clone(),
                verdict: Verdict::InsufficientEvidence,
                evidence: top_spans(evidence, max_evidence_spans),
                validator: "arbitration_engine".to_string(),
                explanation: Some("No validator results to arbitrate".to_string()),
                validator_results: results,
                confidence: None,
                quality_score: None,
                quality_issues: Vec::new(),
                critical: false,
            };
        }

        if results.len() == 1 {
            let only = &results[0];
            let critical = is_critical(only);
            tracing::debug!(claim = %claim.text, validator = %only.validator, verdict = ?only.verdict, "arbitration: single-result passthrough");
            return Disposition {
                claim: claim.clone(),
                verdict: only.verdict,
                evidence: top_spans(evidence, max_evidence_spans),
                validator: "arbitration_engine".to_string(),
                explanation: only.explanation.clone(),
                confidence: only.score,
                validator_results: results,
                quality_score: None,
                quality_issues: Vec::new(),
                critical,
            };
        }

        let verdicts_differ = results.iter().map(|r| r.verdict).collect::<std::collections::HashSet<_>>().len() > 1;

        let mut conflict_fired = false;
        let mut conflict_detail = None;
        let verdict = if verdicts_differ {
            if let Some((rule_verdict, detail)) = self.try_conflict_rules(claim, evidence, &results) {
                conflict_fired = true;
                conflict_detail = Some(detail);
                rule_verdict
            } else {
                self.apply_strategy(&results)
            }
        } else {
            results[0].verdict
        };

        let had_refuted = results.iter().any(|r| r.verdict == Verdict::Refuted);
        let overridden_from_refuted = had_refuted && verdict != Verdict::Refuted;

        let agreeing = results.iter().filter(|r| r.verdict == verdict).count();
        let mut quality_score = agreeing as f64 / results.len() as f64;
        if overridden_from_refuted {
            quality_score *= 0.9;
        }

        let critical = results.iter().any(is_critical);

        tracing::info!(
            claim = %claim.text,
            verdict = ?verdict,
            conflict_fired,
            quality_score,
            "arbitration decision"
        );

        Disposition {
            claim: claim.clone(),
            verdict,
            evidence: top_spans(evidence, max_evidence_spans),
            validator: "arbitration_engine".to_string(),
            explanation: Some(explain(&results, verdict, conflict_fired, conflict_detail.as_deref())),
            validator_results: results,
            confidence: None,
            quality_score: Some(quality_score),
            quality_issues: Vec::new(),
            critical,
        }
    }

    fn try_conflict_rules(&self, claim: &Claim, evidence: &[EvidenceSpan], results: &[ValidatorResult]) -> Option<(Verdict, String)> {
        for rule in &self.config.conflict_resolution {
            if !rule_matches(rule, results) {
                continue;
            }
            match rule.action {
                ConflictAction::CheckLexicalOverlap => {
                    let best_span = evidence.iter().max_by(|a, b| a.score.partial_cmp(&b.score).unwrap());
                    let overlap = best_span.map(|s| jaccard_overlap(&claim.text, &s.text)).unwrap_or(0.0);
                    let threshold = rule.threshold.unwrap_or(0.5);
                    let comparator = if overlap >= threshold { ">=" } else { "<" };
                    let detail = format!("lexical overlap {overlap:.2} {comparator} {threshold:.2}");
                    let verdict = if overlap >= threshold {
                        rule.result_if_above.unwrap_or(Verdict::Supported)
                    } else if results.iter().any(|r| r.verdict == Verdict::Refuted) {
                        Verdict::Refuted
                    } else {
                        Verdict::InsufficientEvidence
                    };
                    return Some((verdict, detail));
                }
            }
        }
        None
    }

    fn apply_strategy(&self, results: &[ValidatorResult]) -> Verdict {
        match self.config.strategy {
            ArbitrationStrategy::WeightedVoting => {
                let mut totals: HashMap<Verdict, f64> = HashMap::new();
                for r in results {
                    let weight = self.config.default_weights.get(&r.validator).copied().unwrap_or(1.0);
                    let contribution = weight * r.score.unwrap_or(1.0);
                    *totals.entry(r.verdict).or_insert(0.0) += contribution;
                }
                totals
                    .into_iter()
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                    .map(|(v, _)| v)
                    .unwrap_or(Verdict::InsufficientEvidence)
            }
            ArbitrationStrategy::PriorityBased => self
                .config
                .verdict_priority
                .iter()
                .find(|v| results.iter().any(|r| r.verdict == **v))
                .copied()
                .unwrap_or(Verdict::InsufficientEvidence),
            ArbitrationStrategy::Unanimous => {
                let first = results[0].verdict;
                if results.iter().all(|r| r.verdict == first) {
                    first
                } else {
                    Verdict::InsufficientEvidence
                }
            }
            ArbitrationStrategy::Majority => {
                let mut counts: HashMap<Verdict, usize> = HashMap::new();
                for r in results {
                    *counts.entry(r.verdict).or_insert(0) += 1;
                }
                let max_count = counts.values().copied().max().unwrap_or(0);
                let winners: Vec<Verdict> = counts.iter().filter(|(_, c)| **c == max_count).map(|(v, _)| *v).collect();
                if winners.len() == 1 {
                    winners[0]
                } else {
                    Verdict::InsufficientEvidence
                }
            }
            ArbitrationStrategy::FirstWins => results[0].verdict,
        }
    }
}

fn validate_rule(rule: &ConflictRule) -> Result<(), PipelineError> {
    if rule.validators.len() < 2 {
        return Err(PipelineError::MalformedRule(
            "conflict rule must name at least 2 validators".to_string(),
        ));
    }
    match rule.action {
        ConflictAction::CheckLexicalOverlap => {
            let threshold = rule.threshold.ok_or_else(|| {
                PipelineError::MalformedRule("check_lexical_overlap rule requires threshold".to_string())
            })?;
            if !(0.0..=1.0).contains(&threshold) {
                return Err(PipelineError::MalformedRule(
                    "check_lexical_overlap threshold must be within [0,1]".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn rule_matches(rule: &ConflictRule, results: &[ValidatorResult]) -> bool {
    let named: Vec<&ValidatorResult> = rule
        .validators
        .iter()
        .filter_map(|name| results.iter().find(|r| &r.validator == name))
        .collect();
    if named.len() != rule.validators.len() {
        return false;
    }
    named.iter().map(|r| r.verdict).collect::<std::collections::HashSet<_>>().len() > 1
}

fn is_critical(result: &ValidatorResult) -> bool {
    result
        .metadata
        .as_ref()
        .and_then(|m| m.get("critical"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn top_spans(evidence: &[EvidenceSpan], max: usize) -> Vec<EvidenceSpan> {
    let mut sorted = evidence.to_vec();
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    sorted.truncate(max);
    sorted
}

fn explain(results: &[ValidatorResult], verdict: Verdict, conflict_fired: bool, conflict_detail: Option<&str>) -> String {
    let agreeing: Vec<&str> = results.iter().filter(|r| r.verdict == verdict).map(|r| r.validator.as_str()).collect();
    if conflict_fired {
        let detail = conflict_detail.unwrap_or("");
        format!("Conflict rule resolved verdict to {verdict:?} ({detail}); agreeing validators: {agreeing:?}")
    } else {
        format!("Arbitrated verdict {verdict:?}; agreeing validators: {agreeing:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::claim_builder;

    fn vr(name: &str, verdict: Verdict, score: Option<f64>) -> ValidatorResult {
        ValidatorResult {
            validator: name.to_string(),
            verdict,
            explanation: None,
            score,
            metadata: None,
        }
    }

    #[test]
    fn zero_results_yields_insufficient_evidence() {
        let engine = ArbitrationEngine::new(ArbitrationConfig::default()).unwrap();
        let claim = claim_builder("f", "t");
        let d = engine.arbitrate(&claim, &[], vec![]);
        assert_eq!(d.verdict, Verdict::InsufficientEvidence);
    }

    #[test]
    fn single_result_passes_through_with_its_score_as_confidence() {
        let engine = ArbitrationEngine::new(ArbitrationConfig::default()).unwrap();
        let claim = claim_builder("f", "t");
        let d = engine.arbitrate(&claim, &[], vec![vr("bm25_validator", Verdict::Supported, Some(0.8))]);
        assert_eq!(d.verdict, Verdict::Supported);
        assert_eq!(d.confidence, Some(0.8));
    }

    #[test]
    fn priority_based_prefers_refuted_by_default() {
        let engine = ArbitrationEngine::new(ArbitrationConfig::default()).unwrap();
        let claim = claim_builder("f", "t");
        let results = vec![
            vr("bm25_validator", Verdict::Supported, Some(0.6)),
            vr("nli_validator", Verdict::Refuted, Some(0.9)),
        ];
        let d = engine.arbitrate(&claim, &[], results);
        assert_eq!(d.verdict, Verdict::Refuted);
    }

    #[test]
    fn conflict_rule_overrides_priority_when_lexical_overlap_is_high() {
        let mut config = ArbitrationConfig::default();
        config.conflict_resolution.push(ConflictRule {
            validators: vec!["bm25_validator".to_string(), "nli_validator".to_string()],
            action: ConflictAction::CheckLexicalOverlap,
            threshold: Some(0.6),
            result_if_above: Some(Verdict::Supported),
        });
        let engine = ArbitrationEngine::new(config).unwrap();
        let claim = claim_builder("f", "patient has chest pain today");
        let evidence = vec![schema::evidence_span("patient has chest pain right now today", 0, 40, 0.9)];
        let results = vec![
            vr("bm25_validator", Verdict::Supported, Some(0.6)),
            vr("nli_validator", Verdict::Refuted, Some(0.9)),
        ];
        let d = engine.arbitrate(&claim, &evidence, results);
        assert_eq!(d.verdict, Verdict::Supported);
        assert!((d.quality_score.unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn unanimous_strategy_requires_full_agreement() {
        let mut config = ArbitrationConfig::default();
        config.strategy = ArbitrationStrategy::Unanimous;
        let engine = ArbitrationEngine::new(config).unwrap();
        let claim = claim_builder("f", "t");
        let results = vec![
            vr("a", Verdict::Supported, None),
            vr("b", Verdict::Supported, None),
            vr("c", Verdict::InsufficientEvidence, None),
        ];
        let d = engine.arbitrate(&claim, &[], results);
        assert_eq!(d.verdict, Verdict::InsufficientEvidence);
    }

    #[test]
    fn majority_strategy_picks_plurality_winner() {
        let mut config = ArbitrationConfig::default();
        config.strategy = ArbitrationStrategy::Majority;
        let engine = ArbitrationEngine::new(config).unwrap();
        let claim = claim_builder("f", "t");
        let results = vec![
            vr("a", Verdict::Supported, None),
            vr("b", Verdict::Supported, None),
            vr("c", Verdict::Refuted, None),
        ];
        let d = engine.arbitrate(&claim, &[], results);
        assert_eq!(d.verdict, Verdict::Supported);
    }

    #[test]
    fn weighted_voting_rejects_empty_weights_at_construction() {
        let mut config = ArbitrationConfig::default();
        config.strategy = ArbitrationStrategy::WeightedVoting;
        config.default_weights.clear();
        assert!(matches!(ArbitrationEngine::new(config), Err(PipelineError::MissingWeights)));
    }

    #[test]
    fn critical_metadata_flag_propagates_into_disposition() {
        let engine = ArbitrationEngine::new(ArbitrationConfig::default()).unwrap();
        let claim = claim_builder("plan", "t");
        let mut critical_result = vr("temporal_drift_validator", Verdict::Refuted, Some(1.0));
        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("critical".to_string(), serde_json::Value::Bool(true));
        critical_result.metadata = Some(metadata);
        let d = engine.arbitrate(&claim, &[], vec![critical_result]);
        assert_eq!(d.verdict, Verdict::Refuted);
        assert!(d.critical);
    }

    #[test]
    fn malformed_conflict_rule_rejected_at_construction() {
        let mut config = ArbitrationConfig::default();
        config.conflict_resolution.push(ConflictRule {
            validators: vec!["only_one".to_string()],
            action: ConflictAction::CheckLexicalOverlap,
            threshold: Some(0.5),
            result_if_above: Some(Verdict::Supported),
        });
        assert!(ArbitrationEngine::new(config).is_err());
    }

    #[test]
    fn invalid_verdict_priority_rejected_at_construction() {
        let mut config = ArbitrationConfig::default();
        config.verdict_priority = vec![Verdict::Refuted, Verdict::Refuted];
        assert!(ArbitrationEngine::new(config).is_err());
    }
}
