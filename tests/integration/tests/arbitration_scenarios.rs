//! Arbitration-level seed scenarios that specify raw ValidatorResults
//! directly rather than driving the whole pipeline.

use arbitration::ArbitrationEngine;
use schema::{
    claim_builder, evidence_span, ArbitrationConfig, ArbitrationStrategy, ConflictAction,
    ConflictRule, Verdict, ValidatorResult,
};

fn vr(name: &str, verdict: Verdict, weight_score: Option<f64>) -> ValidatorResult {
    ValidatorResult {
        validator: name.to_string(),
        verdict,
        explanation: None,
        score: weight_score,
        metadata: None,
    }
}

#[test]
fn s4_weighted_voting_tie_breaker() {
    let mut config = ArbitrationConfig {
        strategy: ArbitrationStrategy::WeightedVoting,
        ..ArbitrationConfig::default()
    };
    config.default_weights.insert("validator_a".to_string(), 3.0);
    config.default_weights.insert("validator_b".to_string(), 1.0);
    let engine = ArbitrationEngine::new(config).unwrap();

    let claim = claim_builder("f", "t");
    let results = vec![
        vr("validator_a", Verdict::Supported, None),
        vr("validator_b", Verdict::Refuted, None),
    ];
    let d = engine.arbitrate(&claim, &[], results);

    assert_eq!(d.verdict, Verdict::Supported);
    assert!((d.quality_score.unwrap() - 0.45).abs() < 1e-9);
}

#[test]
fn s5_conflict_rule_overrides_by_lexical_overlap() {
    let mut config = ArbitrationConfig::default();
    config.conflict_resolution.push(ConflictRule {
        validators: vec!["bm25_validator".to_string(), "nli_validator".to_string()],
        action: ConflictAction::CheckLexicalOverlap,
        threshold: Some(0.6),
        result_if_above: Some(Verdict::Supported),
    });
    let engine = ArbitrationEngine::new(config).unwrap();

    // intersection {a, b, c} = 3, union {a, b, c, d} = 4 -> jaccard 0.75
    let claim = claim_builder("f", "a b c");
    let evidence = vec![evidence_span("a b c d", 0, 7, 0.9)];
    let results = vec![
        vr("bm25_validator", Verdict::Supported, Some(0.6)),
        vr("nli_validator", Verdict::Refuted, Some(0.9)),
    ];
    let d = engine.arbitrate(&claim, &evidence, results);

    assert_eq!(d.verdict, Verdict::Supported);
    assert!(d.explanation.unwrap().contains("0.75 >= 0.6"));
}

#[test]
fn quality_monotonicity_neutral_module_leaves_report_equal() {
    // invariant 11: a quality module result of {issues: [], quality_score: 1.0}
    // must be a no-op on the Disposition it's applied to.
    let config = ArbitrationConfig::default();
    let engine = ArbitrationEngine::new(config).unwrap();
    let claim = claim_builder("f", "patient has chest pain today");
    let evidence = vec![schema::evidence_span("patient has chest pain right now today", 0, 40, 0.9)];
    let results = vec![vr("bm25_validator", Verdict::Supported, Some(0.8))];

    let before = engine.arbitrate(&claim, &evidence, results.clone());
    let mut after = before.clone();

    // simulate a quality module contributing nothing
    let neutral_issues: Vec<schema::QualityIssue> = Vec::new();
    let neutral_quality_score = 1.0_f64;
    after.quality_issues.extend(neutral_issues);
    if neutral_quality_score < 1.0 {
        after.quality_score = Some(after.quality_score_or_default() * neutral_quality_score);
    }

    assert_eq!(before, after);
}

