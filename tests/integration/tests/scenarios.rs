//! End-to-end coverage of the seed scenarios: one Checker::verify call per
//! scenario, asserting the exact outcomes called out for each.

use checker::Checker;
use pipeline_integration_tests::{policy_with_quality_module, policy_with_validators, schema_with_field};
use schema::{ExtractionMethod, Verdict};
use serde_json::json;

#[test]
fn s1_single_supported_claim() {
    let schema = schema_with_field("chief_complaint", ExtractionMethod::SingleValue);
    let policy = policy_with_validators("chief_complaint", &["bm25_validator"]);
    let checker = Checker::new(schema, policy).unwrap();

    let transcript = "Patient reports chest pain for 2 days.";
    let summary = json!({"chief_complaint": "Chest pain for 2 days"});
    let report = checker.verify(transcript, &summary, None);

    assert_eq!(report.dispositions.len(), 1);
    let d = &report.dispositions[0];
    assert_eq!(d.verdict, Verdict::Supported);
    assert!(!d.evidence.is_empty());
    assert!(d.evidence.iter().any(|e| e.text.to_lowercase().contains("chest pain")));
    assert!(report.overall_score >= 0.7);
}

#[test]
fn s2_refutation_via_contradiction_wins() {
    let schema = schema_with_field("chief_complaint", ExtractionMethod::SingleValue);
    let policy = policy_with_validators("chief_complaint", &["bm25_validator", "nli_validator"]);
    let checker = Checker::new(schema, policy).unwrap();

    let transcript = "Patient denies chest pain.";
    let summary = json!({"chief_complaint": "Patient has chest pain."});
    let report = checker.verify(transcript, &summary, None);

    assert_eq!(report.dispositions.len(), 1);
    let d = &report.dispositions[0];
    assert_eq!(d.verdict, Verdict::Refuted);
    assert!(d.validator == "nli_validator" || d.validator == "arbitration_engine");
}

#[test]
fn s3_unit_mismatch_is_critical() {
    let schema = schema_with_field("plan", ExtractionMethod::SingleValue);
    let policy = policy_with_validators("plan", &["temporal_drift_validator"]);
    let checker = Checker::new(schema, policy).unwrap();

    let transcript = "Administered 10 mg of drug X.";
    let summary = json!({"plan": "Gave 10 g of drug X."});
    let report = checker.verify(transcript, &summary, None);

    assert_eq!(report.dispositions.len(), 1);
    let d = &report.dispositions[0];
    assert_eq!(d.verdict, Verdict::Refuted);
    assert!(d.explanation.as_ref().unwrap().contains("UNIT MISMATCH"));
    assert!(d.critical);
}

#[test]
fn s6_missing_temporal_context_flagged_as_quality_issue() {
    let schema = schema_with_field("events", ExtractionMethod::SingleValue);
    let policy = policy_with_quality_module("events", &["temporal_drift_validator"], "temporal_numeric_drift");
    let checker = Checker::new(schema, policy).unwrap();

    let transcript = "This morning the patient fell.";
    let summary = json!({"events": "Patient fell."});
    let report = checker.verify(transcript, &summary, None);

    assert_eq!(report.dispositions.len(), 1);
    let d = &report.dispositions[0];
    assert_eq!(d.verdict, Verdict::Supported);
    assert!(d
        .quality_issues
        .iter()
        .any(|i| i.kind.to_string() == "temporal_drift" && i.severity == schema::Severity::Medium));
    assert_eq!(d.confidence, Some(0.9));
}

#[test]
fn failure_isolation_panicking_validator_yields_insufficient_evidence_disposition() {
    // invariant 9: a validator that cannot run still produces exactly one
    // Disposition, never an aborted pipeline.
    let schema = schema_with_field("plan", ExtractionMethod::SingleValue);
    // "nonexistent_validator" is not in the registry; resolution failure must
    // be handled the same way a panic would be.
    let policy = policy_with_validators("plan", &["nonexistent_validator"]);
    let checker = Checker::new(schema, policy).unwrap();

    let report = checker.verify("Some transcript text.", &json!({"plan": "Some plan text."}), None);

    assert_eq!(report.dispositions.len(), 1);
    assert_eq!(report.dispositions[0].verdict, Verdict::InsufficientEvidence);
}

#[test]
fn idempotence_repeated_verify_calls_agree() {
    let schema = schema_with_field("chief_complaint", ExtractionMethod::SingleValue);
    let policy = policy_with_validators("chief_complaint", &["bm25_validator"]);
    let checker = Checker::new(schema, policy).unwrap();

    let transcript = "Patient reports chest pain for 2 days.";
    let summary = json!({"chief_complaint": "Chest pain for 2 days"});
    let first = checker.verify(transcript, &summary, None);
    let second = checker.verify(transcript, &summary, None);

    assert_eq!(first.dispositions, second.dispositions);
    assert_eq!(first.overall_score, second.overall_score);
    assert_eq!(first.quality_score, second.quality_score);
}

#[test]
fn cache_transparency_repeated_calls_hit_once() {
    let schema = schema_with_field("chief_complaint", ExtractionMethod::SingleValue);
    let policy = policy_with_validators("chief_complaint", &["bm25_validator"]);
    let checker = Checker::new(schema, policy).unwrap();

    let transcript = "Patient reports chest pain for 2 days.";
    let summary = json!({"chief_complaint": "Chest pain for 2 days"});
    checker.verify(transcript, &summary, None);
    checker.verify(transcript, &summary, None);

    let stats = checker.cache_stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
}
