//! Property-based coverage of the universal invariants and pipeline laws,
//! exercised against the full `Checker::verify` pipeline with randomized
//! claim/evidence text.

use checker::Checker;
use pipeline_integration_tests::policy_with_validators;
use pipeline_integration_tests::schema_with_field;
use proptest::prelude::*;
use schema::{ExtractionMethod, Verdict};
use serde_json::json;

fn checker_for(field: &str, validators: &[&str]) -> Checker {
    let schema = schema_with_field(field, ExtractionMethod::SingleValue);
    let policy = policy_with_validators(field, validators);
    Checker::new(schema, policy).unwrap()
}

proptest! {
    #[test]
    fn invariant_scores_are_bounded_and_rounded(
        transcript in "[a-z ]{5,60}",
        summary_text in "[a-z ]{5,60}",
    ) {
        let checker = checker_for("note", &["bm25_validator"]);
        let report = checker.verify(&transcript, &json!({"note": summary_text}), None);

        prop_assert!(report.overall_score >= 0.0 && report.overall_score <= 1.0);
        prop_assert!(report.quality_score >= 0.0 && report.quality_score <= 1.0);
        prop_assert_eq!(report.overall_score, round3(report.overall_score));
        prop_assert_eq!(report.quality_score, round3(report.quality_score));

        for disposition in &report.dispositions {
            prop_assert!(matches!(
                disposition.verdict,
                Verdict::Supported | Verdict::Refuted | Verdict::InsufficientEvidence
            ));
            for span in &disposition.evidence {
                prop_assert!(span.start_idx < span.end_idx);
                prop_assert!(span.end_idx <= transcript.len());
                prop_assert!(span.score >= 0.0 && span.score <= 1.0);
            }
        }
    }

    #[test]
    fn invariant_empty_validator_results_yield_no_disposition(
        summary_text in "[a-z ]{5,40}",
    ) {
        // with no validators configured for the field, no ValidatorResult is
        // ever produced, so the claim must be dropped rather than turned
        // into a placeholder Disposition.
        let checker = checker_for("note", &[]);
        let report = checker.verify("irrelevant transcript text", &json!({"note": summary_text}), None);
        prop_assert!(report.dispositions.is_empty());
    }

    #[test]
    fn law_idempotence_byte_equal_reports(
        transcript in "[a-z ]{5,60}",
        summary_text in "[a-z ]{5,60}",
    ) {
        let checker = checker_for("note", &["bm25_validator", "nli_validator"]);
        let summary = json!({"note": summary_text});
        let first = checker.verify(&transcript, &summary, None);
        let second = checker.verify(&transcript, &summary, None);
        prop_assert_eq!(first, second);
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
