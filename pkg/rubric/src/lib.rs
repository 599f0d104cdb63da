//! Completeness scoring and missing-claims auditing (architecture §4.7).
//! Advisory only: neither function may alter a `Disposition`.

use std::sync::OnceLock;

use regex::Regex;
use schema::Schema;
use serde_json::Value as Json;

fn is_present(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::String(s) => !s.trim().is_empty(),
        Json::Array(a) => !a.is_empty(),
        Json::Object(o) => !o.is_empty(),
        Json::Number(_) => true,
    }
}

/// Names of required fields that are absent, null, empty, or whitespace-only.
pub fn check_completeness(summary: &Json, schema: &Schema) -> Vec<String> {
    let mut missing = Vec::new();
    let empty = serde_json::Map::new();
    let obj = summary.as_object().unwrap_or(&empty);

    for (name, field) in &schema.fields {
        if !field.required {
            continue;
        }
        match obj.get(name) {
            None => missing.push(name.clone()),
            Some(value) if !is_present(value) => missing.push(name.clone()),
            Some(_) => {}
        }
    }

    missing
}

/// Fraction of required fields present; 1.0 when the schema names none.
pub fn calculate_completeness_score(summary: &Json, schema: &Schema) -> f64 {
    let required_count = schema.fields.values().filter(|f| f.required).count();
    if required_count == 0 {
        return 1.0;
    }
    let missing = check_completeness(summary, schema);
    (required_count - missing.len()) as f64 / required_count as f64
}

const MEDICAL_KEYWORDS: &[&str] = &[
    "allergy", "allergies", "medication", "surgery", "diagnosis", "symptom", "pain", "fever", "treatment",
];

fn keyword_re(keyword: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b\w*{keyword}\w*\b")).unwrap()
}

fn summary_text(summary: &Json) -> String {
    match summary.as_object() {
        Some(obj) => obj.values().map(json_to_text).collect::<Vec<_>>().join(" ").to_lowercase(),
        None => summary.to_string().to_lowercase(),
    }
}

fn json_to_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flags medical keywords present in the transcript but absent from the
/// summary text. A placeholder for genuine claim extraction over the
/// transcript; kept deliberately simple until that lands.
pub fn detect_missing_claims(transcript: &str, summary: &Json) -> Vec<String> {
    static RES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    let res = RES.get_or_init(|| MEDICAL_KEYWORDS.iter().map(|k| (*k, keyword_re(k))).collect());

    let transcript_lower = transcript.to_lowercase();
    let summary_lower = summary_text(summary);
    let mut missing = Vec::new();

    for (keyword, re) in res {
        if !transcript_lower.contains(keyword) || summary_lower.contains(keyword) {
            continue;
        }
        if let Some(m) = re.find(transcript) {
            let start = m.start().saturating_sub(50);
            let end = (m.end() + 50).min(transcript.len());
            let snippet = transcript[start..end].trim();
            missing.push(format!("Possible missing info about '{keyword}': ...{snippet}..."));
        }
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{ExtractionMethod, FieldSchema};
    use std::collections::BTreeMap;

    fn field(required: bool) -> FieldSchema {
        FieldSchema {
            path: None,
            fallback_paths: vec![],
            extraction_method: ExtractionMethod::SingleValue,
            delimiter: None,
            pattern: None,
            split_compound_claims: false,
            min_claim_length: None,
            required,
            criticality: None,
        }
    }

    fn schema_with(fields: &[(&str, bool)]) -> Schema {
        let mut map = BTreeMap::new();
        for (name, required) in fields {
            map.insert(name.to_string(), field(*required));
        }
        Schema { version: "1".to_string(), fields: map, criticality_weights: BTreeMap::new() }
    }

    #[test]
    fn completeness_score_is_one_with_no_required_fields() {
        let schema = schema_with(&[("notes", false)]);
        let summary = serde_json::json!({});
        assert_eq!(calculate_completeness_score(&summary, &schema), 1.0);
    }

    #[test]
    fn completeness_flags_missing_and_blank_required_fields() {
        let schema = schema_with(&[("diagnosis", true), ("notes", true), ("age", false)]);
        let summary = serde_json::json!({"diagnosis": "fracture", "notes": "   "});
        let missing = check_completeness(&summary, &schema);
        assert_eq!(missing, vec!["notes".to_string()]);
        assert_eq!(calculate_completeness_score(&summary, &schema), 0.5);
    }

    #[test]
    fn missing_claims_flags_keyword_absent_from_summary() {
        let transcript = "Patient reports a severe allergy to penicillin noted by the nurse.";
        let summary = serde_json::json!({"diagnosis": "fracture"});
        let missing = detect_missing_claims(transcript, &summary);
        assert!(missing.iter().any(|m| m.contains("allergy")));
    }

    #[test]
    fn missing_claims_skips_keyword_already_present_in_summary() {
        let transcript = "Patient reports a severe allergy to penicillin.";
        let summary = serde_json::json!({"notes": "known allergy to penicillin"});
        let missing = detect_missing_claims(transcript, &summary);
        assert!(missing.is_empty());
    }
}
