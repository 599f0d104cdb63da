// ---------------------------------------------------------------------------
// Core domain enums — architecture §3
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// The finite outcome of validating one claim against evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Supported,
    Refuted,
    InsufficientEvidence,
}

/// Severity of a post-arbitration quality observation; maps to a fixed
/// multiplicative penalty on `quality_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Fixed severity → penalty factor mapping, architecture §4.6.
    pub fn penalty_factor(self) -> f64 {
        match self {
            Severity::High => 0.5,
            Severity::Medium => 0.8,
            Severity::Low => 0.9,
        }
    }
}

/// Open tag for the kind of quality observation. Left extensible (`Other`)
/// because the source treats this set as data, not a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QualityIssueKind {
    Omission,
    Fabrication,
    TemporalDrift,
    NumericMismatch,
    UnitMismatch,
    InsufficientNumericEvidence,
    Other(String),
}

impl std::fmt::Display for QualityIssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityIssueKind::Omission => write!(f, "omission"),
            QualityIssueKind::Fabrication => write!(f, "fabrication"),
            QualityIssueKind::TemporalDrift => write!(f, "temporal_drift"),
            QualityIssueKind::NumericMismatch => write!(f, "numeric_mismatch"),
            QualityIssueKind::UnitMismatch => write!(f, "unit_mismatch"),
            QualityIssueKind::InsufficientNumericEvidence => {
                write!(f, "insufficient_numeric_evidence")
            }
            QualityIssueKind::Other(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for QualityIssueKind {
    fn from(s: &str) -> Self {
        match s {
            "omission" => QualityIssueKind::Omission,
            "fabrication" => QualityIssueKind::Fabrication,
            "temporal_drift" => QualityIssueKind::TemporalDrift,
            "numeric_mismatch" => QualityIssueKind::NumericMismatch,
            "unit_mismatch" => QualityIssueKind::UnitMismatch,
            "insufficient_numeric_evidence" => QualityIssueKind::InsufficientNumericEvidence,
            other => QualityIssueKind::Other(other.to_string()),
        }
    }
}

impl Serialize for QualityIssueKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for QualityIssueKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(QualityIssueKind::from(s.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Core domain types — architecture §3
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub field: String,
    pub text: String,
    /// Open map; always carries `summary` (the whole source document) once
    /// the orchestrator has injected it, plus extraction provenance.
    pub metadata: BTreeMap<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    pub text: String,
    pub start_idx: usize,
    pub end_idx: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorResult {
    pub validator: String,
    pub verdict: Verdict,
    pub explanation: Option<String>,
    pub score: Option<f64>,
    pub metadata: Option<BTreeMap<String, Json>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    #[serde(rename = "type")]
    pub kind: QualityIssueKind,
    pub severity: Severity,
    pub detail: String,
    pub evidence_snippet: Option<String>,
    pub claim_snippet: Option<String>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disposition {
    pub claim: Claim,
    pub verdict: Verdict,
    /// Top retained evidence spans, at most 5 (architecture §4.5 step 6).
    pub evidence: Vec<EvidenceSpan>,
    /// Principal validator name, or `"arbitration_engine"` when the verdict
    /// came from fused voting rather than a single validator passthrough.
    pub validator: String,
    pub explanation: Option<String>,
    pub validator_results: Vec<ValidatorResult>,
    pub confidence: Option<f64>,
    pub quality_score: Option<f64>,
    pub quality_issues: Vec<QualityIssue>,
    /// Set by the temporal drift validator when a unit-mismatch forced a
    /// terminal refutation (S3); advisory, does not change the verdict.
    pub critical: bool,
}

impl Disposition {
    /// `confidence`/`quality_score` initialize to 1.0 the first time a
    /// quality module or the orchestrator needs to multiply into them.
    pub fn quality_score_or_default(&self) -> f64 {
        self.quality_score.unwrap_or(1.0)
    }

    pub fn confidence_or_default(&self) -> f64 {
        self.confidence.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub dispositions: Vec<Disposition>,
    pub source_fields: Json,
    pub overall_score: f64,
    pub quality_score: f64,
    pub missing_claims: Vec<String>,
    pub issues: Vec<String>,
    pub metadata: Option<BTreeMap<String, Json>>,
}

// ---------------------------------------------------------------------------
// Schema / policy configuration types — architecture §6
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    SingleValue,
    Delimited,
    BulletList,
    Structured,
    SentenceSplit,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub path: Option<String>,
    #[serde(default)]
    pub fallback_paths: Vec<String>,
    pub extraction_method: ExtractionMethod,
    pub delimiter: Option<String>,
    pub pattern: Option<String>,
    #[serde(default)]
    pub split_compound_claims: bool,
    #[serde(default)]
    pub min_claim_length: Option<usize>,
    #[serde(default)]
    pub required: bool,
    pub criticality: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub version: String,
    pub fields: BTreeMap<String, FieldSchema>,
    #[serde(default)]
    pub criticality_weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidatorSpec {
    Name(String),
    NameWithConfig(BTreeMap<String, Json>),
}

impl ValidatorSpec {
    pub fn name(&self) -> Option<&str> {
        match self {
            ValidatorSpec::Name(n) => Some(n.as_str()),
            ValidatorSpec::NameWithConfig(m) => m.keys().next().map(|s| s.as_str()),
        }
    }

    pub fn config(&self) -> Json {
        match self {
            ValidatorSpec::Name(_) => Json::Object(Default::default()),
            ValidatorSpec::NameWithConfig(m) => m
                .values()
                .next()
                .cloned()
                .unwrap_or(Json::Object(Default::default())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationStrategy {
    WeightedVoting,
    PriorityBased,
    Unanimous,
    Majority,
    FirstWins,
}

impl Default for ArbitrationStrategy {
    fn default() -> Self {
        ArbitrationStrategy::PriorityBased
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    CheckLexicalOverlap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRule {
    pub validators: Vec<String>,
    pub action: ConflictAction,
    pub threshold: Option<f64>,
    pub result_if_above: Option<Verdict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationConfig {
    #[serde(default)]
    pub strategy: ArbitrationStrategy,
    #[serde(default)]
    pub default_weights: BTreeMap<String, f64>,
    #[serde(default = "default_verdict_priority")]
    pub verdict_priority: Vec<Verdict>,
    #[serde(default)]
    pub conflict_resolution: Vec<ConflictRule>,
    #[serde(default)]
    pub explain_conflicts: bool,
}

fn default_verdict_priority() -> Vec<Verdict> {
    vec![
        Verdict::Refuted,
        Verdict::Supported,
        Verdict::InsufficientEvidence,
    ]
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        ArbitrationConfig {
            strategy: ArbitrationStrategy::default(),
            default_weights: BTreeMap::new(),
            verdict_priority: default_verdict_priority(),
            conflict_resolution: Vec::new(),
            explain_conflicts: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityModuleSpec {
    pub name: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, Json>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    Simple,
    QualityWeighted,
}

impl Default for ScoringMethod {
    fn default() -> Self {
        ScoringMethod::QualityWeighted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub method: ScoringMethod,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            method: ScoringMethod::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_max_evidence_spans")]
    pub max_evidence_spans: usize,
}

fn default_max_evidence_spans() -> usize {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_evidence_spans: default_max_evidence_spans(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub version: String,
    #[serde(default)]
    pub validators: BTreeMap<String, Vec<ValidatorSpec>>,
    pub retriever: String,
    #[serde(default)]
    pub retriever_config: BTreeMap<String, Json>,
    #[serde(default)]
    pub aggregation: ArbitrationConfig,
    #[serde(default)]
    pub quality_modules: Vec<QualityModuleSpec>,
    #[serde(default = "default_quality_confidence_penalty")]
    pub quality_confidence_penalty: f64,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub settings: Settings,
}

fn default_quality_confidence_penalty() -> f64 {
    0.9
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration-time failures: fatal, raised when a Checker, Arbitration
/// Engine, or quality/validator/retriever is constructed (architecture §7).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("missing weights for weighted_voting strategy")]
    MissingWeights,
    #[error("invalid verdict priority: {0}")]
    InvalidPriority(String),
    #[error("malformed conflict rule: {0}")]
    MalformedRule(String),
    #[error("unknown plugin '{0}' for {1}")]
    UnknownPlugin(String, &'static str),
    #[error("duplicate registration of plugin '{0}' for {1}")]
    DuplicatePlugin(String, &'static str),
}

/// Field-level validation failure for a single `Claim`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField(&'static str),
    InvalidRange(&'static str),
}

// ---------------------------------------------------------------------------
// Token utilities — shared across ranking, extraction, validators.
// ---------------------------------------------------------------------------

/// Normalize a token to lowercase ASCII alphanumeric for lexical matching.
pub fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Tokenize text into normalized tokens, ready for indexing or matching.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(normalize_token)
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn validate_claim(claim: &Claim) -> Result<(), ValidationError> {
    if claim.field.trim().is_empty() {
        return Err(ValidationError::MissingField("field"));
    }
    if claim.text.trim().is_empty() {
        return Err(ValidationError::MissingField("text"));
    }
    Ok(())
}

pub fn validate_evidence_span(span: &EvidenceSpan, transcript_len: usize) -> Result<(), ValidationError> {
    if span.start_idx >= span.end_idx {
        return Err(ValidationError::InvalidRange("start_idx/end_idx"));
    }
    if span.end_idx > transcript_len {
        return Err(ValidationError::InvalidRange("end_idx"));
    }
    if !(0.0..=1.0).contains(&span.score) {
        return Err(ValidationError::InvalidRange("score"));
    }
    Ok(())
}

/// Helper to build a `Claim` with empty metadata; used throughout tests.
pub fn claim_builder(field: &str, text: &str) -> Claim {
    Claim {
        field: field.to_string(),
        text: text.to_string(),
        metadata: BTreeMap::new(),
    }
}

/// Helper to build a bare `EvidenceSpan`; used throughout tests.
pub fn evidence_span(text: &str, start_idx: usize, end_idx: usize, score: f64) -> EvidenceSpan {
    EvidenceSpan {
        text: text.to_string(),
        start_idx,
        end_idx,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_claim_successfully() {
        let claim = claim_builder("chief_complaint", "Chest pain for 2 days");
        assert_eq!(validate_claim(&claim), Ok(()));
    }

    #[test]
    fn rejects_claim_with_empty_text() {
        let claim = claim_builder("chief_complaint", "   ");
        assert_eq!(
            validate_claim(&claim),
            Err(ValidationError::MissingField("text"))
        );
    }

    #[test]
    fn rejects_evidence_span_with_inverted_range() {
        let span = evidence_span("chest pain", 20, 10, 0.5);
        assert_eq!(
            validate_evidence_span(&span, 100),
            Err(ValidationError::InvalidRange("start_idx/end_idx"))
        );
    }

    #[test]
    fn rejects_evidence_span_out_of_bounds() {
        let span = evidence_span("chest pain", 0, 10, 0.5);
        assert_eq!(
            validate_evidence_span(&span, 5),
            Err(ValidationError::InvalidRange("end_idx"))
        );
    }

    #[test]
    fn rejects_evidence_span_with_invalid_score() {
        let span = evidence_span("chest pain", 0, 10, 1.5);
        assert_eq!(
            validate_evidence_span(&span, 100),
            Err(ValidationError::InvalidRange("score"))
        );
    }

    #[test]
    fn tokenize_normalizes_and_splits() {
        let tokens = tokenize("Patient reports chest-pain for 2 days");
        assert_eq!(
            tokens,
            vec!["patient", "reports", "chestpain", "for", "2", "days"]
        );
    }

    #[test]
    fn severity_penalty_factors_match_fixed_mapping() {
        assert_eq!(Severity::High.penalty_factor(), 0.5);
        assert_eq!(Severity::Medium.penalty_factor(), 0.8);
        assert_eq!(Severity::Low.penalty_factor(), 0.9);
    }

    #[test]
    fn disposition_defaults_confidence_and_quality_to_one() {
        let d = Disposition {
            claim: claim_builder("f", "t"),
            verdict: Verdict::Supported,
            evidence: vec![],
            validator: "arbitration_engine".to_string(),
            explanation: None,
            validator_results: vec![],
            confidence: None,
            quality_score: None,
            quality_issues: vec![],
            critical: false,
        };
        assert_eq!(d.confidence_or_default(), 1.0);
        assert_eq!(d.quality_score_or_default(), 1.0);
    }
}
