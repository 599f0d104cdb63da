//! Quality modules — architecture §4.6. Run after arbitration, per
//! Disposition, in policy-declared order; each returns issues plus a
//! multiplicative `quality_score` factor.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use schema::{Disposition, EvidenceSpan, PipelineError, QualityIssue, QualityIssueKind, Severity, Verdict};

pub struct QualityAnalysis {
    pub issues: Vec<QualityIssue>,
    pub quality_score: f64,
}

/// A module's gate is exposed as a trait default method over a handful of
/// getter hooks, so most modules only need to override the thresholds they
/// actually care about (architecture §4.6 "Gating").
pub trait QualityModule: Send + Sync {
    fn name(&self) -> &'static str;

    fn min_quality_score(&self) -> f64 {
        0.95
    }
    fn min_confidence(&self) -> f64 {
        0.75
    }
    fn analyze_insufficient(&self) -> bool {
        true
    }

    fn should_analyze(&self, disposition: &Disposition) -> bool {
        if disposition.quality_score.is_none() && disposition.confidence.is_none() {
            return true;
        }
        if let Some(q) = disposition.quality_score {
            if q < self.min_quality_score() {
                return true;
            }
        }
        if let Some(c) = disposition.confidence {
            if c < self.min_confidence() {
                return true;
            }
        }
        self.analyze_insufficient() && disposition.verdict == Verdict::InsufficientEvidence
    }

    fn analyze(&self, disposition: &Disposition, transcript: &str) -> QualityAnalysis;
}

fn penalty_of(issues: &[QualityIssue]) -> f64 {
    issues.iter().fold(1.0, |acc, issue| acc * issue.severity.penalty_factor())
}

// ---------------------------------------------------------------------------
// semantic_quality
// ---------------------------------------------------------------------------

pub struct SemanticQualityModule {
    pub max_issues: usize,
    pub min_phrase_length: usize,
}

impl Default for SemanticQualityModule {
    fn default() -> Self {
        SemanticQualityModule {
            max_issues: 3,
            min_phrase_length: 2,
        }
    }
}

const FABRICATION_STOP_TERMS: &[&str] = &[
    "there", "her", "his", "its", "the", "a", "an", "patient", "subject", "this", "that", "these", "those", "he",
    "she", "it", "they", "them", "their", "our", "your", "my", "i", "we", "you", "who", "which", "what", "when",
    "where", "why", "how", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "must", "can", "of", "in", "on", "at", "to", "for", "with",
    "from", "by", "about", "as", "into", "through", "during", "before", "after", "above", "below", "between",
    "under", "over", "again", "further", "then", "once", "here", "also", "all", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very",
    "just", "now",
];

fn proper_noun_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").unwrap())
}

fn measurement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(mg|cm|mm|kg|lb|g|ml|years?|months?|days?|hours?|minutes?|weeks?)\b").unwrap()
    })
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)""#).unwrap())
}

fn descriptive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(wet|dry|deep|shallow|severe|mild|moderate|acute|chronic|large|small|hospital|clinic|emergency|urgent)\s+\w+").unwrap())
}

fn symptom_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(dizziness|nausea|vomiting|headache|fever|chills|weakness|fatigue)\b|\b(pain|ache|discomfort|soreness)\s+(?:in|at|around)\s+\w+").unwrap())
}

fn contextual_phrase_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"(?i)for (?:my|his|her|their|the) \w+(?:\s+\w+)?",
            r"(?i)with (?:my|his|her|their|the) \w+(?:\s+\w+)?",
            r"(?i)about (?:my|his|her|their|the) \w+(?:\s+\w+)?",
            r"(?i)according to (?:the )?\w+",
            r"(?i)per (?:the )?\w+",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

impl SemanticQualityModule {
    fn is_meaningful(&self, phrase: &str) -> bool {
        let stop: HashSet<&str> = ["the", "a", "an", "it", "this", "that", "these", "those", "by", "at", "in", "on"].into_iter().collect();
        phrase.trim_matches('"').to_lowercase().split_whitespace().any(|w| !stop.contains(w))
    }

    fn extract_proper_nouns(&self, text: &str) -> Vec<String> {
        let stop: HashSet<&str> = ["The", "A", "An", "This", "That", "These", "Those", "I", "He", "She"].into_iter().collect();
        proper_noun_re()
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .filter(|m| !stop.contains(m.as_str()) && m.len() > 2)
            .collect()
    }

    fn extract_contextual_phrases(&self, text: &str) -> Vec<String> {
        contextual_phrase_res()
            .iter()
            .flat_map(|re| re.find_iter(text).map(|m| m.as_str().to_string()))
            .filter(|p| p.split_whitespace().count() >= self.min_phrase_length)
            .collect()
    }

    fn dedup(items: Vec<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for item in items {
            let key = item.to_lowercase();
            if seen.insert(key) {
                unique.push(item);
            }
        }
        unique
    }

    fn find_missing_important_details(&self, claim: &str, evidence: &str) -> Vec<String> {
        let claim_lower = claim.to_lowercase();
        let mut important = Vec::new();

        for noun in self.extract_proper_nouns(evidence) {
            if !claim_lower.contains(&noun.to_lowercase()) && self.is_meaningful(&noun) {
                important.push(noun);
            }
        }

        for cap in measurement_re().captures_iter(evidence) {
            let measure = format!("{} {}", &cap[1], cap[2].to_lowercase());
            if !claim_lower.contains(&measure.to_lowercase()) {
                important.push(measure);
            }
        }

        for cap in quoted_re().captures_iter(evidence) {
            let quote = &cap[1];
            if !claim_lower.contains(&quote.to_lowercase()) && quote.split_whitespace().count() >= self.min_phrase_length && self.is_meaningful(quote) {
                important.push(format!("\"{quote}\""));
            }
        }

        for phrase in self.extract_contextual_phrases(evidence) {
            if !claim_lower.contains(&phrase.to_lowercase()) && self.is_meaningful(&phrase) {
                important.push(phrase);
            }
        }

        Self::dedup(important)
    }

    fn find_fabricated_details(&self, claim: &str, evidence: &str) -> Vec<String> {
        let evidence_lower = evidence.to_lowercase();
        let mut fabricated = Vec::new();

        for noun in self.extract_proper_nouns(claim) {
            let lower = noun.to_lowercase();
            if FABRICATION_STOP_TERMS.contains(&lower.as_str()) {
                continue;
            }
            if !evidence_lower.contains(&lower) && self.is_meaningful(&noun) {
                fabricated.push(noun);
            }
        }

        for m in descriptive_re().find_iter(claim) {
            if !evidence_lower.contains(&m.as_str().to_lowercase()) {
                fabricated.push(m.as_str().to_string());
            }
        }

        for m in symptom_re().find_iter(claim) {
            if !evidence_lower.contains(&m.as_str().to_lowercase()) {
                fabricated.push(m.as_str().to_string());
            }
        }

        Self::dedup(fabricated)
    }

    fn snippet(&self, text: &str, phrase: &str, context: usize) -> String {
        let search = phrase.trim_matches('"').to_lowercase();
        let text_lower = text.to_lowercase();
        let Some(pos) = text_lower.find(&search) else {
            return if text.len() > 100 { format!("{}...", &text[..100]) } else { text.to_string() };
        };
        let start = pos.saturating_sub(context);
        let end = (pos + search.len() + context).min(text.len());
        let mut snippet = text[start..end].to_string();
        if start > 0 {
            snippet = format!("...{snippet}");
        }
        if end < text.len() {
            snippet.push_str("...");
        }
        snippet
    }
}

impl QualityModule for SemanticQualityModule {
    fn name(&self) -> &'static str {
        "semantic_quality"
    }

    fn analyze(&self, disposition: &Disposition, _transcript: &str) -> QualityAnalysis {
        if !self.should_analyze(disposition) || disposition.evidence.is_empty() {
            return QualityAnalysis { issues: Vec::new(), quality_score: 1.0 };
        }

        let claim_text = &disposition.claim.text;
        let evidence_text = &disposition.evidence[0].text;
        let mut issues = Vec::new();

        for detail in self.find_missing_important_details(claim_text, evidence_text).into_iter().take(self.max_issues) {
            issues.push(QualityIssue {
                kind: QualityIssueKind::Omission,
                severity: Severity::Low,
                detail: format!("Claim omits important detail: '{detail}'"),
                evidence_snippet: Some(self.snippet(evidence_text, &detail, 40)),
                claim_snippet: Some(claim_text.chars().take(100).collect()),
                suggestion: Some(format!("Consider including: '{detail}'")),
            });
        }

        for detail in self.find_fabricated_details(claim_text, evidence_text).into_iter().take(self.max_issues) {
            issues.push(QualityIssue {
                kind: QualityIssueKind::Fabrication,
                severity: Severity::High,
                detail: format!("Claim includes detail not found in evidence: '{detail}'"),
                evidence_snippet: Some(evidence_text.chars().take(100).collect()),
                claim_snippet: Some(self.snippet(claim_text, &detail, 40)),
                suggestion: Some(format!("Verify or remove unsupported detail: '{detail}'")),
            });
        }

        issues.truncate(self.max_issues);
        let quality_score = penalty_of(&issues);
        QualityAnalysis { issues, quality_score }
    }
}

// ---------------------------------------------------------------------------
// temporal_numeric_drift
// ---------------------------------------------------------------------------

pub struct TemporalNumericDriftModule {
    pub min_quality_score: f64,
    pub tolerance_percent: f64,
    pub check_temporal: bool,
    pub check_numeric: bool,
    pub max_issues: usize,
    pub numeric_mismatch_severity: Severity,
    pub insufficient_evidence_severity: Severity,
}

impl Default for TemporalNumericDriftModule {
    fn default() -> Self {
        TemporalNumericDriftModule {
            min_quality_score: 0.95,
            tolerance_percent: 10.0,
            check_temporal: true,
            check_numeric: true,
            max_issues: 3,
            numeric_mismatch_severity: Severity::High,
            insufficient_evidence_severity: Severity::Medium,
        }
    }
}

const TEMPORAL_PATTERNS: &[&str] = &[
    r"(?i)\bthis morning\b",
    r"(?i)\bthis afternoon\b",
    r"(?i)\bthis evening\b",
    r"(?i)\btonight\b",
    r"(?i)\byesterday\b",
    r"(?i)\blast night\b",
    r"(?i)\blast week\b",
    r"(?i)\blast month\b",
    r"(?i)\blast year\b",
    r"(?i)\btoday\b",
    r"(?i)\btomorrow\b",
    r"(?i)\brecently\b",
    r"(?i)\bearlier today\b",
];

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").unwrap())
}

fn money_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\$\s*(\d+(?:\.\d+)?)\s*(million|billion|thousand|m|b|k)?").unwrap())
}

fn unit_quantity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(milligrams?|grams?|kilograms?|mg|g|kg|milliliters?|liters?|ml|l|years?|months?|days?|hours?|minutes?|weeks?)\b").unwrap()
    })
}

fn bare_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d+)\b").unwrap())
}

fn normalize_unit(raw: &str) -> String {
    let lower = raw.to_lowercase();
    match lower.as_str() {
        "milligram" | "milligrams" | "mg" => "mg".to_string(),
        "gram" | "grams" | "g" => "g".to_string(),
        "kilogram" | "kilograms" | "kg" => "kg".to_string(),
        "milliliter" | "milliliters" | "ml" => "ml".to_string(),
        "liter" | "liters" | "l" => "l".to_string(),
        "year" | "years" => "year".to_string(),
        "month" | "months" => "month".to_string(),
        "day" | "days" => "day".to_string(),
        "hour" | "hours" => "hour".to_string(),
        "minute" | "minutes" => "minute".to_string(),
        "week" | "weeks" => "week".to_string(),
        other => other.to_string(),
    }
}

fn mass_base_grams(unit: &str) -> Option<f64> {
    match unit {
        "mg" => Some(0.001),
        "g" => Some(1.0),
        "kg" => Some(1000.0),
        _ => None,
    }
}

fn volume_base_ml(unit: &str) -> Option<f64> {
    match unit {
        "ml" => Some(1.0),
        "l" => Some(1000.0),
        _ => None,
    }
}

impl TemporalNumericDriftModule {
    fn detect_temporal_drift(&self, claim: &str, evidence: &str) -> Vec<QualityIssue> {
        let claim_lower = claim.to_lowercase();
        let mut found: HashSet<String> = HashSet::new();
        for pattern in TEMPORAL_PATTERNS {
            let re = Regex::new(pattern).unwrap();
            for m in re.find_iter(evidence) {
                found.insert(m.as_str().to_lowercase());
            }
        }

        found
            .into_iter()
            .filter(|t| !claim_lower.contains(t.as_str()))
            .map(|temporal| QualityIssue {
                kind: QualityIssueKind::TemporalDrift,
                severity: Severity::Medium,
                detail: format!("Evidence specifies temporal context '{temporal}' but claim omits it"),
                evidence_snippet: Some(context_snippet(evidence, &temporal, 40)),
                claim_snippet: Some(claim.chars().take(100).collect()),
                suggestion: Some(format!("Consider adding temporal context: '{temporal}'")),
            })
            .collect()
    }

    fn extract_numeric_values(&self, text: &str) -> (Vec<(String, String)>, HashSet<String>) {
        let mut structured = Vec::new();
        let mut bare = HashSet::new();

        for cap in unit_quantity_re().captures_iter(text) {
            let value = cap[1].to_string();
            let unit = normalize_unit(&cap[2]);
            structured.push((value.clone(), unit));
            bare.insert(value);
        }
        for cap in percent_re().captures_iter(text) {
            let value = cap[1].to_string();
            structured.push((value.clone(), "%".to_string()));
            bare.insert(value);
        }
        for cap in money_re().captures_iter(text) {
            let value = cap[1].to_string();
            let unit_raw = cap.get(2).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            let unit = match unit_raw.as_str() {
                "m" | "million" => "$million".to_string(),
                "b" | "billion" => "$billion".to_string(),
                "k" | "thousand" => "$thousand".to_string(),
                _ => "$".to_string(),
            };
            structured.push((value.clone(), unit));
            bare.insert(value);
        }
        for m in bare_number_re().find_iter(text) {
            bare.insert(m.as_str().to_string());
        }

        (structured, bare)
    }

    fn values_match(&self, a: &str, b: &str) -> bool {
        match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(v1), Ok(v2)) => {
                if v1 == 0.0 && v2 == 0.0 {
                    return true;
                }
                let max_val = v1.abs().max(v2.abs());
                if max_val == 0.0 {
                    return true;
                }
                (v1 - v2).abs() / max_val * 100.0 <= self.tolerance_percent
            }
            _ => a == b,
        }
    }

    fn unit_conversion_factor(&self, unit1: &str, unit2: &str) -> f64 {
        if let (Some(a), Some(b)) = (mass_base_grams(unit1), mass_base_grams(unit2)) {
            return b / a;
        }
        if let (Some(a), Some(b)) = (volume_base_ml(unit1), volume_base_ml(unit2)) {
            return b / a;
        }
        1.0
    }

    fn detect_numeric_drift(&self, claim: &str, evidence: &[EvidenceSpan]) -> Vec<QualityIssue> {
        let (claim_structured, claim_bare) = self.extract_numeric_values(claim);
        if claim_structured.is_empty() && claim_bare.is_empty() {
            return Vec::new();
        }

        let high_relevance: Vec<&EvidenceSpan> = evidence.iter().filter(|e| e.score > 0.5).collect();
        if high_relevance.is_empty() {
            return Vec::new();
        }

        let mut issues = Vec::new();

        for (c_value, c_unit) in &claim_structured {
            let mut found_match = false;
            let mut best_mismatch: Option<(String, String)> = None;
            let mut best_mismatch_score = 0.0_f64;
            let mut unit_mismatch: Option<(String, String)> = None;
            let mut unit_mismatch_score = 0.0_f64;

            for ev in &high_relevance {
                let (ev_structured, _) = self.extract_numeric_values(&ev.text);
                for (e_value, e_unit) in &ev_structured {
                    if e_unit == c_unit && self.values_match(e_value, c_value) {
                        found_match = true;
                        break;
                    }
                    if e_value == c_value && e_unit != c_unit {
                        if unit_mismatch.is_none() || ev.score > unit_mismatch_score {
                            unit_mismatch = Some((e_value.clone(), e_unit.clone()));
                            unit_mismatch_score = ev.score;
                        }
                    } else if e_unit == c_unit && !self.values_match(e_value, c_value) {
                        if best_mismatch.is_none() || ev.score > best_mismatch_score {
                            best_mismatch = Some((e_value.clone(), e_unit.clone()));
                            best_mismatch_score = ev.score;
                        }
                    }
                }
                if found_match {
                    break;
                }
            }

            if !found_match {
                if let Some((mismatch_value, mismatch_unit)) = unit_mismatch {
                    let factor = self.unit_conversion_factor(c_unit, &mismatch_unit);
                    issues.push(QualityIssue {
                        kind: QualityIssueKind::UnitMismatch,
                        severity: Severity::High,
                        detail: format!("Unit mismatch: claim says '{c_value} {c_unit}' but evidence says '{mismatch_value} {mismatch_unit}'"),
                        evidence_snippet: None,
                        claim_snippet: None,
                        suggestion: Some(format!("Verify the correct unit: '{mismatch_unit}' or '{c_unit}' — a {factor}x difference")),
                    });
                } else if let Some((mismatch_value, mismatch_unit)) = best_mismatch {
                    issues.push(QualityIssue {
                        kind: QualityIssueKind::NumericMismatch,
                        severity: self.numeric_mismatch_severity,
                        detail: format!("Claim says '{c_value} {c_unit}' but high-relevance evidence says '{mismatch_value} {mismatch_unit}'"),
                        evidence_snippet: None,
                        claim_snippet: None,
                        suggestion: Some(format!("Verify the correct value: '{mismatch_value}' or '{c_value}'")),
                    });
                } else {
                    issues.push(QualityIssue {
                        kind: QualityIssueKind::InsufficientNumericEvidence,
                        severity: self.insufficient_evidence_severity,
                        detail: format!("Claim mentions '{c_value} {c_unit}' but no high-relevance evidence contains this number"),
                        evidence_snippet: None,
                        claim_snippet: None,
                        suggestion: Some(format!("Verify '{c_value}' or check if evidence supports a different value")),
                    });
                }
            }
        }

        let structured_values: HashSet<&String> = claim_structured.iter().map(|(v, _)| v).collect();
        for claim_num in claim_bare.iter().filter(|n| !structured_values.contains(n)) {
            let found = high_relevance.iter().any(|ev| {
                let (_, ev_bare) = self.extract_numeric_values(&ev.text);
                ev_bare.contains(claim_num)
            });
            if !found {
                issues.push(QualityIssue {
                    kind: QualityIssueKind::InsufficientNumericEvidence,
                    severity: self.insufficient_evidence_severity,
                    detail: format!("Claim mentions '{claim_num}' but no high-relevance evidence contains this number"),
                    evidence_snippet: None,
                    claim_snippet: None,
                    suggestion: Some(format!("Verify '{claim_num}' or check if evidence supports a different value")),
                });
            }
        }

        issues
    }
}

fn context_snippet(text: &str, phrase: &str, context: usize) -> String {
    let text_lower = text.to_lowercase();
    let Some(pos) = text_lower.find(&phrase.to_lowercase()) else {
        return if text.len() > 100 { format!("{}...", &text[..100]) } else { text.to_string() };
    };
    let start = pos.saturating_sub(context);
    let end = (pos + phrase.len() + context).min(text.len());
    let mut snippet = text[start..end].to_string();
    if start > 0 {
        snippet = format!("...{snippet}");
    }
    if end < text.len() {
        snippet.push_str("...");
    }
    snippet
}

impl QualityModule for TemporalNumericDriftModule {
    fn name(&self) -> &'static str {
        "temporal_numeric_drift"
    }

    fn min_quality_score(&self) -> f64 {
        self.min_quality_score
    }

    fn should_analyze(&self, disposition: &Disposition) -> bool {
        match disposition.quality_score {
            None => true,
            Some(q) => q < self.min_quality_score,
        }
    }

    fn analyze(&self, disposition: &Disposition, _transcript: &str) -> QualityAnalysis {
        if !self.should_analyze(disposition) || disposition.evidence.is_empty() {
            return QualityAnalysis { issues: Vec::new(), quality_score: 1.0 };
        }

        let claim_text = &disposition.claim.text;
        let mut issues = Vec::new();

        if self.check_temporal {
            issues.extend(self.detect_temporal_drift(claim_text, &disposition.evidence[0].text));
        }
        if self.check_numeric {
            issues.extend(self.detect_numeric_drift(claim_text, &disposition.evidence));
        }

        issues.truncate(self.max_issues);
        let quality_score = penalty_of(&issues);
        QualityAnalysis { issues, quality_score }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type QualityFactory = Box<dyn Fn() -> Box<dyn QualityModule> + Send + Sync>;

#[derive(Default)]
pub struct QualityRegistry {
    factories: HashMap<String, QualityFactory>,
}

impl QualityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, factory: QualityFactory) -> Result<(), PipelineError> {
        if self.factories.contains_key(name) {
            return Err(PipelineError::DuplicatePlugin(name.to_string(), "quality_module"));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn QualityModule>, PipelineError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PipelineError::UnknownPlugin(name.to_string(), "quality_module"))?;
        Ok(factory())
    }
}

pub fn default_registry() -> QualityRegistry {
    let mut registry = QualityRegistry::new();
    registry
        .register("semantic_quality", Box::new(|| Box::new(SemanticQualityModule::default())))
        .expect("static registration");
    registry
        .register("temporal_numeric_drift", Box::new(|| Box::new(TemporalNumericDriftModule::default())))
        .expect("static registration");
    registry
}
