//! Validator registry and implementations — architecture §4.4. Each
//! validator independently judges a (Claim, EvidenceSpan list) pair and
//! returns a `ValidatorResult`; the arbitration engine fuses the results.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use ranking::{cosine_similarity, jaccard_overlap};
use regex::Regex;
use retrievers::EmbeddingService;
use schema::{Claim, EvidenceSpan, PipelineError, Verdict, ValidatorResult};
use serde_json::Value as Json;

pub trait Validator: Send + Sync {
    fn validate(&self, claim: &Claim, evidence: &[EvidenceSpan], transcript: &str) -> ValidatorResult;
}

fn result(validator: &str, verdict: Verdict, explanation: impl Into<String>) -> ValidatorResult {
    ValidatorResult {
        validator: validator.to_string(),
        verdict,
        explanation: Some(explanation.into()),
        score: None,
        metadata: None,
    }
}

fn insufficient(validator: &str, explanation: impl Into<String>) -> ValidatorResult {
    result(validator, Verdict::InsufficientEvidence, explanation)
}

fn f64_config(config: &Json, key: &str, default: f64) -> f64 {
    config.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

fn usize_config(config: &Json, key: &str, default: usize) -> usize {
    config.get(key).and_then(|v| v.as_u64()).map(|v| v as usize).unwrap_or(default)
}

// ---------------------------------------------------------------------------
// always_true
// ---------------------------------------------------------------------------

pub struct AlwaysTrueValidator;

impl Validator for AlwaysTrueValidator {
    fn validate(&self, _claim: &Claim, evidence: &[EvidenceSpan], _transcript: &str) -> ValidatorResult {
        ValidatorResult {
            validator: "always_true".to_string(),
            verdict: Verdict::Supported,
            explanation: Some("always_true validator always returns supported".to_string()),
            score: evidence.first().map(|e| e.score),
            metadata: None,
        }
    }
}

// ---------------------------------------------------------------------------
// bm25_validator
// ---------------------------------------------------------------------------

pub struct Bm25Validator {
    pub min_evidence_score: f64,
    pub min_evidence_count: usize,
}

impl Default for Bm25Validator {
    fn default() -> Self {
        Bm25Validator {
            min_evidence_score: 0.3,
            min_evidence_count: 1,
        }
    }
}

impl Bm25Validator {
    pub fn from_config(config: &Json) -> Self {
        Bm25Validator {
            min_evidence_score: f64_config(config, "min_evidence_score", 0.3),
            min_evidence_count: usize_config(config, "min_evidence_count", 1),
        }
    }
}

impl Validator for Bm25Validator {
    fn validate(&self, _claim: &Claim, evidence: &[EvidenceSpan], _transcript: &str) -> ValidatorResult {
        if evidence.is_empty() {
            return insufficient("bm25_validator", "No evidence found in transcript for this claim");
        }

        let strong: Vec<&EvidenceSpan> = evidence.iter().filter(|e| e.score >= self.min_evidence_score).collect();
        if strong.len() >= self.min_evidence_count {
            let avg = strong.iter().map(|e| e.score).sum::<f64>() / strong.len() as f64;
            let mut r = result(
                "bm25_validator",
                Verdict::Supported,
                format!(
                    "Found {} evidence span(s) with average BM25 score of {avg:.3}. Claim appears supported by transcript.",
                    strong.len()
                ),
            );
            r.score = Some(avg);
            r
        } else {
            let max = evidence.iter().map(|e| e.score).fold(0.0, f64::max);
            insufficient(
                "bm25_validator",
                format!(
                    "Found {} evidence span(s) but highest BM25 score is {max:.3}, below threshold {:.3}.",
                    evidence.len(),
                    self.min_evidence_score
                ),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// semantic (minilm) validator
// ---------------------------------------------------------------------------

pub struct SemanticValidator {
    pub threshold: f64,
    embedder: Box<dyn EmbeddingService>,
}

impl SemanticValidator {
    pub fn new(threshold: f64, embedder: Box<dyn EmbeddingService>) -> Self {
        SemanticValidator { threshold, embedder }
    }

    pub fn from_config(config: &Json, embedder: Box<dyn EmbeddingService>) -> Self {
        SemanticValidator::new(f64_config(config, "embedding_threshold", 0.7), embedder)
    }
}

impl Validator for SemanticValidator {
    fn validate(&self, claim: &Claim, evidence: &[EvidenceSpan], _transcript: &str) -> ValidatorResult {
        if evidence.is_empty() {
            return insufficient("semantic_validator", "No evidence spans found in transcript");
        }

        let claim_embedding = self.embedder.embed(&claim.text);
        let best = evidence
            .iter()
            .map(|e| cosine_similarity(&claim_embedding, &self.embedder.embed(&e.text)))
            .fold(0.0_f64, f64::max);

        if best >= self.threshold {
            let mut r = result(
                "semantic_validator",
                Verdict::Supported,
                format!("Semantic similarity {best:.3} exceeds threshold {:.3}.", self.threshold),
            );
            r.score = Some(best);
            r
        } else {
            insufficient(
                "semantic_validator",
                format!("Best semantic similarity {best:.3} below threshold {:.3}.", self.threshold),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// hybrid_bm25_minilm validator
// ---------------------------------------------------------------------------

pub struct HybridValidator {
    pub threshold: f64,
    pub bm25_weight: f64,
    pub literal_boost: f64,
    pub boost_terms: HashSet<String>,
    embedder: Box<dyn EmbeddingService>,
}

impl HybridValidator {
    pub fn from_config(config: &Json, embedder: Box<dyn EmbeddingService>) -> Self {
        let boost_terms = config
            .get("boost_terms")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_lowercase)).collect())
            .unwrap_or_default();
        HybridValidator {
            threshold: f64_config(config, "min_evidence_score", 0.3),
            bm25_weight: f64_config(config, "bm25_weight", 0.5),
            literal_boost: f64_config(config, "literal_boost", 0.2),
            boost_terms,
            embedder,
        }
    }
}

impl Validator for HybridValidator {
    fn validate(&self, claim: &Claim, evidence: &[EvidenceSpan], _transcript: &str) -> ValidatorResult {
        if evidence.is_empty() {
            return insufficient("hybrid_bm25_minilm_validator", "No evidence spans found in transcript");
        }

        let minilm_weight = 1.0 - self.bm25_weight;
        let claim_embedding = self.embedder.embed(&claim.text);
        let claim_lower = claim.text.to_lowercase();

        let best = evidence
            .iter()
            .map(|e| {
                let minilm_score = cosine_similarity(&claim_embedding, &self.embedder.embed(&e.text));
                let mut hybrid = self.bm25_weight * e.score + minilm_weight * minilm_score;
                let ev_lower = e.text.to_lowercase();
                if ev_lower.contains(&claim_lower) {
                    hybrid = (hybrid + self.literal_boost).min(1.0);
                }
                if !self.boost_terms.is_empty() && self.boost_terms.iter().any(|t| ev_lower.contains(t.as_str())) {
                    hybrid = (hybrid + self.literal_boost).min(1.0);
                }
                hybrid
            })
            .fold(0.0_f64, f64::max);

        if best >= self.threshold {
            let mut r = result(
                "hybrid_bm25_minilm_validator",
                Verdict::Supported,
                format!(
                    "Hybrid score {best:.3} (bm25_weight={:.1}, minilm_weight={minilm_weight:.1}) exceeds threshold {:.3}.",
                    self.bm25_weight, self.threshold
                ),
            );
            r.score = Some(best);
            r
        } else {
            insufficient(
                "hybrid_bm25_minilm_validator",
                format!("Best hybrid score {best:.3} below threshold {:.3}.", self.threshold),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// regex_validator
// ---------------------------------------------------------------------------

pub struct RegexValidator {
    patterns: HashMap<String, Vec<Regex>>,
    search_transcript_if_no_evidence: bool,
    min_matches: usize,
    max_evidence_spans: usize,
}

fn default_pattern_bank() -> HashMap<String, Vec<&'static str>> {
    let mut m = HashMap::new();
    m.insert(
        "identifiers".to_string(),
        vec![
            r"(?i)\b\d{1,3}\s*-?\s*year\s*-?\s*old\b",
            r"(?i)\bage\s*(?:is|:)?\s*\d{1,3}\b",
            r"(?i)\b(male|female|man|woman)\b",
            r"(?i)\b\d{1,3}\s*yo\b",
        ],
    );
    m.insert(
        "tetanus".to_string(),
        vec![
            r"(?i)tetanus (?:shot|vaccination|vaccine) (?:status )?(?:is )?\d{1,2}\s*years?\s*ago\b",
            r"(?i)last tetanus (?:shot|vaccine|vaccination) (?:was )?\d{1,2}\s*years?\s*ago\b",
            r"(?i)tetanus (?:status )?(?:up to date|uptodate|up-to-date)",
        ],
    );
    m.insert(
        "vitals".to_string(),
        vec![
            r"(?i)\bhr[: ]?\s*\d{2,3}\b",
            r"(?i)\bbp[: ]?\s*\d{2,3}/\d{2,3}\b",
            r"(?i)\btemp[: ]?\s*\d{2}\.\d\b",
        ],
    );
    m.insert(
        "phrase".to_string(),
        vec![
            r"(?i)\bdischarg(?:ed|e)[: ]?\s*(?:home|admit|observation)\b",
            r"(?i)\bfollow[- ]?up (?:in|at) \d{1,3} (?:hours|days)\b",
            r"(?i)\bwound care instructions\b",
            r"(?i)\bsuture removal\b",
        ],
    );
    m
}

impl RegexValidator {
    pub fn from_config(config: &Json) -> Self {
        let mut bank: HashMap<String, Vec<Regex>> = default_pattern_bank()
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().map(|p| Regex::new(p).unwrap()).collect()))
            .collect();

        if let Some(overrides) = config.get("patterns").and_then(|v| v.as_object()) {
            for (field, list) in overrides {
                if let Some(strings) = list.as_array() {
                    let compiled: Vec<Regex> = strings
                        .iter()
                        .filter_map(|s| s.as_str())
                        .filter_map(|p| Regex::new(&format!("(?i){p}")).ok())
                        .collect();
                    bank.insert(field.clone(), compiled);
                }
            }
        }

        RegexValidator {
            patterns: bank,
            search_transcript_if_no_evidence: config
                .get("search_transcript_if_no_evidence")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
            min_matches: usize_config(config, "min_matches", 1),
            max_evidence_spans: usize_config(config, "max_evidence_spans", 5),
        }
    }

    fn patterns_for_field<'a>(&'a self, field: &str) -> Option<&'a Vec<Regex>> {
        let f = field.to_lowercase();
        if let Some(p) = self.patterns.get(&f) {
            return Some(p);
        }
        if f.contains("identif") {
            return self.patterns.get("identifiers");
        }
        if f.contains("tetanus") {
            return self.patterns.get("tetanus");
        }
        if f.contains("vital") {
            return self.patterns.get("vitals");
        }
        if f.contains("follow") || f.contains("dispo") {
            return self.patterns.get("phrase");
        }
        self.patterns.get("phrase")
    }
}

impl Validator for RegexValidator {
    fn validate(&self, claim: &Claim, evidence: &[EvidenceSpan], transcript: &str) -> ValidatorResult {
        let Some(patterns) = self.patterns_for_field(&claim.field) else {
            return insufficient("regex_validator", "No patterns available for this field");
        };

        let mut matched: Vec<EvidenceSpan> = Vec::new();

        if !evidence.is_empty() {
            for ev in evidence {
                for pat in patterns {
                    for m in pat.find_iter(&ev.text) {
                        matched.push(EvidenceSpan {
                            text: m.as_str().to_string(),
                            start_idx: ev.start_idx + m.start(),
                            end_idx: ev.start_idx + m.end(),
                            score: 1.0,
                        });
                    }
                }
            }
            if matched.len() >= self.min_matches {
                let count = matched.len();
                matched.truncate(self.max_evidence_spans);
                return ValidatorResult {
                    validator: "regex_validator".to_string(),
                    verdict: Verdict::Supported,
                    explanation: Some(format!("Found {count} regex match(es) in evidence spans.")),
                    score: Some(1.0),
                    metadata: None,
                };
            }
        }

        if self.search_transcript_if_no_evidence {
            'outer: for pat in patterns {
                for m in pat.find_iter(transcript) {
                    matched.push(EvidenceSpan {
                        text: m.as_str().to_string(),
                        start_idx: m.start(),
                        end_idx: m.end(),
                        score: 1.0,
                    });
                    if matched.len() >= self.min_matches {
                        break 'outer;
                    }
                }
            }
            if matched.len() >= self.min_matches {
                let count = matched.len();
                matched.truncate(self.max_evidence_spans);
                return ValidatorResult {
                    validator: "regex_validator".to_string(),
                    verdict: Verdict::Supported,
                    explanation: Some(format!("Found {count} regex match(es) in transcript.")),
                    score: Some(1.0),
                    metadata: None,
                };
            }
        }

        insufficient("regex_validator", "No regex matches found")
    }
}

// ---------------------------------------------------------------------------
// speaker_attribution_validator
// ---------------------------------------------------------------------------

fn relation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:my|the)\s+(daughter|son|wife|husband|mother|father|sister|brother)\b").unwrap())
}

pub struct SpeakerAttributionValidator;

impl SpeakerAttributionValidator {
    fn extract_historians(&self, transcript: &str) -> HashSet<String> {
        let mut historians = HashSet::new();
        historians.insert("Patient".to_string());
        for cap in relation_re().captures_iter(transcript) {
            historians.insert(capitalize(&cap[1]));
        }
        historians
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

impl Validator for SpeakerAttributionValidator {
    fn validate(&self, claim: &Claim, _evidence: &[EvidenceSpan], transcript: &str) -> ValidatorResult {
        let claimed: HashSet<String> = claim
            .text
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(capitalize)
            .collect();
        let detected = self.extract_historians(transcript);

        let missing: Vec<&String> = claimed.difference(&detected).collect();
        if missing.is_empty() {
            result(
                "speaker_attribution_validator",
                Verdict::Supported,
                format!("All claimed historians found in transcript: {claimed:?}"),
            )
        } else {
            insufficient(
                "speaker_attribution_validator",
                format!("Missing historians: {missing:?}. Detected: {detected:?}"),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// NLI validator (stubbable model handle)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NliLabel {
    Entailment,
    Neutral,
    Contradiction,
}

/// Stubbable model handle (architecture §5, §9) for premise/hypothesis
/// classification. Production builds back this with a real NLI model;
/// the heuristic here uses lexical overlap and negation cues.
pub trait NliClassifier: Send + Sync {
    fn classify(&self, premise: &str, hypothesis: &str) -> (NliLabel, f64);
}

/// Cue-word based negation detector, standing in for dependency-parse based
/// negation scope detection (architecture §9 "acquire handle").
pub trait NegationTagger: Send + Sync {
    fn is_negated(&self, text: &str) -> bool;
}

const NEGATION_CUES: &[&str] = &["no", "denies", "without", "never", "negative", "not", "n't"];

pub struct HeuristicNegationTagger;

impl NegationTagger for HeuristicNegationTagger {
    fn is_negated(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        NEGATION_CUES.iter().any(|cue| {
            lower.split(|c: char| !c.is_alphanumeric() && c != '\'').any(|w| w == *cue)
        })
    }
}

pub struct HeuristicNliClassifier;

impl NliClassifier for HeuristicNliClassifier {
    fn classify(&self, premise: &str, hypothesis: &str) -> (NliLabel, f64) {
        let overlap = jaccard_overlap(premise, hypothesis);
        let premise_negated = HeuristicNegationTagger.is_negated(premise);
        let hypothesis_negated = HeuristicNegationTagger.is_negated(hypothesis);

        if overlap > 0.3 && premise_negated != hypothesis_negated {
            (NliLabel::Contradiction, 0.5 + overlap.min(0.5))
        } else if overlap > 0.3 {
            (NliLabel::Entailment, 0.3 + overlap.min(0.7))
        } else {
            (NliLabel::Neutral, 1.0 - overlap)
        }
    }
}

pub struct NliValidator {
    pub refute_threshold: f64,
    pub support_threshold: f64,
    pub max_evidence_spans: usize,
    classifier: Box<dyn NliClassifier>,
    negation_tagger: Box<dyn NegationTagger>,
}

impl NliValidator {
    pub fn new(
        refute_threshold: f64,
        support_threshold: f64,
        max_evidence_spans: usize,
        classifier: Box<dyn NliClassifier>,
        negation_tagger: Box<dyn NegationTagger>,
    ) -> Self {
        NliValidator {
            refute_threshold,
            support_threshold,
            max_evidence_spans,
            classifier,
            negation_tagger,
        }
    }

    pub fn from_config(config: &Json) -> Self {
        let generic = f64_config(config, "confidence_threshold", 0.9);
        NliValidator::new(
            config.get("refute_threshold").and_then(|v| v.as_f64()).unwrap_or(generic.max(0.9)),
            config.get("support_threshold").and_then(|v| v.as_f64()).unwrap_or(0.3),
            usize_config(config, "max_evidence_spans", 5),
            Box::new(HeuristicNliClassifier),
            Box::new(HeuristicNegationTagger),
        )
    }
}

impl Validator for NliValidator {
    fn validate(&self, claim: &Claim, evidence: &[EvidenceSpan], _transcript: &str) -> ValidatorResult {
        if evidence.is_empty() {
            return insufficient("nli_validator", "No evidence spans to validate claim against.");
        }

        let claim_negated = self.negation_tagger.is_negated(&claim.text);
        let mut verdict = Verdict::InsufficientEvidence;
        let mut explanation = String::new();
        let mut best_confidence = 0.0_f64;

        for ev in evidence.iter().take(self.max_evidence_spans) {
            let ev_negated = self.negation_tagger.is_negated(&ev.text);

            if claim_negated && ev_negated {
                verdict = Verdict::Supported;
                explanation = "Double negative: both claim and evidence express negation, indicating agreement".to_string();
                best_confidence = 1.0;
                break;
            }

            let (label, confidence) = self.classifier.classify(&ev.text, &claim.text);

            if label == NliLabel::Contradiction && confidence >= self.refute_threshold {
                verdict = Verdict::Refuted;
                explanation = format!(
                    "Claim contradicts evidence (confidence={confidence:.2}, threshold={:.2})",
                    self.refute_threshold
                );
                best_confidence = confidence;
                break;
            } else if label == NliLabel::Entailment && confidence >= self.support_threshold && confidence > best_confidence {
                verdict = Verdict::Supported;
                explanation = format!(
                    "Claim supported by evidence (confidence={confidence:.2}, threshold={:.2})",
                    self.support_threshold
                );
                best_confidence = confidence;
            }
        }

        if explanation.is_empty() {
            explanation = format!(
                "No strong entailment or contradiction found (support_threshold={:.2}, refute_threshold={:.2})",
                self.support_threshold, self.refute_threshold
            );
        }

        let mut r = result("nli_validator", verdict, explanation);
        r.score = Some(best_confidence);
        r
    }
}

// ---------------------------------------------------------------------------
// negation_refuter
// ---------------------------------------------------------------------------

pub struct NegationRefuter {
    pub match_threshold: f64,
    pub boost_terms: HashSet<String>,
    embedder: Box<dyn EmbeddingService>,
    negation_tagger: Box<dyn NegationTagger>,
}

impl NegationRefuter {
    pub fn from_config(config: &Json, embedder: Box<dyn EmbeddingService>) -> Self {
        let boost_terms = config
            .get("boost_words")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_lowercase)).collect())
            .unwrap_or_default();
        NegationRefuter {
            match_threshold: f64_config(config, "match_threshold", 0.7),
            boost_terms,
            embedder,
            negation_tagger: Box::new(HeuristicNegationTagger),
        }
    }

    fn negated_sentences(&self, transcript: &str) -> Vec<String> {
        extraction::split_into_sentences(transcript)
            .into_iter()
            .filter(|s| !s.contains('?') && self.negation_tagger.is_negated(s))
            .collect()
    }

    fn entity_match_score(&self, claim_text: &str, sentence: &str) -> f64 {
        let mut score = cosine_similarity(&self.embedder.embed(claim_text), &self.embedder.embed(sentence));
        let sentence_lower = sentence.to_lowercase();
        if !self.boost_terms.is_empty() && self.boost_terms.iter().any(|t| sentence_lower.contains(t.as_str())) {
            score = (score + 0.3).min(1.0);
        }
        score
    }
}

impl Validator for NegationRefuter {
    fn validate(&self, claim: &Claim, _evidence: &[EvidenceSpan], transcript: &str) -> ValidatorResult {
        let claim_negated = self.negation_tagger.is_negated(&claim.text);

        let mut best_score = 0.0_f64;
        let mut best_sentence: Option<String> = None;
        for sentence in self.negated_sentences(transcript) {
            let score = self.entity_match_score(&claim.text, &sentence);
            if score > best_score {
                best_score = score;
                best_sentence = Some(sentence);
            }
        }

        if best_score >= self.match_threshold {
            let mut r = if claim_negated {
                result(
                    "negation_refuter",
                    Verdict::Supported,
                    format!("Double negative: both claim and transcript express negation (score={best_score:.2})"),
                )
            } else {
                result(
                    "negation_refuter",
                    Verdict::Refuted,
                    format!(
                        "Claim contradicts negated statement in transcript: '{}' (score={best_score:.2})",
                        best_sentence.unwrap_or_default()
                    ),
                )
            };
            r.score = Some(best_score);
            r
        } else {
            insufficient("negation_refuter", "No negated statements matched claim")
        }
    }
}

// ---------------------------------------------------------------------------
// lexical_coverage_validator
// ---------------------------------------------------------------------------

fn coverage_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-z0-9']+\b").unwrap())
}

fn age_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,3})\b").unwrap())
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "is", "was", "were", "are", "been", "be",
    "have", "has", "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can",
    "of", "with", "from", "by", "as",
];

pub struct LexicalCoverageValidator {
    pub min_coverage: f64,
    pub fabrication_penalty: f64,
    pub max_penalty: f64,
    pub entity_boost: f64,
    stopwords: HashSet<&'static str>,
}

impl LexicalCoverageValidator {
    pub fn from_config(config: &Json) -> Self {
        LexicalCoverageValidator {
            min_coverage: f64_config(config, "min_coverage", 0.20),
            fabrication_penalty: f64_config(config, "fabrication_penalty", 0.5),
            max_penalty: f64_config(config, "max_penalty", 0.5),
            entity_boost: f64_config(config, "entity_boost", 0.20),
            stopwords: STOPWORDS.iter().copied().collect(),
        }
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        coverage_word_re()
            .find_iter(&text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .filter(|w| !self.stopwords.contains(w.as_str()))
            .collect()
    }

    fn coverage(&self, claim: &str, evidence: &str) -> f64 {
        let claim_words: HashSet<String> = self.tokenize(claim).into_iter().collect();
        if claim_words.is_empty() {
            return 1.0;
        }
        let evidence_words: HashSet<String> = self.tokenize(evidence).into_iter().collect();
        let overlap = claim_words.intersection(&evidence_words).count();
        let mut coverage = overlap as f64 / claim_words.len() as f64;

        if self.core_entities_match(claim, evidence) {
            coverage = (coverage + self.entity_boost).min(1.0);
        }
        coverage
    }

    fn core_entities_match(&self, claim: &str, evidence: &str) -> bool {
        let claim_lower = claim.to_lowercase();
        let evidence_lower = evidence.to_lowercase();

        let claim_ages: HashSet<u32> = age_re()
            .find_iter(claim)
            .filter_map(|m| m.as_str().parse::<u32>().ok())
            .filter(|n| (1..=120).contains(n))
            .collect();
        let evidence_ages: HashSet<u32> = age_re()
            .find_iter(evidence)
            .filter_map(|m| m.as_str().parse::<u32>().ok())
            .filter(|n| (1..=120).contains(n))
            .collect();
        let age_match = !claim_ages.is_disjoint(&evidence_ages) && !claim_ages.is_empty();

        let male_terms = ["male", "man", "men", "boy", "gentleman", "he", "his", "him"];
        let female_terms = ["female", "woman", "women", "girl", "lady", "she", "her", "hers"];
        let gender_match = (male_terms.iter().any(|t| claim_lower.contains(t)) && male_terms.iter().any(|t| evidence_lower.contains(t)))
            || (female_terms.iter().any(|t| claim_lower.contains(t)) && female_terms.iter().any(|t| evidence_lower.contains(t)));

        age_match && gender_match
    }

    fn fabricated_phrases(&self, claim: &str, evidence: &str) -> Vec<String> {
        let words = self.tokenize(claim);
        let evidence_lower = evidence.to_lowercase();
        let mut fabricated = Vec::new();
        for pair in words.windows(2) {
            let phrase = format!("{} {}", pair[0], pair[1]);
            if !evidence_lower.contains(&phrase) && !evidence_lower.contains(pair[0].as_str()) && !evidence_lower.contains(pair[1].as_str()) {
                fabricated.push(phrase);
            }
        }
        fabricated
    }
}

impl Validator for LexicalCoverageValidator {
    fn validate(&self, claim: &Claim, evidence: &[EvidenceSpan], _transcript: &str) -> ValidatorResult {
        if evidence.is_empty() {
            return insufficient("lexical_coverage_validator", "No evidence available for lexical coverage analysis");
        }

        let evidence_text: String = evidence.iter().map(|e| e.text.trim()).collect::<Vec<_>>().join(" ");
        if evidence_text.trim().is_empty() {
            return insufficient("lexical_coverage_validator", "Evidence provided but contains no text content");
        }

        let coverage = self.coverage(&claim.text, &evidence_text);
        let fabricated = self.fabricated_phrases(&claim.text, &evidence_text);

        let adjusted_coverage = if fabricated.is_empty() {
            coverage
        } else {
            let claim_word_count = claim.text.split_whitespace().count().max(1).saturating_sub(1).max(1);
            let fabricated_ratio = fabricated.len() as f64 / claim_word_count as f64;
            let penalty = (self.fabrication_penalty * fabricated_ratio).min(self.max_penalty);
            coverage * (1.0 - penalty)
        };

        let mut r = if adjusted_coverage < self.min_coverage {
            result(
                "lexical_coverage_validator",
                Verdict::Refuted,
                format!("Low lexical coverage ({coverage:.2}, adjusted: {adjusted_coverage:.2})."),
            )
        } else {
            result(
                "lexical_coverage_validator",
                Verdict::Supported,
                format!("Adequate lexical coverage ({coverage:.2})."),
            )
        };
        r.score = Some(adjusted_coverage);
        r
    }
}

// ---------------------------------------------------------------------------
// temporal_drift_validator
// ---------------------------------------------------------------------------

fn numeric_temporal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+)\s*(day|week|month|year)s?\b").unwrap())
}

fn relative_temporal_map() -> &'static [(&'static str, i64)] {
    &[
        ("today", 0),
        ("this morning", 0),
        ("this afternoon", 0),
        ("tonight", 0),
        ("yesterday", -1),
        ("last night", -1),
        ("last week", -7),
        ("last month", -30),
        ("tomorrow", 1),
        ("next week", 7),
        ("next month", 30),
    ]
}

fn normalize_quantity_unit(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "milligram" | "milligrams" | "mg" => "mg".to_string(),
        "gram" | "grams" | "g" => "g".to_string(),
        "kilogram" | "kilograms" | "kg" => "kg".to_string(),
        "milliliter" | "milliliters" | "ml" => "ml".to_string(),
        "liter" | "liters" | "l" => "l".to_string(),
        other => other.to_string(),
    }
}

pub struct TemporalDriftValidator {
    pub drift_threshold: f64,
}

impl TemporalDriftValidator {
    pub fn from_config(config: &Json) -> Self {
        TemporalDriftValidator {
            drift_threshold: f64_config(config, "drift_threshold", 7.0),
        }
    }

    fn extract_temporal(&self, text: &str) -> Vec<i64> {
        let lower = text.to_lowercase();
        let mut times = Vec::new();

        for (key, days) in relative_temporal_map() {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(key));
            if Regex::new(&pattern).unwrap().is_match(&lower) {
                times.push(*days);
            }
        }

        for m in numeric_temporal_re().captures_iter(&lower) {
            let n: i64 = m[1].parse().unwrap_or(0);
            let unit = m[2].to_lowercase();
            let multiplier = match unit.as_str() {
                "day" => 1,
                "week" => 7,
                "month" => 30,
                "year" => 365,
                _ => 1,
            };
            let whole = m.get(0).unwrap();
            let window_start = whole.start().saturating_sub(10);
            let window_end = (whole.end() + 10).min(lower.len());
            let window = &lower[window_start..window_end];
            let days = if window.contains("in ") || window.contains("next ") {
                n * multiplier
            } else {
                -n * multiplier
            };
            times.push(days);
        }
        times
    }

    fn extract_quantities(&self, text: &str) -> Vec<(String, String)> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(milligrams?|grams?|kilograms?|milliliters?|liters?|mg|g|kg|ml|l)\b").unwrap()
        });
        re.captures_iter(text)
            .map(|cap| (cap[1].to_string(), normalize_quantity_unit(&cap[2])))
            .collect()
    }

    fn unit_mismatch(&self, claim: &Claim, evidence: &[EvidenceSpan]) -> Option<ValidatorResult> {
        let claim_quantities = self.extract_quantities(&claim.text);
        if claim_quantities.is_empty() {
            return None;
        }
        for span in evidence.iter().filter(|e| e.score > 0.5) {
            for (evidence_value, evidence_unit) in self.extract_quantities(&span.text) {
                for (claim_value, claim_unit) in &claim_quantities {
                    if &evidence_value == claim_value && evidence_unit != *claim_unit {
                        let mut r = result(
                            "temporal_drift_validator",
                            Verdict::Refuted,
                            format!(
                                "UNIT MISMATCH: claim states '{claim_value} {claim_unit}' but evidence states '{evidence_value} {evidence_unit}'"
                            ),
                        );
                        let mut metadata = BTreeMap::new();
                        metadata.insert("critical".to_string(), Json::Bool(true));
                        r.metadata = Some(metadata);
                        return Some(r);
                    }
                }
            }
        }
        None
    }

    fn lexical_overlap(&self, a: &str, b: &str) -> f64 {
        let stop: HashSet<&str> = ["the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "is", "was", "were", "this", "that", "these", "those"]
            .into_iter()
            .collect();
        let a_words: HashSet<String> = a.to_lowercase().split_whitespace().map(String::from).collect();
        let b_words: HashSet<String> = b.to_lowercase().split_whitespace().map(String::from).collect();
        let content_a: HashSet<&String> = a_words.iter().filter(|w| !stop.contains(w.as_str())).collect();
        let content_b: HashSet<&String> = b_words.iter().filter(|w| !stop.contains(w.as_str())).collect();

        if content_a.is_empty() {
            return 0.0;
        }
        let overlap = content_a.iter().filter(|w| content_b.contains(**w)).count();
        overlap as f64 / content_a.len() as f64
    }

    fn compare_sets(&self, claim_times: &[i64], evidence_times: &[i64]) -> f64 {
        if claim_times.is_empty() || evidence_times.is_empty() {
            return 0.0;
        }
        let evidence_times = &evidence_times[..1.min(evidence_times.len())];
        let claim_avg = claim_times.iter().sum::<i64>() as f64 / claim_times.len() as f64;
        let evidence_avg = evidence_times.iter().sum::<i64>() as f64 / evidence_times.len() as f64;
        claim_avg - evidence_avg
    }
}

impl Validator for TemporalDriftValidator {
    fn validate(&self, claim: &Claim, evidence: &[EvidenceSpan], _transcript: &str) -> ValidatorResult {
        if evidence.is_empty() {
            return insufficient("temporal_drift_validator", "No evidence available");
        }

        if let Some(mismatch) = self.unit_mismatch(claim, evidence) {
            return mismatch;
        }

        let claim_times = self.extract_temporal(&claim.text);
        let evidence_text: String = evidence.iter().map(|e| e.text.as_str()).collect::<Vec<_>>().join(" ");
        let evidence_times = self.extract_temporal(&evidence_text);

        if claim_times.is_empty() && evidence_times.is_empty() {
            return result("temporal_drift_validator", Verdict::Supported, "No temporal expressions found");
        }

        if !claim_times.is_empty() && evidence_times.is_empty() {
            let overlap = self.lexical_overlap(&claim.text, &evidence_text);
            return if overlap > 0.4 {
                result(
                    "temporal_drift_validator",
                    Verdict::Supported,
                    format!("Temporal reference in claim but absent from evidence; lexical overlap ({overlap:.0}) suggests same event."),
                )
            } else {
                insufficient("temporal_drift_validator", "Temporal reference in claim but absent from evidence")
            };
        }

        let drift = self.compare_sets(&claim_times, &evidence_times);
        let diff = drift.abs();

        let mut r = if diff > self.drift_threshold {
            result(
                "temporal_drift_validator",
                Verdict::Refuted,
                format!("Temporal drift detected ({diff:.0} day(s) difference)."),
            )
        } else {
            result(
                "temporal_drift_validator",
                Verdict::Supported,
                format!("Temporal alignment OK ({diff:.0} day(s) difference)."),
            )
        };
        r.score = Some((1.0 - (diff / self.drift_threshold.max(1.0)).min(1.0)).max(0.0));
        r
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type ValidatorFactory = Box<dyn Fn(&Json) -> Box<dyn Validator> + Send + Sync>;

#[derive(Default)]
pub struct ValidatorRegistry {
    factories: HashMap<String, ValidatorFactory>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, factory: ValidatorFactory) -> Result<(), PipelineError> {
        if self.factories.contains_key(name) {
            return Err(PipelineError::DuplicatePlugin(name.to_string(), "validator"));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn create(&self, name: &str, config: &Json) -> Result<Box<dyn Validator>, PipelineError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PipelineError::UnknownPlugin(name.to_string(), "validator"))?;
        Ok(factory(config))
    }

    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

/// Registry pre-populated with all ten built-in validators.
pub fn default_registry() -> ValidatorRegistry {
    let mut registry = ValidatorRegistry::new();
    registry.register("always_true", Box::new(|_| Box::new(AlwaysTrueValidator))).expect("static registration");
    registry
        .register("bm25_validator", Box::new(|c| Box::new(Bm25Validator::from_config(c))))
        .expect("static registration");
    registry
        .register(
            "semantic_validator",
            Box::new(|c| Box::new(SemanticValidator::from_config(c, Box::new(retrievers::HashEmbeddingService)))),
        )
        .expect("static registration");
    registry
        .register(
            "hybrid_bm25_minilm_validator",
            Box::new(|c| Box::new(HybridValidator::from_config(c, Box::new(retrievers::HashEmbeddingService)))),
        )
        .expect("static registration");
    registry
        .register("regex_validator", Box::new(|c| Box::new(RegexValidator::from_config(c))))
        .expect("static registration");
    registry
        .register("speaker_attribution_validator", Box::new(|_| Box::new(SpeakerAttributionValidator)))
        .expect("static registration");
    registry
        .register("nli_validator", Box::new(|c| Box::new(NliValidator::from_config(c))))
        .expect("static registration");
    registry
        .register(
            "negation_refuter",
            Box::new(|c| Box::new(NegationRefuter::from_config(c, Box::new(retrievers::HashEmbeddingService)))),
        )
        .expect("static registration");
    registry
        .register("lexical_coverage_validator", Box::new(|c| Box::new(LexicalCoverageValidator::from_config(c))))
        .expect("static registration");
    registry
        .register("temporal_drift_validator", Box::new(|c| Box::new(TemporalDriftValidator::from_config(c))))
        .expect("static registration");
    registry
}
