//! Verification orchestrator — architecture §4.8. Wires extraction,
//! retrieval, validation, arbitration, quality modules, and the rubric
//! auditor into a single `verify` call.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use arbitration::ArbitrationEngine;
use quality::{default_registry as default_quality_registry, QualityRegistry};
use retrievers::{default_registry as default_retriever_registry, Retriever, RetrieveMetadata, RetrieverRegistry};
use schema::{Disposition, Policy, QualityIssueKind, Schema, Verdict, VerificationReport};
use serde_json::Value as Json;
use validators::{default_registry as default_validator_registry, ValidatorRegistry};

fn insufficient_result(validator: &str, explanation: String) -> schema::ValidatorResult {
    schema::ValidatorResult {
        validator: validator.to_string(),
        verdict: Verdict::InsufficientEvidence,
        explanation: Some(explanation),
        score: None,
        metadata: None,
    }
}

type CacheKey = (u64, String, String);

#[derive(Default)]
struct RetrieverCache {
    order: VecDeque<CacheKey>,
    entries: HashMap<CacheKey, Arc<dyn Retriever>>,
    hits: u64,
    misses: u64,
}

pub struct CacheStats {
    pub cache_size: usize,
    pub max_cache_size: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
}

/// Coordinates the full verification pipeline for a (schema, policy) pair.
/// One `Checker` is built per document family and reused across documents
/// so the retriever cache actually pays off.
pub struct Checker {
    schema: Schema,
    policy: Policy,
    arbitration_engine: ArbitrationEngine,
    retriever_registry: RetrieverRegistry,
    validator_registry: ValidatorRegistry,
    quality_registry: QualityRegistry,
    cache_retrievers: bool,
    max_cache_size: usize,
    cache: Mutex<RetrieverCache>,
}

impl Checker {
    pub fn new(schema: Schema, policy: Policy) -> Result<Self, schema::PipelineError> {
        Self::with_cache_size(schema, policy, true, 100)
    }

    pub fn with_cache_size(
        schema: Schema,
        policy: Policy,
        cache_retrievers: bool,
        max_cache_size: usize,
    ) -> Result<Self, schema::PipelineError> {
        let arbitration_engine = ArbitrationEngine::new(policy.aggregation.clone())?;
        Ok(Checker {
            schema,
            policy,
            arbitration_engine,
            retriever_registry: default_retriever_registry(),
            validator_registry: default_validator_registry(),
            quality_registry: default_quality_registry(),
            cache_retrievers,
            max_cache_size,
            cache: Mutex::new(RetrieverCache::default()),
        })
    }

    pub fn verify(&self, transcript: &str, summary: &Json, meta: Option<HashMap<String, Json>>) -> VerificationReport {
        let mut claims = extraction::extract_claims(summary, &self.schema);
        for claim in &mut claims {
            claim.metadata.insert("summary".to_string(), summary.clone());
            if let Some(meta) = &meta {
                for (k, v) in meta {
                    claim.metadata.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }

        let retriever_config = Json::Object(self.policy.retriever_config.clone().into_iter().collect());
        let retriever = self.get_or_create_retriever(transcript, &self.policy.retriever, &retriever_config);

        let mut dispositions = Vec::new();
        for claim in &claims {
            let metadata = RetrieveMetadata { field: &claim.field, summary };
            let evidence = retriever.retrieve(&claim.text, self.policy.settings.max_evidence_spans, Some(&metadata));

            let validator_specs = self.policy.validators.get(&claim.field).cloned().unwrap_or_default();
            let mut validator_results = Vec::with_capacity(validator_specs.len());

            for spec in &validator_specs {
                let Some(name) = spec.name() else { continue };
                let config = spec.config();

                let result = match self.validator_registry.create(name, &config) {
                    Err(err) => insufficient_result(name, format!("validator error: {err}")),
                    Ok(validator) => {
                        match catch_unwind(AssertUnwindSafe(|| validator.validate(claim, &evidence, transcript))) {
                            Ok(r) => r,
                            Err(_) => insufficient_result(name, "validator panicked".to_string()),
                        }
                    }
                };
                validator_results.push(result);
            }

            if validator_results.is_empty() {
                continue;
            }
            dispositions.push(self.arbitration_engine.arbitrate(claim, &evidence, validator_results));
        }

        self.run_quality_modules(&mut dispositions, transcript);

        let missing_claims = rubric::detect_missing_claims(transcript, summary);
        let overall_score = self.calculate_overall_score(&dispositions, summary);
        let quality_score = calculate_quality_score(&dispositions);

        VerificationReport {
            dispositions,
            source_fields: summary.clone(),
            overall_score,
            quality_score,
            missing_claims,
            issues: Vec::new(),
            metadata: meta.map(|m| m.into_iter().collect()),
        }
    }

    fn run_quality_modules(&self, dispositions: &mut [Disposition], transcript: &str) {
        for disposition in dispositions.iter_mut() {
            for spec in &self.policy.quality_modules {
                let module = match self.quality_registry.create(&spec.name) {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                if !module.should_analyze(disposition) {
                    continue;
                }
                let analysis = module.analyze(disposition, transcript);
                disposition.quality_issues.extend(analysis.issues);
                if analysis.quality_score < 1.0 {
                    let current = disposition.quality_score_or_default();
                    disposition.quality_score = Some(current * analysis.quality_score);
                }
            }

            let has_drift = disposition.quality_issues.iter().any(|issue| {
                matches!(
                    issue.kind,
                    QualityIssueKind::TemporalDrift | QualityIssueKind::NumericMismatch | QualityIssueKind::UnitMismatch
                )
            });
            if has_drift {
                let current = disposition.confidence_or_default();
                disposition.confidence = Some(current * self.policy.quality_confidence_penalty);
            }
        }
    }

    fn calculate_overall_score(&self, dispositions: &[Disposition], summary: &Json) -> f64 {
        if dispositions.is_empty() {
            return 0.0;
        }

        let claim_score = match self.policy.scoring.method {
            schema::ScoringMethod::Simple => {
                let supported = dispositions.iter().filter(|d| d.verdict == Verdict::Supported).count();
                supported as f64 / dispositions.len() as f64
            }
            schema::ScoringMethod::QualityWeighted => {
                let total: f64 = dispositions
                    .iter()
                    .map(|d| {
                        let base = if d.verdict == Verdict::Supported { 1.0 } else { 0.0 };
                        base * d.quality_score_or_default()
                    })
                    .sum();
                total / dispositions.len() as f64
            }
        };

        let completeness_score = rubric::calculate_completeness_score(summary, &self.schema);
        let overall = 0.7 * claim_score + 0.3 * completeness_score;
        (overall.clamp(0.0, 1.0) * 1000.0).round() / 1000.0
    }

    fn get_or_create_retriever(&self, transcript: &str, name: &str, config: &Json) -> Arc<dyn Retriever> {
        if !self.cache_retrievers {
            return self
                .retriever_registry
                .create(name, transcript, config)
                .expect("configured retriever must be registered")
                .into();
        }

        let mut hasher = DefaultHasher::new();
        transcript.hash(&mut hasher);
        let transcript_hash = hasher.finish();
        let config_key = serde_json::to_string(config).unwrap_or_default();
        let key: CacheKey = (transcript_hash, name.to_string(), config_key);

        let mut cache = self.cache.lock().expect("retriever cache poisoned");
        if let Some(retriever) = cache.entries.get(&key) {
            cache.hits += 1;
            return retriever.clone();
        }
        cache.misses += 1;

        let retriever: Arc<dyn Retriever> = self
            .retriever_registry
            .create(name, transcript, config)
            .expect("configured retriever must be registered")
            .into();

        if cache.entries.len() >= self.max_cache_size {
            if let Some(oldest) = cache.order.pop_front() {
                cache.entries.remove(&oldest);
            }
        }
        cache.order.push_back(key.clone());
        cache.entries.insert(key, retriever.clone());
        retriever
    }

    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock().expect("retriever cache poisoned");
        cache.order.clear();
        cache.entries.clear();
        cache.hits = 0;
        cache.misses = 0;
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.lock().expect("retriever cache poisoned");
        let total = cache.hits + cache.misses;
        let hit_rate = if total > 0 { cache.hits as f64 / total as f64 } else { 0.0 };
        CacheStats {
            cache_size: cache.entries.len(),
            max_cache_size: self.max_cache_size,
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            hit_rate: (hit_rate * 1000.0).round() / 1000.0,
        }
    }
}

fn calculate_quality_score(dispositions: &[Disposition]) -> f64 {
    if dispositions.is_empty() {
        return 1.0;
    }
    let scores: Vec<f64> = dispositions.iter().filter_map(|d| d.quality_score).collect();
    if scores.is_empty() {
        return 1.0;
    }
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;
    (avg * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{ExtractionMethod, FieldSchema, ValidatorSpec};
    use std::collections::BTreeMap;

    fn test_schema() -> Schema {
        let mut fields = BTreeMap::new();
        fields.insert(
            "diagnosis".to_string(),
            FieldSchema {
                path: Some("diagnosis".to_string()),
                fallback_paths: vec![],
                extraction_method: ExtractionMethod::SingleValue,
                delimiter: None,
                pattern: None,
                split_compound_claims: false,
                min_claim_length: None,
                required: true,
                criticality: None,
            },
        );
        Schema { version: "1".to_string(), fields, criticality_weights: BTreeMap::new() }
    }

    fn test_policy() -> Policy {
        let mut validators = BTreeMap::new();
        validators.insert("diagnosis".to_string(), vec![ValidatorSpec::Name("always_true".to_string())]);
        Policy {
            version: "1".to_string(),
            validators,
            retriever: "bm25".to_string(),
            retriever_config: BTreeMap::new(),
            aggregation: schema::ArbitrationConfig::default(),
            quality_modules: vec![],
            quality_confidence_penalty: 0.9,
            scoring: schema::ScoringConfig::default(),
            settings: schema::Settings::default(),
        }
    }

    #[test]
    fn verify_produces_a_disposition_per_claim() {
        let checker = Checker::new(test_schema(), test_policy()).unwrap();
        let transcript = "Patient was diagnosed with a mild fracture of the wrist.";
        let summary = serde_json::json!({"diagnosis": "wrist fracture"});
        let report = checker.verify(transcript, &summary, None);
        assert_eq!(report.dispositions.len(), 1);
        assert_eq!(report.dispositions[0].verdict, Verdict::Supported);
    }

    #[test]
    fn verify_fills_in_missing_required_field_in_overall_score() {
        let checker = Checker::new(test_schema(), test_policy()).unwrap();
        let summary = serde_json::json!({});
        let report = checker.verify("transcript text", &summary, None);
        assert_eq!(report.overall_score, 0.0);
    }

    #[test]
    fn retriever_cache_reuses_instance_for_repeat_calls() {
        let checker = Checker::new(test_schema(), test_policy()).unwrap();
        let summary = serde_json::json!({"diagnosis": "wrist fracture"});
        checker.verify("Patient was diagnosed with a fracture.", &summary, None);
        checker.verify("Patient was diagnosed with a fracture.", &summary, None);
        let stats = checker.cache_stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[test]
    fn clear_cache_resets_stats() {
        let checker = Checker::new(test_schema(), test_policy()).unwrap();
        let summary = serde_json::json!({"diagnosis": "wrist fracture"});
        checker.verify("Patient was diagnosed with a fracture.", &summary, None);
        checker.clear_cache();
        let stats = checker.cache_stats();
        assert_eq!(stats.cache_size, 0);
        assert_eq!(stats.cache_hits, 0);
    }
}
