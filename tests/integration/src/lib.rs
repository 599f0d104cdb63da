//! Shared scaffolding for the end-to-end test suite in `tests/`: demo
//! schema/policy builders that mirror the seed scenarios.

use std::collections::BTreeMap;

use schema::{
    ArbitrationConfig, ArbitrationStrategy, ExtractionMethod, FieldSchema, Policy, Schema,
    ValidatorSpec,
};

pub fn schema_with_field(field: &str, method: ExtractionMethod) -> Schema {
    let mut fields = BTreeMap::new();
    fields.insert(
        field.to_string(),
        FieldSchema {
            path: Some(field.to_string()),
            fallback_paths: Vec::new(),
            extraction_method: method,
            delimiter: None,
            pattern: None,
            split_compound_claims: false,
            min_claim_length: None,
            required: false,
            criticality: None,
        },
    );
    Schema {
        version: "1.0".to_string(),
        fields,
        criticality_weights: BTreeMap::new(),
    }
}

pub fn policy_with_validators(field: &str, validators: &[&str]) -> Policy {
    let mut validator_map = BTreeMap::new();
    validator_map.insert(
        field.to_string(),
        validators.iter().map(|v| ValidatorSpec::Name(v.to_string())).collect(),
    );
    Policy {
        version: "1.0".to_string(),
        validators: validator_map,
        retriever: "bm25".to_string(),
        retriever_config: BTreeMap::new(),
        aggregation: ArbitrationConfig {
            strategy: ArbitrationStrategy::PriorityBased,
            ..ArbitrationConfig::default()
        },
        quality_modules: Vec::new(),
        quality_confidence_penalty: 0.9,
        scoring: schema::ScoringConfig::default(),
        settings: schema::Settings::default(),
    }
}

pub fn policy_with_quality_module(field: &str, validators: &[&str], quality_module: &str) -> Policy {
    let mut policy = policy_with_validators(field, validators);
    policy.quality_modules.push(schema::QualityModuleSpec {
        name: quality_module.to_string(),
        params: BTreeMap::new(),
    });
    policy
}
