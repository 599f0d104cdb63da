use std::collections::{BTreeMap, VecDeque};
use std::io::Read;

use anyhow::{Context, Result};
use checker::Checker;
use schema::{
    ArbitrationConfig, ArbitrationStrategy, ExtractionMethod, FieldSchema, Policy, Schema,
    ValidatorSpec,
};
use serde_json::Value as Json;

/// A schema/policy pair exercising a chief-complaint field against a plan
/// field, close to the medical-note shape used throughout the pipeline's
/// own tests. Loading schema/policy documents from disk is out of scope
/// here; this binary hardcodes a demo pair so the checker library can be
/// driven end to end without a config format to maintain.
fn demo_schema() -> Schema {
    let mut fields = BTreeMap::new();
    fields.insert(
        "chief_complaint".to_string(),
        FieldSchema {
            path: Some("chief_complaint".to_string()),
            fallback_paths: Vec::new(),
            extraction_method: ExtractionMethod::SingleValue,
            delimiter: None,
            pattern: None,
            split_compound_claims: false,
            min_claim_length: None,
            required: true,
            criticality: Some("high".to_string()),
        },
    );
    fields.insert(
        "plan".to_string(),
        FieldSchema {
            path: Some("plan".to_string()),
            fallback_paths: Vec::new(),
            extraction_method: ExtractionMethod::SentenceSplit,
            delimiter: None,
            pattern: None,
            split_compound_claims: true,
            min_claim_length: Some(8),
            required: false,
            criticality: Some("medium".to_string()),
        },
    );
    Schema {
        version: "1.0".to_string(),
        fields,
        criticality_weights: BTreeMap::new(),
    }
}

fn demo_policy() -> Policy {
    let mut validators = BTreeMap::new();
    validators.insert(
        "chief_complaint".to_string(),
        vec![ValidatorSpec::Name("bm25_validator".to_string())],
    );
    validators.insert(
        "plan".to_string(),
        vec![
            ValidatorSpec::Name("temporal_drift_validator".to_string()),
            ValidatorSpec::Name("nli_validator".to_string()),
        ],
    );
    Policy {
        version: "1.0".to_string(),
        validators,
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

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: VecDeque<String> = std::env::args().skip(1).collect();
    let (transcript, summary) = parse_args(args).context("parsing arguments")?;

    let schema = demo_schema();
    let policy = demo_policy();
    let checker = Checker::new(schema, policy).context("constructing checker")?;

    let report = checker.verify(&transcript, &summary, None);
    let rendered = serde_json::to_string_pretty(&report).context("rendering report")?;
    println!("{rendered}");
    Ok(())
}

/// `verify-demo [--transcript-file PATH] [--summary-file PATH]`, or with no
/// arguments, reads a `{"transcript": ..., "summary": ...}` JSON object from
/// stdin. Argument parsing and schema loading are both explicitly out of
/// scope for the library; this is just enough plumbing to drive it.
fn parse_args(mut args: VecDeque<String>) -> Result<(String, Json)> {
    let mut transcript_file = None;
    let mut summary_file = None;
    while let Some(arg) = args.pop_front() {
        match arg.as_str() {
            "--transcript-file" => {
                transcript_file = Some(args.pop_front().context("--transcript-file needs a value")?)
            }
            "--summary-file" => {
                summary_file = Some(args.pop_front().context("--summary-file needs a value")?)
            }
            other => anyhow::bail!("unknown argument '{other}'"),
        }
    }

    if let (Some(t), Some(s)) = (transcript_file, summary_file) {
        let transcript = std::fs::read_to_string(&t).with_context(|| format!("reading {t}"))?;
        let summary_raw = std::fs::read_to_string(&s).with_context(|| format!("reading {s}"))?;
        let summary: Json = serde_json::from_str(&summary_raw).context("parsing summary JSON")?;
        return Ok((transcript, summary));
    }

    let mut stdin_buf = String::new();
    std::io::stdin()
        .read_to_string(&mut stdin_buf)
        .context("reading stdin")?;
    let input: Json = serde_json::from_str(&stdin_buf).context("parsing stdin JSON")?;
    let transcript = input
        .get("transcript")
        .and_then(Json::as_str)
        .context("stdin JSON missing 'transcript' string field")?
        .to_string();
    let summary = input
        .get("summary")
        .cloned()
        .context("stdin JSON missing 'summary' field")?;
    Ok((transcript, summary))
}
