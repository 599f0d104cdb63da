//! Retriever registry and implementations: BM25 sliding-window retrieval,
//! sentence-level semantic retrieval, and a context-aware query-expansion
//! wrapper. Architecture §4.3.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use ranking::{bm25_score, cosine_similarity};
use schema::{EvidenceSpan, PipelineError};
use serde_json::Value as Json;

/// Field + full source document, threaded through to retrievers that
/// contextualize terse claims (architecture §4.3 "context-aware wrapper").
pub struct RetrieveMetadata<'a> {
    pub field: &'a str,
    pub summary: &'a Json,
}

pub trait Retriever: Send + Sync {
    fn retrieve(&self, claim_text: &str, top_k: usize, metadata: Option<&RetrieveMetadata>) -> Vec<EvidenceSpan>;
}

/// Stubbable embedding handle (architecture §5, §9 "acquire handle").
/// Production deployments back this with a real sentence-embedding model;
/// the hash-based stub here is deterministic and model-free, suitable for
/// tests and for exercising the pipeline without a real model loaded.
pub trait EmbeddingService: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f64>;
}

const EMBEDDING_DIMS: usize = 64;

pub struct HashEmbeddingService;

impl EmbeddingService for HashEmbeddingService {
    fn embed(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0_f64; EMBEDDING_DIMS];
        for token in schema::tokenize(text) {
            let bucket = fnv1a(&token) as usize % EMBEDDING_DIMS;
            vector[bucket] += 1.0;
        }
        vector
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\w+\b").unwrap())
}

/// `\b\w+\b` tokenization, lowercased — architecture §4.3 term-based
/// retriever contract, distinct from [`schema::tokenize`]'s punctuation
/// stripping.
pub fn regex_tokenize(text: &str) -> Vec<String> {
    word_re()
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// BM25 retriever
// ---------------------------------------------------------------------------

pub struct Bm25Config {
    pub chunk_size: usize,
    pub overlap: usize,
    pub context_window: usize,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Bm25Config {
            chunk_size: 200,
            overlap: 50,
            context_window: 150,
        }
    }
}

pub struct Bm25Retriever {
    transcript: Vec<char>,
    chunks: Vec<String>,
    chunk_positions: Vec<usize>,
    chunk_tokens: Vec<Vec<String>>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f64,
    context_window: usize,
}

impl Bm25Retriever {
    pub fn new(transcript: &str, config: Bm25Config) -> Self {
        let transcript_chars: Vec<char> = transcript.chars().collect();
        let mut chunks = Vec::new();
        let mut chunk_positions = Vec::new();

        let step = config.chunk_size.saturating_sub(config.overlap).max(1);
        let mut pos = 0usize;
        while pos < transcript_chars.len() {
            let chunk_end = (pos + config.chunk_size).min(transcript_chars.len());
            let chunk_text: String = transcript_chars[pos..chunk_end].iter().collect();
            let trimmed = chunk_text.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
                chunk_positions.push(pos);
            }
            pos += step;
            if chunk_end >= transcript_chars.len() {
                break;
            }
        }

        let chunk_tokens: Vec<Vec<String>> = chunks.iter().map(|c| regex_tokenize(c)).collect();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in &chunk_tokens {
            let unique: HashSet<&String> = tokens.iter().collect();
            for token in unique {
                *doc_freq.entry(token.clone()).or_insert(0) += 1;
            }
        }
        let avg_doc_len = if chunk_tokens.is_empty() {
            0.0
        } else {
            chunk_tokens.iter().map(|t| t.len()).sum::<usize>() as f64 / chunk_tokens.len() as f64
        };

        Bm25Retriever {
            transcript: transcript_chars,
            chunks,
            chunk_positions,
            chunk_tokens,
            doc_freq,
            avg_doc_len,
            context_window: config.context_window,
        }
    }
}

impl Retriever for Bm25Retriever {
    fn retrieve(&self, claim_text: &str, top_k: usize, _metadata: Option<&RetrieveMetadata>) -> Vec<EvidenceSpan> {
        if self.chunks.is_empty() || claim_text.trim().is_empty() {
            return vec![];
        }

        let query_tokens = regex_tokenize(claim_text);
        let mut scored: Vec<(usize, f64)> = self
            .chunk_tokens
            .iter()
            .enumerate()
            .map(|(i, tokens)| {
                let score = bm25_score(&query_tokens, tokens, &self.doc_freq, self.chunks.len(), self.avg_doc_len);
                (i, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut spans = Vec::new();
        for (idx, raw_score) in scored.into_iter().take(top_k) {
            if raw_score < 0.1 {
                continue;
            }
            let chunk_pos = self.chunk_positions[idx];
            let chunk_len = self.chunks[idx].chars().count();
            let start_idx = chunk_pos.saturating_sub(self.context_window);
            let end_idx = (chunk_pos + chunk_len + self.context_window).min(self.transcript.len());
            let span_text: String = self.transcript[start_idx..end_idx].iter().collect();
            let normalized_score = (raw_score / 10.0).min(1.0);
            spans.push(EvidenceSpan {
                text: span_text.trim().to_string(),
                start_idx,
                end_idx,
                score: normalized_score,
            });
        }
        spans
    }
}

// ---------------------------------------------------------------------------
// Semantic retriever
// ---------------------------------------------------------------------------

pub struct SemanticRetriever {
    sentences: Vec<String>,
    sentence_positions: Vec<usize>,
    embeddings: Vec<Vec<f64>>,
    embedder: Box<dyn EmbeddingService>,
    contextualize: bool,
    claim_prefixes: HashMap<String, String>,
}

impl SemanticRetriever {
    pub fn new(transcript: &str, contextualize: bool, claim_prefixes: HashMap<String, String>) -> Self {
        Self::with_embedder(transcript, contextualize, claim_prefixes, Box::new(HashEmbeddingService))
    }

    pub fn with_embedder(
        transcript: &str,
        contextualize: bool,
        claim_prefixes: HashMap<String, String>,
        embedder: Box<dyn EmbeddingService>,
    ) -> Self {
        let transcript_chars: Vec<char> = transcript.chars().collect();
        let mut sentences = Vec::new();
        let mut sentence_positions = Vec::new();

        for raw_sentence in extraction_split(transcript) {
            if raw_sentence.chars().count() < 10 {
                continue;
            }
            if let Some(pos) = find_char_pos(&transcript_chars, &raw_sentence) {
                sentences.push(raw_sentence);
                sentence_positions.push(pos);
            }
        }

        let embeddings = sentences.iter().map(|s| embedder.embed(s)).collect();

        SemanticRetriever {
            sentences,
            sentence_positions,
            embeddings,
            embedder,
            contextualize,
            claim_prefixes,
        }
    }
}

/// Sentence segmentation with no overlap, skipping very short fragments.
/// Equivalent to the lookaround pattern `(?<=[.!?])\s+(?=[A-Z\n])`.
fn extraction_split(text: &str) -> Vec<String> {
    // Reuses the same regex-free algorithm as the claim extractor's
    // sentence splitter; duplicated here to keep this crate free of a
    // dependency on `extraction` for one helper.
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < chars.len() {
        if matches!(chars[i], '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j], '.' | '!' | '?') {
                j += 1;
            }
            let mut k = j;
            while k < chars.len() && chars[k].is_whitespace() {
                k += 1;
            }
            if k < chars.len() && (chars[k].is_uppercase() || chars[k] == '\n') {
                sentences.push(chars[start..j].iter().collect::<String>());
                start = k;
                i = k;
                continue;
            } else if k == chars.len() {
                sentences.push(chars[start..j].iter().collect::<String>());
                start = j;
                i = j;
                continue;
            }
            i = j;
            continue;
        }
        i += 1;
    }
    if start < chars.len() {
        sentences.push(chars[start..].iter().collect::<String>());
    }
    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn find_char_pos(haystack: &[char], needle: &str) -> Option<usize> {
    let needle_chars: Vec<char> = needle.chars().collect();
    if needle_chars.is_empty() || needle_chars.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle_chars.len())
        .position(|window| window == needle_chars.as_slice())
}

impl Retriever for SemanticRetriever {
    fn retrieve(&self, claim_text: &str, top_k: usize, metadata: Option<&RetrieveMetadata>) -> Vec<EvidenceSpan> {
        if self.sentences.is_empty() {
            return vec![];
        }

        let query = if self.contextualize {
            match metadata.and_then(|m| self.claim_prefixes.get(m.field)) {
                Some(prefix) => format!("{prefix}{claim_text}"),
                None => claim_text.to_string(),
            }
        } else {
            claim_text.to_string()
        };

        let claim_embedding = self.embedder.embed(&query);
        let mut scored: Vec<(usize, f64)> = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, emb)| (i, cosine_similarity(&claim_embedding, emb)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| {
                let pos = self.sentence_positions[i];
                let text = self.sentences[i].clone();
                let len = text.chars().count();
                EvidenceSpan {
                    text,
                    start_idx: pos,
                    end_idx: pos + len,
                    score,
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Context-aware wrapper
// ---------------------------------------------------------------------------

pub struct FieldRelationship {
    pub context_fields: Vec<String>,
}

pub struct ContextAwareRetriever {
    inner: Box<dyn Retriever>,
    terse_threshold: usize,
    max_context_length: usize,
    field_relationships: HashMap<String, FieldRelationship>,
}

impl ContextAwareRetriever {
    pub fn new(
        inner: Box<dyn Retriever>,
        terse_threshold: usize,
        max_context_length: usize,
        field_relationships: HashMap<String, FieldRelationship>,
    ) -> Self {
        ContextAwareRetriever {
            inner,
            terse_threshold,
            max_context_length,
            field_relationships,
        }
    }

    fn expand_query(&self, claim_text: &str, metadata: Option<&RetrieveMetadata>) -> String {
        let word_count = claim_text.split_whitespace().count();
        if word_count > self.terse_threshold {
            return claim_text.to_string();
        }
        let Some(metadata) = metadata else {
            return claim_text.to_string();
        };
        let Some(relationship) = self.field_relationships.get(metadata.field) else {
            return claim_text.to_string();
        };
        let Some(summary_obj) = metadata.summary.as_object() else {
            return claim_text.to_string();
        };

        let mut parts = Vec::new();
        for context_field in &relationship.context_fields {
            if let Some(value) = summary_obj.get(context_field).and_then(|v| v.as_str()) {
                if !value.is_empty() {
                    let truncated: String = value.chars().take(self.max_context_length).collect();
                    parts.push(truncated);
                }
            }
        }
        if parts.is_empty() {
            claim_text.to_string()
        } else {
            format!("{claim_text}. {}", parts.join(" "))
        }
    }
}

impl Retriever for ContextAwareRetriever {
    fn retrieve(&self, claim_text: &str, top_k: usize, metadata: Option<&RetrieveMetadata>) -> Vec<EvidenceSpan> {
        let expanded = self.expand_query(claim_text, metadata);
        self.inner.retrieve(&expanded, top_k, metadata)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type RetrieverFactory = Box<dyn Fn(&str, &Json) -> Box<dyn Retriever> + Send + Sync>;

#[derive(Default)]
pub struct RetrieverRegistry {
    factories: HashMap<String, RetrieverFactory>,
}

impl RetrieverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, factory: RetrieverFactory) -> Result<(), PipelineError> {
        if self.factories.contains_key(name) {
            return Err(PipelineError::DuplicatePlugin(name.to_string(), "retriever"));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn create(&self, name: &str, transcript: &str, config: &Json) -> Result<Box<dyn Retriever>, PipelineError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PipelineError::UnknownPlugin(name.to_string(), "retriever"))?;
        Ok(factory(transcript, config))
    }

    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

fn usize_config(config: &Json, key: &str, default: usize) -> usize {
    config.get(key).and_then(|v| v.as_u64()).map(|v| v as usize).unwrap_or(default)
}

/// Registry pre-populated with `bm25`, `semantic`, and `context_aware_bm25`.
pub fn default_registry() -> RetrieverRegistry {
    let mut registry = RetrieverRegistry::new();
    registry
        .register(
            "bm25",
            Box::new(|transcript, config| {
                let cfg = Bm25Config {
                    chunk_size: usize_config(config, "chunk_size", 200),
                    overlap: usize_config(config, "overlap", 50),
                    context_window: usize_config(config, "context_window", 150),
                };
                Box::new(Bm25Retriever::new(transcript, cfg))
            }),
        )
        .expect("static registration");
    registry
        .register(
            "semantic",
            Box::new(|transcript, config| {
                let contextualize = config
                    .get("contextualize_claims")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                let prefixes = config
                    .get("claim_prefixes")
                    .and_then(|v| v.as_object())
                    .map(|m| {
                        m.iter()
                            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                Box::new(SemanticRetriever::new(transcript, contextualize, prefixes))
            }),
        )
        .expect("static registration");
    registry
        .register(
            "context_aware_bm25",
            Box::new(|transcript, config| {
                let cfg = Bm25Config {
                    chunk_size: usize_config(config, "chunk_size", 200),
                    overlap: usize_config(config, "overlap", 50),
                    context_window: usize_config(config, "context_window", 150),
                };
                let inner = Box::new(Bm25Retriever::new(transcript, cfg));
                let expansion = config.get("context_expansion");
                let terse_threshold = expansion
                    .and_then(|e| e.get("terse_threshold"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(3) as usize;
                let max_context_length = expansion
                    .and_then(|e| e.get("max_context_length"))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(200) as usize;
                let field_relationships = expansion
                    .and_then(|e| e.get("field_relationships"))
                    .and_then(|v| v.as_object())
                    .map(|m| {
                        m.iter()
                            .filter_map(|(field, relationship)| {
                                let context_fields = relationship
                                    .get("context_fields")?
                                    .as_array()?
                                    .iter()
                                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                                    .collect();
                                Some((field.clone(), FieldRelationship { context_fields }))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Box::new(ContextAwareRetriever::new(
                    inner,
                    terse_threshold,
                    max_context_length,
                    field_relationships,
                ))
            }),
        )
        .expect("static registration");
    registry
}
