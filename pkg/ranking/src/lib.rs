//! Pure scoring primitives shared by retrievers, validators, and the
//! arbitration engine: BM25, lexical overlap, and Jaccard set overlap.

use std::collections::{HashMap, HashSet};

use schema::tokenize;

/// Fraction of query tokens that also occur in `text` (asymmetric: the
/// denominator is the query's token count, not the union).
pub fn lexical_overlap_score(query: &str, text: &str) -> f64 {
    let query_tokens: Vec<String> = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }

    let text_tokens: Vec<String> = tokenize(text);

    let mut hits = 0usize;
    for token in &query_tokens {
        if text_tokens.iter().any(|candidate| candidate == token) {
            hits += 1;
        }
    }
    hits as f64 / query_tokens.len() as f64
}

/// Symmetric Jaccard overlap of lowercased, whitespace-split tokens — used
/// by the arbitration engine's `check_lexical_overlap` conflict rule.
/// Deliberately simpler tokenization than [`lexical_overlap_score`]: no
/// punctuation stripping, matching the source's plain `.lower().split()`.
pub fn jaccard_overlap(a: &str, b: &str) -> f64 {
    let a_tokens: HashSet<String> = a.to_lowercase().split_whitespace().map(String::from).collect();
    let b_tokens: HashSet<String> = b.to_lowercase().split_whitespace().map(String::from).collect();
    if a_tokens.is_empty() && b_tokens.is_empty() {
        return 0.0;
    }
    let intersection = a_tokens.intersection(&b_tokens).count();
    let union = a_tokens.union(&b_tokens).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Classic Okapi BM25 (k1=1.2, b=0.75) over a single document's tokens
/// against a corpus-level document-frequency table. `query_tokens` must be
/// tokenized with the same tokenizer used to build `doc_tokens`/`doc_freq`,
/// or matching terms silently fail to line up.
pub fn bm25_score(
    query_tokens: &[String],
    doc_tokens: &[String],
    doc_freq: &HashMap<String, usize>,
    total_docs: usize,
    avg_doc_len: f64,
) -> f64 {
    if total_docs == 0 || doc_tokens.is_empty() || avg_doc_len <= f64::EPSILON || query_tokens.is_empty() {
        return 0.0;
    }

    let mut tf: HashMap<&str, usize> = HashMap::new();
    for token in doc_tokens {
        *tf.entry(token.as_str()).or_insert(0) += 1;
    }

    let k1 = 1.2_f64;
    let b = 0.75_f64;
    let doc_len = doc_tokens.len() as f64;

    let mut score = 0.0_f64;
    for token in query_tokens {
        let term_tf = tf.get(token.as_str()).copied().unwrap_or(0) as f64;
        if term_tf <= 0.0 {
            continue;
        }

        let df = doc_freq.get(token).copied().unwrap_or(0) as f64;
        let idf = (((total_docs as f64 - df + 0.5) / (df + 0.5)) + 1.0).ln();
        let denom = term_tf + k1 * (1.0 - b + b * (doc_len / avg_doc_len));
        score += idf * ((term_tf * (k1 + 1.0)) / denom.max(f64::EPSILON));
    }
    score.max(0.0)
}

/// Cosine similarity of two (not necessarily normalized) embedding vectors.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_score_is_higher_for_more_matching_terms() {
        let strong = lexical_overlap_score("company x acquired y", "Company X acquired Company Y");
        let weak = lexical_overlap_score("company x acquired y", "Company Z opened a store");
        assert!(strong > weak);
    }

    #[test]
    fn jaccard_overlap_matches_known_ratio() {
        let overlap = jaccard_overlap("patient has chest pain", "patient reports chest pain today");
        // intersection {patient, chest, pain} = 3, union = 6
        assert!((overlap - 0.5).abs() < 1e-9);
    }

    #[test]
    fn jaccard_overlap_is_symmetric() {
        let a = "a b c";
        let b = "b c d";
        assert_eq!(jaccard_overlap(a, b), jaccard_overlap(b, a));
    }

    #[test]
    fn bm25_scores_relevant_doc_higher() {
        let doc_a = tokenize("company x acquired company y");
        let doc_b = tokenize("weather forecast for tomorrow");
        let mut df = HashMap::new();
        df.insert("company".to_string(), 1);
        df.insert("acquired".to_string(), 1);
        df.insert("y".to_string(), 1);
        let query = tokenize("did company acquire y");

        let a = bm25_score(&query, &doc_a, &df, 2, 4.5);
        let b = bm25_score(&query, &doc_b, &df, 2, 4.5);
        assert!(a > b);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.2, 0.4, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }
}
