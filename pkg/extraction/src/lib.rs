//! Turns resolved document field values into atomic `Claim`s, per a
//! schema-declared extraction method. No ML dependency: compound-claim
//! splitting uses a small stubbable verb-presence heuristic rather than a
//! real part-of-speech tagger (architecture §4.2, §9 "acquire handle").

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use schema::{Claim, ExtractionMethod, FieldSchema, Schema};
use serde_json::Value as Json;

/// A stubbable part-of-speech oracle used only to decide whether a clause
/// "contains a verb" when splitting compound claims. Production code gets a
/// real tagger; tests inject a fixed-answer stub.
pub trait PosTagger: Send + Sync {
    fn contains_verb(&self, clause: &str) -> bool;
}

/// Heuristic fallback: a closed list of common verbs plus `-ing`/`-ed`
/// suffix matching. Good enough to gate compound-claim splitting without a
/// real tagger; never a substitute for one in a system that has one.
pub struct HeuristicPosTagger;

const COMMON_VERBS: &[&str] = &[
    "is", "was", "were", "are", "am", "be", "been", "has", "have", "had",
    "did", "does", "do", "gave", "took", "hired", "promoted", "reported",
    "reports", "denies", "denied", "fell", "administered", "says", "said",
    "gives", "takes", "launched", "opened", "closed", "acquired", "grew",
    "fell", "rose", "complains", "complained", "presents", "presented",
    "states", "stated", "notes", "noted", "shows", "showed",
];

fn looks_like_verb(word: &str) -> bool {
    let cleaned: String = word
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if cleaned.is_empty() {
        return false;
    }
    if COMMON_VERBS.contains(&cleaned.as_str()) {
        return true;
    }
    (cleaned.ends_with("ing") || cleaned.ends_with("ed")) && cleaned.len() > 3
}

impl PosTagger for HeuristicPosTagger {
    fn contains_verb(&self, clause: &str) -> bool {
        clause.split_whitespace().any(looks_like_verb)
    }
}

/// Extract claims from `document` using the default heuristic tagger.
pub fn extract_claims(document: &Json, schema: &Schema) -> Vec<Claim> {
    extract_claims_with_tagger(document, schema, &HeuristicPosTagger)
}

pub fn extract_claims_with_tagger(
    document: &Json,
    schema: &Schema,
    tagger: &dyn PosTagger,
) -> Vec<Claim> {
    let mut claims = Vec::new();
    for (field_name, field_config) in &schema.fields {
        if field_config.extraction_method == ExtractionMethod::Skip {
            continue;
        }
        let Some(text) = resolve_field_value(document, field_config, field_name) else {
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }
        claims.extend(extract_by_method(&text, field_name, field_config, tagger));
    }
    claims
}

fn resolve_field_value(document: &Json, field_config: &FieldSchema, field_name: &str) -> Option<String> {
    let value = if let Some(path) = &field_config.path {
        let mut all_paths = vec![path.clone()];
        all_paths.extend(field_config.fallback_paths.iter().cloned());
        pathresolve::resolve_with_fallbacks(document, &all_paths, &Json::Null)
    } else {
        document
            .as_object()
            .and_then(|m| m.get(field_name))
            .cloned()
            .unwrap_or(Json::Null)
    };
    value.as_str().map(|s| s.to_string())
}

fn make_claim(field: &str, text: &str, metadata: Vec<(&str, Json)>) -> Claim {
    let mut map = BTreeMap::new();
    for (k, v) in metadata {
        map.insert(k.to_string(), v);
    }
    Claim {
        field: field.to_string(),
        text: text.trim().to_string(),
        metadata: map,
    }
}

fn bullet_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n-\s*").unwrap())
}

fn conjunction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s+(?:and|but|or)\s+").unwrap())
}

fn has_bullet_format(text: &str) -> bool {
    text.contains("\n-") || text.trim_start().starts_with('-')
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

fn extract_by_method(
    field_value: &str,
    field_name: &str,
    config: &FieldSchema,
    tagger: &dyn PosTagger,
) -> Vec<Claim> {
    match config.extraction_method {
        ExtractionMethod::SingleValue => {
            if config.split_compound_claims {
                let min_len = config.min_claim_length.unwrap_or(5);
                let sub_texts = split_compound_claims(field_value, min_len, tagger);
                let compound_split = sub_texts.len() > 1;
                sub_texts
                    .into_iter()
                    .map(|t| {
                        make_claim(
                            field_name,
                            &t,
                            vec![
                                ("extraction_method", Json::String("single_value".into())),
                                ("compound_split", Json::Bool(compound_split)),
                            ],
                        )
                    })
                    .collect()
            } else {
                vec![make_claim(
                    field_name,
                    field_value,
                    vec![("extraction_method", Json::String("single_value".into()))],
                )]
            }
        }
        ExtractionMethod::Delimited => {
            let delimiter = config.delimiter.clone().unwrap_or_else(|| ",".to_string());
            let parts: Vec<&str> = field_value.split(delimiter.as_str()).collect();
            if parts.len() > 1 {
                parts
                    .into_iter()
                    .filter_map(|p| {
                        let t = p.trim();
                        if t.is_empty() {
                            None
                        } else {
                            Some(make_claim(
                                field_name,
                                t,
                                vec![
                                    ("extraction_method", Json::String("delimited".into())),
                                    ("delimiter", Json::String(delimiter.clone())),
                                ],
                            ))
                        }
                    })
                    .collect()
            } else {
                vec![make_claim(
                    field_name,
                    field_value,
                    vec![
                        ("extraction_method", Json::String("delimited_fallback".into())),
                        ("fallback", Json::String("single_value".into())),
                    ],
                )]
            }
        }
        ExtractionMethod::BulletList => {
            let delimiter = config
                .delimiter
                .clone()
                .unwrap_or_else(|| "\n-".to_string());
            if has_bullet_format(field_value) {
                bullet_split_re()
                    .split(field_value)
                    .filter_map(|p| {
                        let t = p.trim().trim_start_matches(['-', ' ']).trim();
                        if t.is_empty() {
                            None
                        } else {
                            Some(make_claim(
                                field_name,
                                t,
                                vec![
                                    ("extraction_method", Json::String("bullet_list".into())),
                                    ("delimiter", Json::String(delimiter.clone())),
                                ],
                            ))
                        }
                    })
                    .collect()
            } else {
                vec![make_claim(
                    field_name,
                    field_value,
                    vec![
                        (
                            "extraction_method",
                            Json::String("bullet_list_fallback".into()),
                        ),
                        ("fallback", Json::String("single_value".into())),
                        (
                            "format_warning",
                            Json::String("Expected bullet list, found plain text".into()),
                        ),
                    ],
                )]
            }
        }
        ExtractionMethod::Structured => {
            let Some(pattern) = &config.pattern else {
                return vec![make_claim(
                    field_name,
                    field_value,
                    vec![(
                        "extraction_method",
                        Json::String("structured_no_pattern".into()),
                    )],
                )];
            };
            match Regex::new(pattern).ok().and_then(|re| re.captures(field_value).map(|c| (re, c))) {
                Some((_re, caps)) => {
                    let text = if caps.len() > 1 {
                        (1..caps.len())
                            .filter_map(|i| caps.get(i).map(|m| m.as_str()))
                            .collect::<Vec<_>>()
                            .join(" ")
                    } else {
                        caps.get(0).map(|m| m.as_str()).unwrap_or("").to_string()
                    };
                    vec![make_claim(
                        field_name,
                        &text,
                        vec![
                            ("extraction_method", Json::String("structured".into())),
                            ("pattern", Json::String(pattern.clone())),
                        ],
                    )]
                }
                None => vec![make_claim(
                    field_name,
                    field_value,
                    vec![
                        (
                            "extraction_method",
                            Json::String("structured_fallback".into()),
                        ),
                        ("pattern_failed", Json::Bool(true)),
                    ],
                )],
            }
        }
        ExtractionMethod::SentenceSplit => {
            let sentences = split_into_sentences(field_value);
            let mut out = Vec::new();
            for sentence in sentences {
                if sentence.trim().is_empty() {
                    continue;
                }
                if config.split_compound_claims {
                    let min_len = config.min_claim_length.unwrap_or(5);
                    let sub_texts = split_compound_claims(&sentence, min_len, tagger);
                    let compound_split = sub_texts.len() > 1;
                    for t in sub_texts {
                        out.push(make_claim(
                            field_name,
                            &t,
                            vec![
                                ("extraction_method", Json::String("sentence_split".into())),
                                ("compound_split", Json::Bool(compound_split)),
                            ],
                        ));
                    }
                } else {
                    out.push(make_claim(
                        field_name,
                        &sentence,
                        vec![("extraction_method", Json::String("sentence_split".into()))],
                    ));
                }
            }
            out
        }
        ExtractionMethod::Skip => vec![],
    }
}

/// Regex fallback for sentence segmentation: split after `[.!?]` when
/// followed by whitespace and an uppercase letter, or at end of string.
/// (Equivalent to the lookaround pattern
/// `(?<=[.!?])\s+(?=[A-Z])|(?<=[.!?])$`, which the `regex` crate cannot
/// express directly since it forbids lookaround.)
pub fn split_into_sentences(text: &str) -> Vec<String> {
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
            if k == chars.len() {
                sentences.push(chars[start..j].iter().collect::<String>());
                start = j;
                i = j;
                continue;
            } else if k > j && chars[k].is_uppercase() {
                sentences.push(chars[start..j].iter().collect::<String>());
                start = k;
                i = k;
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

/// Split at coordinating-conjunction boundaries only when every resulting
/// side is an independent clause: contains a verb and has at least
/// `min_claim_length` words. If any side fails, the original text is
/// returned unsplit.
pub fn split_compound_claims(text: &str, min_claim_length: usize, tagger: &dyn PosTagger) -> Vec<String> {
    let matches: Vec<_> = conjunction_re().find_iter(text).collect();
    if matches.is_empty() {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    for m in &matches {
        pieces.push(text[start..m.start()].trim().to_string());
        start = m.end();
    }
    pieces.push(text[start..].trim().to_string());

    let all_valid = pieces
        .iter()
        .all(|p| !p.is_empty() && word_count(p) >= min_claim_length && tagger.contains_verb(p));

    if all_valid && pieces.len() > 1 {
        pieces
    } else {
        vec![text.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::FieldSchema;
    use serde_json::json;

    fn field(method: ExtractionMethod) -> FieldSchema {
        FieldSchema {
            path: None,
            fallback_paths: vec![],
            extraction_method: method,
            delimiter: None,
            pattern: None,
            split_compound_claims: false,
            min_claim_length: None,
            required: false,
            criticality: None,
        }
    }

    #[test]
    fn single_value_yields_one_claim() {
        let doc = json!({"chief_complaint": "Chest pain for 2 days"});
        let mut schema = Schema::default();
        schema
            .fields
            .insert("chief_complaint".to_string(), field(ExtractionMethod::SingleValue));
        let claims = extract_claims(&doc, &schema);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].text, "Chest pain for 2 days");
    }

    #[test]
    fn skip_method_produces_no_claims() {
        let doc = json!({"notes": "irrelevant"});
        let mut schema = Schema::default();
        schema
            .fields
            .insert("notes".to_string(), field(ExtractionMethod::Skip));
        assert!(extract_claims(&doc, &schema).is_empty());
    }

    #[test]
    fn empty_field_produces_no_claim() {
        let doc = json!({"chief_complaint": "   "});
        let mut schema = Schema::default();
        schema
            .fields
            .insert("chief_complaint".to_string(), field(ExtractionMethod::SingleValue));
        assert!(extract_claims(&doc, &schema).is_empty());
    }

    #[test]
    fn delimited_splits_on_literal_delimiter() {
        let mut f = field(ExtractionMethod::Delimited);
        f.delimiter = Some(",".to_string());
        let claims = extract_by_method("aspirin, tylenol, ibuprofen", "medications", &f, &HeuristicPosTagger);
        assert_eq!(claims.len(), 3);
        assert_eq!(claims[1].text, "tylenol");
    }

    #[test]
    fn delimited_falls_back_to_single_value_when_absent() {
        let mut f = field(ExtractionMethod::Delimited);
        f.delimiter = Some(";".to_string());
        let claims = extract_by_method("aspirin only", "medications", &f, &HeuristicPosTagger);
        assert_eq!(claims.len(), 1);
        assert_eq!(
            claims[0].metadata.get("extraction_method").unwrap(),
            "delimited_fallback"
        );
    }

    #[test]
    fn bullet_list_splits_on_dash_newlines() {
        let f = field(ExtractionMethod::BulletList);
        let text = "History:\n- denies fever\n- reports cough";
        let claims = extract_by_method(text, "history", &f, &HeuristicPosTagger);
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].text, "denies fever");
    }

    #[test]
    fn structured_falls_back_when_pattern_does_not_match() {
        let mut f = field(ExtractionMethod::Structured);
        f.pattern = Some(r"\d{3}-\d{4}".to_string());
        let claims = extract_by_method("no identifiers here", "id", &f, &HeuristicPosTagger);
        assert_eq!(claims.len(), 1);
        assert_eq!(
            claims[0].metadata.get("pattern_failed").unwrap(),
            &json!(true)
        );
    }

    #[test]
    fn sentence_split_segments_on_terminal_punctuation() {
        let f = field(ExtractionMethod::SentenceSplit);
        let text = "Patient denies chest pain. Patient reports mild cough.";
        let claims = extract_by_method(text, "hpi", &f, &HeuristicPosTagger);
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[1].text, "Patient reports mild cough.");
    }

    #[test]
    fn compound_split_requires_verb_on_both_sides() {
        let result = split_compound_claims("hired 30 employees and promoted 5 managers", 3, &HeuristicPosTagger);
        assert_eq!(result, vec!["hired 30 employees", "promoted 5 managers"]);
    }

    #[test]
    fn compound_split_refuses_when_one_side_too_short() {
        let result = split_compound_claims("bread and butter", 2, &HeuristicPosTagger);
        assert_eq!(result, vec!["bread and butter"]);
    }

    #[test]
    fn split_into_sentences_handles_trailing_sentence_without_space() {
        let sentences = split_into_sentences("One thing happened. Another thing happened.");
        assert_eq!(sentences.len(), 2);
    }
}
