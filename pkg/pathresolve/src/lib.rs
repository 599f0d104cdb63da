//! Path resolution over nested JSON-shaped documents: dot notation, array
//! indexing, wildcards, and an equality-query shorthand, with ordered
//! fallback paths. Pure; never panics.

use regex::Regex;
use serde_json::Value as Json;
use std::sync::OnceLock;

/// A single step of a parsed path, per the redesign note favoring an
/// explicit AST over a mega-regex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
    Query(String, String),
}

fn query_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^\[]+)\[\?([^=]+)='([^']*)'\]\.?(.*)$").unwrap())
}

fn bracket_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.\[\]]").unwrap())
}

/// `get(data, path, default)` — pure, never throws; type mismatches return
/// `default`. See architecture §4.1.
pub fn get(data: &Json, path: &str, default: &Json) -> Json {
    if path.is_empty() {
        return default.clone();
    }
    if path == "." {
        return data.clone();
    }
    if data.is_string() {
        // Only the root path can address raw string data.
        return default.clone();
    }
    if !data.is_object() {
        return default.clone();
    }
    if !path.contains('[') {
        let keys: Vec<&str> = path.split('.').collect();
        return get_nested(data, &keys, default);
    }
    if path.contains("[?") {
        return get_with_query(data, path, default);
    }
    get_with_arrays(data, path, default)
}

fn get_nested(data: &Json, keys: &[&str], default: &Json) -> Json {
    let mut current = data;
    for key in keys {
        match current.as_object().and_then(|m| m.get(*key)) {
            Some(v) => current = v,
            None => return default.clone(),
        }
    }
    current.clone()
}

/// Parse a bracketed path (`"sections[0].value"`, `"items[*].name"`) into
/// an explicit segment list rather than re-splitting ad hoc at each step.
fn parse_array_segments(path: &str) -> Vec<Segment> {
    bracket_split_re()
        .split(path)
        .filter(|p| !p.is_empty())
        .map(|part| {
            if part.chars().all(|c| c.is_ascii_digit()) {
                Segment::Index(part.parse().unwrap_or(0))
            } else if part == "*" {
                Segment::Wildcard
            } else {
                Segment::Field(part.to_string())
            }
        })
        .collect()
}

fn get_with_arrays(data: &Json, path: &str, default: &Json) -> Json {
    let mut current = data.clone();
    for segment in parse_array_segments(path) {
        match segment {
            Segment::Index(idx) => match current.as_array().and_then(|a| a.get(idx)) {
                Some(v) => current = v.clone(),
                None => return default.clone(),
            },
            Segment::Wildcard => {
                return match current.as_array() {
                    Some(a) => Json::Array(a.clone()),
                    None => default.clone(),
                };
            }
            Segment::Field(key) => {
                if let Some(obj) = current.as_object() {
                    match obj.get(&key) {
                        Some(v) => current = v.clone(),
                        None => return default.clone(),
                    }
                } else if let Some(arr) = current.as_array() {
                    let collected: Vec<Json> = arr
                        .iter()
                        .filter_map(|item| item.as_object().and_then(|m| m.get(&key)).cloned())
                        .collect();
                    return if collected.is_empty() {
                        default.clone()
                    } else {
                        Json::Array(collected)
                    };
                } else {
                    return default.clone();
                }
            }
            Segment::Query(..) => return default.clone(),
        }
    }
    current
}

fn get_with_query(data: &Json, path: &str, default: &Json) -> Json {
    let caps = match query_re().captures(path) {
        Some(c) => c,
        None => return default.clone(),
    };
    let array_path = caps.get(1).unwrap().as_str();
    let match_field = caps.get(2).unwrap().as_str();
    let match_value = caps.get(3).unwrap().as_str().to_lowercase();
    let match_value = match_value.trim();
    let remaining = caps.get(4).map(|m| m.as_str()).unwrap_or("");

    let array = get(data, array_path, &Json::Array(vec![]));
    let array = match array.as_array() {
        Some(a) => a,
        None => return default.clone(),
    };

    for item in array {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let item_value = obj
            .get(match_field)
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if item_value.to_lowercase().trim() == match_value {
            return if remaining.is_empty() {
                item.clone()
            } else {
                get(item, remaining, default)
            };
        }
    }
    default.clone()
}

/// Try multiple paths in order; return the first resolved non-null,
/// non-empty-string value, else `default`.
pub fn resolve_with_fallbacks(data: &Json, paths: &[String], default: &Json) -> Json {
    for path in paths {
        let value = get(data, path, &Json::Null);
        if !value.is_null() && value != Json::String(String::new()) {
            return value;
        }
    }
    default.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_path_returns_data_unchanged() {
        let data = json!("raw text");
        assert_eq!(get(&data, ".", &Json::Null), json!("raw text"));
    }

    #[test]
    fn simple_dot_notation_resolves_nested_value() {
        let data = json!({"history": {"age": 56}});
        assert_eq!(get(&data, "history.age", &Json::Null), json!(56));
    }

    #[test]
    fn missing_path_returns_default() {
        let data = json!({"history": {"age": 56}});
        assert_eq!(get(&data, "history.missing", &json!("N/A")), json!("N/A"));
    }

    #[test]
    fn array_index_resolves_element_field() {
        let data = json!({"sections": [{"label": "Name", "value": "John"}]});
        assert_eq!(get(&data, "sections[0].value", &Json::Null), json!("John"));
    }

    #[test]
    fn wildcard_returns_whole_list() {
        let data = json!({"items": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(
            get(&data, "items[*]", &Json::Null),
            json!([{"name": "a"}, {"name": "b"}])
        );
    }

    #[test]
    fn wildcard_then_field_maps_across_list() {
        let data = json!({"medications": [{"name": "aspirin"}, {"name": "tylenol"}]});
        assert_eq!(
            get(&data, "medications[*].name", &Json::Null),
            json!(["aspirin", "tylenol"])
        );
    }

    #[test]
    fn query_syntax_finds_matching_item_case_insensitive() {
        let data = json!({"sections": [{"label": "Name", "value": "John"}]});
        assert_eq!(
            get(&data, "sections[?label='name'].value", &Json::Null),
            json!("John")
        );
    }

    #[test]
    fn query_syntax_with_no_match_returns_default() {
        let data = json!({"sections": [{"label": "Name", "value": "John"}]});
        assert_eq!(
            get(&data, "sections[?label='dob'].value", &json!("missing")),
            json!("missing")
        );
    }

    #[test]
    fn resolve_with_fallbacks_skips_empty_string_values() {
        let data = json!({"name": "", "alt_name": "John"});
        let paths = vec!["name".to_string(), "alt_name".to_string()];
        assert_eq!(
            resolve_with_fallbacks(&data, &paths, &Json::Null),
            json!("John")
        );
    }

    #[test]
    fn resolve_with_fallbacks_returns_default_when_none_found() {
        let data = json!({});
        let paths = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            resolve_with_fallbacks(&data, &paths, &json!("fallback")),
            json!("fallback")
        );
    }
}
