//! Nested JSON documents, flattened into `a_b_0_c` style keys.

use super::RawPair;
use crate::Result;
use serde_json::Value;

/// Parse `text` and emit one pair per scalar leaf, in document order.
///
/// Keys are the path segments joined with `_` (array elements use their
/// index). Strings are emitted as-is, numbers as their literal, booleans as
/// `true`/`false` and null as `null`. Empty objects and arrays emit nothing.
pub fn flatten(text: &str) -> Result<Vec<RawPair>> {
    let root: Value = serde_json::from_str(text)?;
    let mut pairs = Vec::new();
    let mut path = Vec::new();
    walk(&root, &mut path, &mut pairs);
    Ok(pairs)
}

fn walk(value: &Value, path: &mut Vec<String>, out: &mut Vec<RawPair>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                path.push(key.clone());
                walk(child, path, out);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(index.to_string());
                walk(child, path, out);
                path.pop();
            }
        }
        scalar => out.push(RawPair::new(
            path.join("_"),
            scalar_to_string(scalar),
            format!("$.{}", path.join(".")),
        )),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        // Containers are walked, never stringified
        Value::Object(_) | Value::Array(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SopsEnvError;

    fn flat(text: &str) -> Vec<(String, String)> {
        flatten(text)
            .unwrap()
            .into_iter()
            .map(|pair| (pair.key, pair.value))
            .collect()
    }

    #[test]
    fn test_nested_objects() {
        assert_eq!(
            flat(r#"{"api":{"key":"k"},"features":{"enabled":true}}"#),
            vec![
                ("api_key".to_string(), "k".to_string()),
                ("features_enabled".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_scalars_and_arrays() {
        assert_eq!(
            flat(r#"{"port":5432,"ratio":0.5,"off":false,"none":null,"hosts":["a","b"],"empty":{},"list":[]}"#),
            vec![
                ("port".to_string(), "5432".to_string()),
                ("ratio".to_string(), "0.5".to_string()),
                ("off".to_string(), "false".to_string()),
                ("none".to_string(), "null".to_string()),
                ("hosts_0".to_string(), "a".to_string()),
                ("hosts_1".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_document_order_is_kept() {
        let keys: Vec<String> = flat(r#"{"zeta":"1","alpha":"2","mid":{"b":"3","a":"4"}}"#)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid_b", "mid_a"]);
    }

    #[test]
    fn test_sources_are_json_paths() {
        let pairs = flatten(r#"{"db":{"hosts":["x"]}}"#).unwrap();
        assert_eq!(pairs[0].source, "$.db.hosts.0");
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(flatten("{not json"), Err(SopsEnvError::Json(_))));
    }
}
