use serde_json::{Map, Value};

/// Merges `addition` into `result`
///
/// # Merge Rules
///
/// - Nested objects are merged recursively (created when absent)
/// - Arrays are concatenated onto the existing array (created when absent)
/// - Anything else overwrites the existing value
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use sumi_harvest::merge_data;
///
/// let mut result = json!({"a": [1]}).as_object().unwrap().clone();
/// let addition = json!({"a": [2], "b": {"x": 1}}).as_object().unwrap().clone();
/// merge_data(&mut result, addition);
/// assert_eq!(serde_json::Value::Object(result), json!({"a": [1, 2], "b": {"x": 1}}));
/// ```
pub fn merge_data(result: &mut Map<String, Value>, addition: Map<String, Value>) {
    for (key, value) in addition {
        match value {
            Value::Object(nested) => {
                let entry = result
                    .entry(key)
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(target) = entry {
                    merge_data(target, nested);
                }
            }
            Value::Array(items) => {
                let entry = result
                    .entry(key)
                    .or_insert_with(|| Value::Array(Vec::new()));
                match entry {
                    Value::Array(existing) => existing.extend(items),
                    other => *other = Value::Array(items),
                }
            }
            scalar => {
                result.insert(key, scalar);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_merge_concat_recurse_overwrite() {
        let mut result = object(json!({"a": [1]}));
        merge_data(&mut result, object(json!({"a": [2], "b": {"x": 1}})));
        assert_eq!(Value::Object(result), json!({"a": [1, 2], "b": {"x": 1}}));
    }

    #[test]
    fn test_merge_scalar_overwrites() {
        let mut result = object(json!({"s": "old", "n": 1}));
        merge_data(&mut result, object(json!({"s": "new"})));
        assert_eq!(Value::Object(result), json!({"s": "new", "n": 1}));
    }

    #[test]
    fn test_merge_nested_deeply() {
        let mut result = object(json!({"content": {"title": ["A"], "meta": {"tags": ["x"]}}}));
        merge_data(
            &mut result,
            object(json!({"content": {"title": ["B"], "meta": {"tags": ["y"], "lang": "en"}}})),
        );
        assert_eq!(
            Value::Object(result),
            json!({"content": {"title": ["A", "B"], "meta": {"tags": ["x", "y"], "lang": "en"}}})
        );
    }

    #[test]
    fn test_merge_into_empty() {
        let mut result = Map::new();
        merge_data(&mut result, object(json!({"a": [1], "b": {}})));
        assert_eq!(Value::Object(result), json!({"a": [1], "b": {}}));
    }
}
