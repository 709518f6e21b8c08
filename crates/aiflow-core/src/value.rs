use std::collections::HashMap;

/// Dynamic value type for variables, node config and node outputs.
pub type Value = serde_json::Value;

/// Flat name to value mapping used for variables, config and outputs.
pub type ValueMap = HashMap<String, Value>;

/// Convenience accessors on top of `serde_json::Value`.
pub trait ValueExt {
    /// Render the value for substitution into a text template.
    ///
    /// Strings are inserted verbatim, `null` becomes empty, everything else
    /// is rendered as compact JSON.
    fn to_template_string(&self) -> String;

    /// Interpret the value as a list of ids: an array of scalars or a single
    /// non-empty string.
    fn as_id_list(&self) -> Vec<String>;
}

impl ValueExt for Value {
    fn to_template_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn as_id_list(&self) -> Vec<String> {
        match self {
            Value::Array(items) => items
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| v.to_template_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Value::String(s) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// Read a string entry from a map, if present and a string.
pub fn get_str<'a>(map: &'a ValueMap, key: &str) -> Option<&'a str> {
    map.get(key).and_then(|v| v.as_str())
}

/// Read a numeric entry from a map, accepting numbers and numeric strings.
pub fn get_f64(map: &ValueMap, key: &str) -> Option<f64> {
    match map.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn template_string_rendering() {
        assert_eq!(json!("hi").to_template_string(), "hi");
        assert_eq!(Value::Null.to_template_string(), "");
        assert_eq!(json!(3).to_template_string(), "3");
        assert_eq!(json!({"a": 1}).to_template_string(), r#"{"a":1}"#);
    }

    #[test]
    fn id_list_accepts_array_or_single_string() {
        assert_eq!(json!(["a", "b"]).as_id_list(), vec!["a", "b"]);
        assert_eq!(json!("kb-1").as_id_list(), vec!["kb-1"]);
        assert!(json!("").as_id_list().is_empty());
        assert!(json!(5).as_id_list().is_empty());
    }

    #[test]
    fn numeric_lookup_tolerates_strings() {
        let mut map = ValueMap::new();
        map.insert("topK".into(), json!(3));
        map.insert("threshold".into(), json!("0.5"));
        assert_eq!(get_f64(&map, "topK"), Some(3.0));
        assert_eq!(get_f64(&map, "threshold"), Some(0.5));
        assert_eq!(get_f64(&map, "missing"), None);
    }
}
