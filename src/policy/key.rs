//! Cache key composition.
//!
//! Keys are plain strings so they can double as persistence keys.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Separator between key components.
const KEY_SEPARATOR: char = ':';

/// Inputs to [`generate_cache_key`].
#[derive(Debug, Clone, Default)]
pub struct CacheKeyOptions<'a> {
    pub url: &'a str,
    pub method: &'a str,
    /// Query parameters or other request parameters
    pub params: Option<&'a Value>,
    pub body: Option<&'a Value>,
    pub headers: Option<&'a BTreeMap<String, String>>,
    /// Header names left out of the key, compared case-insensitively
    pub exclude_headers: &'a [String],
}

impl<'a> CacheKeyOptions<'a> {
    pub fn new(method: &'a str, url: &'a str) -> Self {
        Self {
            url,
            method,
            ..Self::default()
        }
    }

    pub fn params(mut self, params: &'a Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn body(mut self, body: &'a Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn headers(mut self, headers: &'a BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn exclude_headers(mut self, names: &'a [String]) -> Self {
        self.exclude_headers = names;
        self
    }
}

/// Builds a deterministic cache key.
///
/// Layout: `METHOD:url:params:body:headers`, where params and body are
/// canonical JSON and headers is the canonical JSON of the lowercased,
/// sorted, filtered header map. Absent components are empty.
pub fn generate_cache_key(options: &CacheKeyOptions<'_>) -> String {
    let params = options.params.map(canonical_json).unwrap_or_default();
    let body = options.body.map(canonical_json).unwrap_or_default();
    let headers = options
        .headers
        .map(|h| key_headers(h, options.exclude_headers))
        .filter(|h| !h.is_empty())
        .map(|h| canonical_json(&Value::Object(h)))
        .unwrap_or_default();

    let mut key = options.method.to_ascii_uppercase();
    for part in [options.url, params.as_str(), body.as_str(), headers.as_str()] {
        key.push(KEY_SEPARATOR);
        key.push_str(part);
    }
    key
}

/// Recursively sorts object keys; arrays keep element order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn key_headers(headers: &BTreeMap<String, String>, exclude: &[String]) -> Map<String, Value> {
    let mut kept: Vec<(String, &String)> = headers
        .iter()
        .filter(|(name, _)| !exclude.iter().any(|ex| ex.eq_ignore_ascii_case(name)))
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();
    kept.sort_by(|a, b| a.0.cmp(&b.0));

    kept.into_iter()
        .map(|(name, value)| (name, Value::String(value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_is_uppercased() {
        let key = generate_cache_key(&CacheKeyOptions::new("get", "/api/folders"));
        assert_eq!(key, "GET:/api/folders:::");
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":[3,{"q":1,"p":2}]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":[3,{"p":2,"q":1}],"y":2},"b":1}"#).unwrap();

        let key_a = generate_cache_key(&CacheKeyOptions::new("POST", "/u").body(&a));
        let key_b = generate_cache_key(&CacheKeyOptions::new("POST", "/u").body(&b));
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn test_array_order_matters() {
        let a = json!({"ids": [1, 2]});
        let b = json!({"ids": [2, 1]});

        let key_a = generate_cache_key(&CacheKeyOptions::new("GET", "/u").params(&a));
        let key_b = generate_cache_key(&CacheKeyOptions::new("GET", "/u").params(&b));
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_excluded_headers_case_insensitive() {
        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers.insert("X-Request-Id".to_string(), "abc".to_string());
        let exclude = vec!["x-request-id".to_string()];

        let key = generate_cache_key(
            &CacheKeyOptions::new("GET", "/u")
                .headers(&headers)
                .exclude_headers(&exclude),
        );
        assert_eq!(key, r#"GET:/u:::{"accept":"application/json"}"#);
    }

    #[test]
    fn test_header_values_distinguish_keys() {
        let mut en = BTreeMap::new();
        en.insert("accept-language".to_string(), "en".to_string());
        let mut fr = BTreeMap::new();
        fr.insert("accept-language".to_string(), "fr".to_string());

        assert_ne!(
            generate_cache_key(&CacheKeyOptions::new("GET", "/u").headers(&en)),
            generate_cache_key(&CacheKeyOptions::new("GET", "/u").headers(&fr)),
        );
    }

    #[test]
    fn test_canonicalize_primitives_pass_through() {
        assert_eq!(canonicalize(&json!(3)), json!(3));
        assert_eq!(canonicalize(&json!("s")), json!("s"));
        assert_eq!(canonicalize(&Value::Null), Value::Null);
    }
}
