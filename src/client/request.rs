//! Request options and response bodies.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;

// == Fetch Options ==
/// An HTTP request descriptor plus cache controls.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    /// JSON request body
    pub body: Option<Value>,
    /// Overrides the generated cache key
    pub cache_key: Option<String>,
    /// Overrides the header-derived TTL, in milliseconds
    pub cache_ttl: Option<u64>,
    /// Skip the cache lookup and do not store the result
    pub bypass_cache: bool,
    /// Per-call deduplication switch; `None` follows the cache config
    pub deduplicate: Option<bool>,
    /// Header names left out of the generated cache key
    pub exclude_headers: Vec<String>,
}

impl FetchOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn cache_ttl(mut self, ttl_ms: u64) -> Self {
        self.cache_ttl = Some(ttl_ms);
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    pub fn deduplicate(mut self, enabled: bool) -> Self {
        self.deduplicate = Some(enabled);
        self
    }

    pub fn exclude_header(mut self, name: impl Into<String>) -> Self {
        self.exclude_headers.push(name.into());
        self
    }
}

// == Response Body ==
/// A parsed response body, shaped by the response `content-type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl ResponseBody {
    /// Decodes raw bytes according to `content_type`.
    ///
    /// JSON types parse as JSON (an empty body is `null`, as HEAD responses
    /// carry none), `text/*` decodes as UTF-8, anything else stays raw.
    pub fn decode(
        content_type: Option<&str>,
        bytes: Vec<u8>,
        url: &str,
        status: u16,
    ) -> Result<Self, FetchError> {
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if mime == "application/json" || mime.ends_with("+json") {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(ResponseBody::Json(Value::Null));
            }
            return serde_json::from_slice(&bytes)
                .map(ResponseBody::Json)
                .map_err(|e| FetchError::decode(url, status, format!("invalid JSON body: {}", e)));
        }

        if mime.starts_with("text/") {
            return String::from_utf8(bytes)
                .map(ResponseBody::Text)
                .map_err(|e| FetchError::decode(url, status, format!("invalid UTF-8 body: {}", e)));
        }

        Ok(ResponseBody::Bytes(bytes))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ResponseBody::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Deserializes a JSON body into `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        match self {
            ResponseBody::Json(value) => serde_json::from_value(value),
            ResponseBody::Text(text) => serde_json::from_str(&text),
            ResponseBody::Bytes(bytes) => serde_json::from_slice(&bytes),
        }
    }
}

impl From<Value> for ResponseBody {
    fn from(value: Value) -> Self {
        ResponseBody::Json(value)
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        ResponseBody::Text(text)
    }
}

impl From<&str> for ResponseBody {
    fn from(text: &str) -> Self {
        ResponseBody::Text(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_json_body() {
        let body = ResponseBody::decode(
            Some("application/json; charset=utf-8"),
            br#"{"id":1}"#.to_vec(),
            "/u",
            200,
        )
        .unwrap();
        assert_eq!(body.as_json(), Some(&json!({"id": 1})));
    }

    #[test]
    fn test_vendor_json_and_empty_body() {
        let body =
            ResponseBody::decode(Some("application/problem+json"), Vec::new(), "/u", 200).unwrap();
        assert_eq!(body, ResponseBody::Json(Value::Null));
    }

    #[test]
    fn test_text_body() {
        let body = ResponseBody::decode(Some("text/plain"), b"hello".to_vec(), "/u", 200).unwrap();
        assert_eq!(body.as_text(), Some("hello"));
    }

    #[test]
    fn test_other_types_stay_raw() {
        let body = ResponseBody::decode(None, vec![0, 159, 146], "/u", 200).unwrap();
        assert_eq!(body.as_bytes(), Some(&[0u8, 159, 146][..]));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let err = ResponseBody::decode(Some("application/json"), b"{oops".to_vec(), "/u", 200)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Decode);
        assert_eq!(err.status, Some(200));
    }

    #[test]
    fn test_into_typed() {
        #[derive(Deserialize)]
        struct Folder {
            name: String,
        }
        let folder: Folder = ResponseBody::Json(json!({"name": "inbox"})).into_typed().unwrap();
        assert_eq!(folder.name, "inbox");
    }

    #[test]
    fn test_options_builder() {
        let options = FetchOptions::get()
            .method(Method::POST)
            .header("Accept", "application/json")
            .json(json!({"q": 1}))
            .cache_ttl(5_000)
            .deduplicate(false)
            .bypass_cache();

        assert_eq!(options.method, Method::POST);
        assert_eq!(options.headers.len(), 1);
        assert_eq!(options.cache_ttl, Some(5_000));
        assert_eq!(options.deduplicate, Some(false));
        assert!(options.bypass_cache);
    }
}
