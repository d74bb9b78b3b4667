//! Cache-Control / Expires interpretation.

use std::collections::BTreeMap;

use chrono::DateTime;

/// Derives entry TTLs from response headers.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    pub default_ttl_ms: u64,
    pub respect_headers: bool,
}

impl TtlPolicy {
    pub fn new(default_ttl_ms: u64, respect_headers: bool) -> Self {
        Self {
            default_ttl_ms,
            respect_headers,
        }
    }

    /// Returns the TTL in milliseconds implied by `headers` at `now_ms`.
    ///
    /// `no-store`/`no-cache` yield 0 and take precedence over `max-age`.
    /// `max-age=N` yields `N * 1000`. Otherwise a future `expires` yields the
    /// remaining time. Anything else falls back to the default TTL.
    pub fn parse_cache_headers(
        &self,
        headers: Option<&BTreeMap<String, String>>,
        now_ms: u64,
    ) -> u64 {
        let headers = match headers {
            Some(h) if self.respect_headers => h,
            _ => return self.default_ttl_ms,
        };

        if let Some(cache_control) = header(headers, "cache-control") {
            let mut max_age = None;
            for directive in cache_control.split(',').map(|d| d.trim().to_ascii_lowercase()) {
                match directive.as_str() {
                    "no-store" | "no-cache" => return 0,
                    d => {
                        if let Some(secs) = d.strip_prefix("max-age=") {
                            max_age = secs.trim_matches('"').parse::<u64>().ok();
                        }
                    }
                }
            }
            if let Some(secs) = max_age {
                return secs.saturating_mul(1000);
            }
        }

        if let Some(expires_ms) = header(headers, "expires").and_then(parse_http_date) {
            if expires_ms > now_ms {
                return expires_ms - now_ms;
            }
        }

        self.default_ttl_ms
    }
}

fn header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parses an HTTP date (IMF-fixdate, also accepts RFC 3339) to Unix ms.
fn parse_http_date(value: &str) -> Option<u64> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.timestamp_millis())
        .filter(|ms| *ms >= 0)
        .map(|ms| ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_TTL: u64 = 300_000;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn policy() -> TtlPolicy {
        TtlPolicy::new(DEFAULT_TTL, true)
    }

    #[test]
    fn test_no_headers_uses_default() {
        assert_eq!(policy().parse_cache_headers(None, 0), DEFAULT_TTL);
    }

    #[test]
    fn test_disabled_ignores_headers() {
        let h = headers(&[("cache-control", "max-age=30")]);
        let p = TtlPolicy::new(DEFAULT_TTL, false);
        assert_eq!(p.parse_cache_headers(Some(&h), 0), DEFAULT_TTL);
    }

    #[test]
    fn test_max_age() {
        let h = headers(&[("Cache-Control", "public, max-age=30")]);
        assert_eq!(policy().parse_cache_headers(Some(&h), 0), 30_000);
    }

    #[test]
    fn test_no_store_and_no_cache() {
        let h = headers(&[("cache-control", "no-store")]);
        assert_eq!(policy().parse_cache_headers(Some(&h), 0), 0);

        let h = headers(&[("cache-control", "max-age=60, no-cache")]);
        assert_eq!(policy().parse_cache_headers(Some(&h), 0), 0);
    }

    #[test]
    fn test_malformed_max_age_falls_through() {
        let h = headers(&[("cache-control", "max-age=soon")]);
        assert_eq!(policy().parse_cache_headers(Some(&h), 0), DEFAULT_TTL);
    }

    #[test]
    fn test_future_expires() {
        // Thu, 01 Jan 1970 00:01:40 GMT == 100_000 ms
        let h = headers(&[("expires", "Thu, 01 Jan 1970 00:01:40 GMT")]);
        assert_eq!(policy().parse_cache_headers(Some(&h), 40_000), 60_000);
    }

    #[test]
    fn test_past_expires_uses_default() {
        let h = headers(&[("Expires", "Wed, 21 Oct 2015 07:28:00 GMT")]);
        let now = 1_700_000_000_000;
        assert_eq!(policy().parse_cache_headers(Some(&h), now), DEFAULT_TTL);
    }

    #[test]
    fn test_unparseable_expires_uses_default() {
        let h = headers(&[("expires", "0")]);
        assert_eq!(policy().parse_cache_headers(Some(&h), 0), DEFAULT_TTL);
    }
}
