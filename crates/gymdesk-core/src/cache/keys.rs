//! Cache-key conventions shared by the services.
//!
//! A key is the resource name followed by `name=value` segments, e.g.
//! `members:page=2:status=active:type=!all`. Filter values are trimmed and
//! lower-cased, an unset or blank filter becomes `!all`, and separator
//! characters inside values are percent-encoded so distinct queries never
//! produce the same key. Encoding always escapes `!`, so the placeholder
//! cannot be spelled by a real value.

use std::fmt;

use url::form_urlencoded;

/// Placeholder for a filter that is not set. Written to the key unencoded.
pub const UNSET_FILTER: &str = "!all";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: String,
    segments: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: encode(resource),
            segments: Vec::new(),
        }
    }

    pub fn page(self, page: u32) -> Self {
        self.segment("page", page.to_string())
    }

    pub fn filter(self, name: &str, value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => self.segment(name, v.to_lowercase()),
            _ => self.raw_segment(name, UNSET_FILTER.to_string()),
        }
    }

    /// Identifier segment, kept verbatim apart from encoding.
    pub fn id(self, name: &str, id: impl fmt::Display) -> Self {
        self.segment(name, id.to_string())
    }

    fn segment(self, name: &str, value: String) -> Self {
        let value = encode(&value);
        self.raw_segment(name, value)
    }

    fn raw_segment(mut self, name: &str, value: String) -> Self {
        self.segments.push((encode(name), value));
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

fn encode(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        for (name, value) in &self.segments {
            write!(f, ":{}={}", name, value)?;
        }
        Ok(())
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_logical_query_same_key() {
        let a = CacheKey::new("members").page(1).filter("status", Some(" Active "));
        let b = CacheKey::new("members").page(1).filter("status", Some("active"));
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "members:page=1:status=active");
    }

    #[test]
    fn test_unset_filter_placeholder() {
        let none = CacheKey::new("payments").page(3).filter("method", None);
        let blank = CacheKey::new("payments").page(3).filter("method", Some("  "));
        assert_eq!(none.to_string(), "payments:page=3:method=!all");
        assert_eq!(none, blank);
    }

    #[test]
    fn test_distinct_queries_do_not_collide() {
        let keys = [
            CacheKey::new("members").page(1).filter("search", Some("a:page=2")),
            CacheKey::new("members").page(1).filter("search", Some("a")).page(2),
            CacheKey::new("members").page(12),
            CacheKey::new("members").page(1).filter("status", None),
            CacheKey::new("members").page(1).filter("type", None),
            CacheKey::new("members").page(1).filter("search", Some("all")),
        ];
        let rendered: std::collections::HashSet<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(rendered.len(), keys.len());
    }

    #[test]
    fn test_literal_all_differs_from_unset() {
        for literal in ["all", "ALL", "!all"] {
            let set = CacheKey::new("members").filter("search", Some(literal));
            let unset = CacheKey::new("members").filter("search", None);
            assert_ne!(set.to_string(), unset.to_string(), "{}", literal);
        }
        assert_eq!(
            CacheKey::new("members").filter("search", Some("!all")).to_string(),
            "members:search=%21all"
        );
    }
}
