//! Query string parsing
//!
//! Pairs are split on `&`, then on `=`. Keys and values are the literal
//! substrings (no percent-decoding). A pair without `=` is dropped, a pair
//! with several `=` keeps only the text up to the second one, and the last
//! occurrence of a key wins.

use std::collections::HashMap;

/// Parsed query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    fields: HashMap<String, String>,
    raw: String,
}

impl QueryParams {
    /// Parse a raw query string (without the leading `?`)
    pub fn parse(raw: &str) -> Self {
        let mut fields = HashMap::new();

        for pair in raw.split('&') {
            let mut parts = pair.split('=');
            if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                fields.insert(key.to_string(), value.to_string());
            }
        }

        Self {
            fields,
            raw: raw.to_string(),
        }
    }

    /// Value for `key`, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Value for `key`, or `default` when absent
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The query string exactly as received
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Re-serialize the retained pairs as `k=v` joined by `&`, sorted by key
    pub fn to_query_string(&self) -> String {
        let mut pairs: Vec<(&String, &String)> = self.fields.iter().collect();
        pairs.sort();
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Equality on the parsed mapping only, ignoring the raw text
    pub fn same_fields(&self, other: &QueryParams) -> bool {
        self.fields == other.fields
    }
}
