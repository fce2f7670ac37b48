//! Cache key derivation.
//!
//! A key has the shape `[endpoint]id:<id>|name=v1,v2|...`. Parameters with no
//! values are dropped and the rest are sorted by name, so two requests with
//! the same effective parameters map to the same key however their maps were
//! built. Every component is form-urlencoded before it is written; the
//! delimiters therefore only ever appear as delimiters.

use std::borrow::Borrow;
use std::fmt;

use url::form_urlencoded::byte_serialize;

use crate::application::params::{ParamMap, ParameterSource};

/// Deterministic identity of a cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for `id` under the request's endpoint, using `params` in place of
    /// the request's own parameters when supplied.
    pub fn for_request(
        id: &str,
        source: &dyn ParameterSource,
        params: Option<&ParamMap>,
    ) -> Self {
        cache_key(source.endpoint(), id, params.unwrap_or_else(|| source.as_map()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the key for `id` at `endpoint` with the effective `params`.
pub fn cache_key(endpoint: &str, id: &str, params: &ParamMap) -> CacheKey {
    let mut key = String::with_capacity(endpoint.len() + id.len() + 8);
    key.push('[');
    push_encoded(&mut key, endpoint);
    key.push_str("]id:");
    push_encoded(&mut key, id);

    let mut entries: Vec<(&String, &Vec<String>)> = params
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .collect();
    entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

    for (name, values) in entries {
        key.push('|');
        push_encoded(&mut key, name);
        key.push('=');
        for (index, value) in values.iter().enumerate() {
            if index > 0 {
                key.push(',');
            }
            push_encoded(&mut key, value);
        }
    }

    CacheKey(key)
}

fn push_encoded(buf: &mut String, raw: &str) {
    buf.extend(byte_serialize(raw.as_bytes()));
}
