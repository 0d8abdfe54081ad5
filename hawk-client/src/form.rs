//! Form payloads for POST requests.
//!
//! Bodies are `application/x-www-form-urlencoded` shaped: `key=value` pairs joined with `&`,
//! values percent-encoded with spaces turned into `+`, keys written as given. Entries whose
//! value is empty are left out of the body entirely rather than encoded as `key=`.

use bytes::Bytes;
use std::collections::BTreeMap;

/// The `Content-Type` sent with non-empty form payloads.
pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Key/value data posted with a request.
///
/// Entries are kept sorted by key so the encoded body is the same for the same data
/// regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    entries: BTreeMap<String, String>,
}

impl FormData {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the previous value for `key` if there was one.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.entries.insert(key.into(), value.into())
    }

    /// Look up the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of entries, including ones with empty values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for FormData
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = FormData::new();
        data.extend(iter);
        data
    }
}

impl<K, V> Extend<(K, V)> for FormData
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

/// Encode `data` into a request body.
///
/// An empty payload, or one whose values are all empty, encodes to an empty body.
pub fn encode(data: &FormData) -> Bytes {
    let mut body = String::new();
    for (key, value) in data.iter().filter(|(_, value)| !value.is_empty()) {
        if !body.is_empty() {
            body.push('&');
        }
        body.push_str(key);
        body.push('=');
        body.extend(url::form_urlencoded::byte_serialize(value.as_bytes()));
    }
    Bytes::from(body)
}
