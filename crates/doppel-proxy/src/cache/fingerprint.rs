//! Request fingerprints used as cache keys.

use crate::model::RequestDetails;
use crate::predicate::RequestField;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Hex SHA-256 over the canonical form of the fields the matcher compares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a request. Fields in `raw_fields` are hashed as sent, the
    /// rest normalized the way literal matchers compare them. Only headers named
    /// in `significant_headers` (lowercase) take part; their values are sorted.
    pub fn of(
        request: &RequestDetails,
        significant_headers: &BTreeSet<String>,
        raw_fields: &BTreeSet<RequestField>,
    ) -> Self {
        let mut hasher = Sha256::new();
        let mut part = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };

        for field in RequestField::ALL {
            let value = field.raw(request);
            if raw_fields.contains(&field) {
                part(value.as_bytes());
            } else {
                part(field.normalize(value).as_bytes());
            }
        }

        let mut headers: Vec<(String, Vec<&str>)> = request
            .headers
            .iter()
            .map(|(name, values)| (name.to_ascii_lowercase(), values))
            .filter(|(name, _)| significant_headers.contains(name))
            .map(|(name, values)| {
                let mut values: Vec<&str> = values.iter().map(String::as_str).collect();
                values.sort_unstable();
                (name, values)
            })
            .collect();
        headers.sort();
        for (name, values) in headers {
            part(name.as_bytes());
            for value in values {
                part(value.as_bytes());
            }
        }

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestDetails {
        RequestDetails {
            method: "GET".to_string(),
            scheme: "http".to_string(),
            destination: "api.example.com".to_string(),
            path: "/users".to_string(),
            query: "b=2&a=1".to_string(),
            body: r#"{"b": 1, "a": 2}"#.to_string(),
            ..Default::default()
        }
    }

    fn significant(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_equivalent_requests_share_a_fingerprint() {
        let a = request();
        let mut b = request();
        b.method = "get".to_string();
        b.query = "a=1&b=2".to_string();
        b.body = r#"{"a":2,"b":1}"#.to_string();
        b.destination = "API.example.com".to_string();

        assert_eq!(
            Fingerprint::of(&a, &BTreeSet::new(), &BTreeSet::new()),
            Fingerprint::of(&b, &BTreeSet::new(), &BTreeSet::new())
        );
    }

    #[test]
    fn test_compared_fields_change_the_fingerprint() {
        let base = Fingerprint::of(&request(), &BTreeSet::new(), &BTreeSet::new());

        let mut other = request();
        other.path = "/accounts".to_string();
        assert_ne!(Fingerprint::of(&other, &BTreeSet::new(), &BTreeSet::new()), base);

        let mut other = request();
        other.body = r#"{"a": 3}"#.to_string();
        assert_ne!(Fingerprint::of(&other, &BTreeSet::new(), &BTreeSet::new()), base);
    }

    #[test]
    fn test_only_significant_headers_count() {
        let mut a = request();
        a.headers
            .insert("X-Request-Id".to_string(), vec!["1".to_string()]);
        let mut b = request();
        b.headers
            .insert("X-Request-Id".to_string(), vec!["2".to_string()]);

        assert_eq!(
            Fingerprint::of(&a, &significant(&["accept"]), &BTreeSet::new()),
            Fingerprint::of(&b, &significant(&["accept"]), &BTreeSet::new())
        );
        assert_ne!(
            Fingerprint::of(&a, &significant(&["x-request-id"]), &BTreeSet::new()),
            Fingerprint::of(&b, &significant(&["x-request-id"]), &BTreeSet::new())
        );
    }

    #[test]
    fn test_raw_fields_hash_as_sent() {
        let a = request();
        let mut b = request();
        b.body = r#"{"a": 2, "b": 1}"#.to_string();
        b.destination = "API.example.com".to_string();

        let headers = BTreeSet::new();
        assert_eq!(
            Fingerprint::of(&a, &headers, &BTreeSet::new()),
            Fingerprint::of(&b, &headers, &BTreeSet::new())
        );

        let body = BTreeSet::from([RequestField::Body]);
        assert_ne!(
            Fingerprint::of(&a, &headers, &body),
            Fingerprint::of(&b, &headers, &body)
        );

        let destination = BTreeSet::from([RequestField::Destination]);
        assert_ne!(
            Fingerprint::of(&a, &headers, &destination),
            Fingerprint::of(&b, &headers, &destination)
        );
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let mut a = request();
        a.path = "/ab".to_string();
        a.query = String::new();
        let mut b = request();
        b.path = "/a".to_string();
        b.query = "b".to_string();

        assert_ne!(
            Fingerprint::of(&a, &BTreeSet::new(), &BTreeSet::new()),
            Fingerprint::of(&b, &BTreeSet::new(), &BTreeSet::new())
        );
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fingerprint = Fingerprint::of(&request(), &BTreeSet::new(), &BTreeSet::new());
        assert_eq!(fingerprint.as_str().len(), 64);
        assert!(fingerprint.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
