//! Concrete requests and request templates.

use super::body::{decode_body, BodyMode};
use crate::predicate::FieldMatcher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header mapping: name to ordered sequence of values.
pub type Headers = BTreeMap<String, Vec<String>>;

/// A concrete, observed HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub method: String,
    /// Host, optionally with port
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub scheme: String,
    /// Raw query string without the leading `?`
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "BodyMode::is_text")]
    pub body_mode: BodyMode,
    #[serde(default)]
    pub headers: Headers,
}

impl RequestDetails {
    /// Values of a header, looked up case-insensitively.
    pub fn header_values(&self, name: &str) -> Option<&[String]> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// Body bytes as they go on the wire.
    pub fn body_bytes(&self) -> Vec<u8> {
        decode_body(&self.body, self.body_mode)
    }

    /// Destination and path joined, the form response delay patterns match against.
    pub fn url(&self) -> String {
        format!("{}{}", self.destination, self.path)
    }
}

/// Sort `k=v` pairs of a query string. Pairs with the same key keep their relative order.
pub fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
    pairs.sort_by_key(|pair| pair.split('=').next().unwrap_or(""));
    pairs.join("&")
}

/// Request side of a stored template. Absent fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<FieldMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<FieldMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<FieldMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<FieldMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<FieldMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<FieldMatcher>,
    /// Every listed header value must be present on the live request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: Headers,
}

impl RequestTemplate {
    /// Template that replays a captured request: every scalar field is an exact
    /// literal, headers stay unspecified.
    pub fn captured(request: &RequestDetails) -> Self {
        let literal = |value: &str| Some(FieldMatcher::Literal(value.to_string()));
        Self {
            path: literal(&request.path),
            method: literal(&request.method),
            destination: literal(&request.destination),
            scheme: literal(&request.scheme),
            query: literal(&request.query),
            body: literal(&request.body),
            headers: Headers::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut request = RequestDetails::default();
        request
            .headers
            .insert("Content-Type".to_string(), vec!["application/json".to_string()]);

        assert_eq!(
            request.header_values("content-type"),
            Some(&["application/json".to_string()][..])
        );
        assert!(request.header_values("accept").is_none());
    }

    #[test]
    fn test_canonical_query_sorts_by_key() {
        assert_eq!(canonical_query("b=2&a=1"), "a=1&b=2");
        assert_eq!(canonical_query("a=2&b=1&a=1"), "a=2&a=1&b=1");
        assert_eq!(canonical_query(""), "");
        assert_eq!(canonical_query("&&x=1&"), "x=1");
    }

    #[test]
    fn test_captured_template_leaves_headers_open() {
        let request = RequestDetails {
            path: "/users/1".to_string(),
            method: "GET".to_string(),
            destination: "api.example.com".to_string(),
            scheme: "http".to_string(),
            headers: Headers::from([("Date".to_string(), vec!["today".to_string()])]),
            ..Default::default()
        };

        let template = RequestTemplate::captured(&request);
        assert_eq!(
            template.path,
            Some(FieldMatcher::Literal("/users/1".to_string()))
        );
        assert_eq!(template.query, Some(FieldMatcher::Literal(String::new())));
        assert!(template.headers.is_empty());
    }

    #[test]
    fn test_template_serde_accepts_literals_and_expressions() {
        let json = r#"{
            "method": "GET",
            "path": {"matcher": "glob", "value": "/users/*"},
            "headers": {"Accept": ["application/json"]}
        }"#;
        let template: RequestTemplate = serde_json::from_str(json).unwrap();

        assert_eq!(template.method, Some(FieldMatcher::Literal("GET".to_string())));
        assert!(matches!(template.path, Some(FieldMatcher::Expression(_))));
        assert!(template.destination.is_none());
        assert_eq!(template.headers.len(), 1);
    }
}
