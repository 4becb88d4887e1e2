//! Compiled request templates and per-field evaluation.

use super::field_matcher::{CompiledMatcher, FieldMatcher};
use super::json::canonical_json;
use crate::model::{canonical_query, RequestDetails, RequestTemplate};
use serde::Serialize;

/// Scalar request fields a template can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestField {
    Method,
    Scheme,
    Destination,
    Path,
    Query,
    Body,
}

impl RequestField {
    pub const ALL: [RequestField; 6] = [
        RequestField::Method,
        RequestField::Scheme,
        RequestField::Destination,
        RequestField::Path,
        RequestField::Query,
        RequestField::Body,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RequestField::Method => "method",
            RequestField::Scheme => "scheme",
            RequestField::Destination => "destination",
            RequestField::Path => "path",
            RequestField::Query => "query",
            RequestField::Body => "body",
        }
    }

    /// The field's value as the client sent it.
    pub fn raw(self, request: &RequestDetails) -> &str {
        match self {
            RequestField::Method => &request.method,
            RequestField::Scheme => &request.scheme,
            RequestField::Destination => &request.destination,
            RequestField::Path => &request.path,
            RequestField::Query => &request.query,
            RequestField::Body => &request.body,
        }
    }

    /// Normalization shared by literal template values and live values.
    /// JSON bodies are compared in canonical form (sorted keys, no whitespace).
    /// Pattern matchers never see normalized values.
    pub fn normalize(self, value: &str) -> String {
        match self {
            RequestField::Method => value.to_ascii_uppercase(),
            RequestField::Scheme | RequestField::Destination => value.to_ascii_lowercase(),
            RequestField::Query => canonical_query(value),
            RequestField::Body => canonical_json(value).unwrap_or_else(|| value.to_string()),
            RequestField::Path => value.to_string(),
        }
    }
}

/// Live request with its normalized fields computed once. Raw values stay
/// available for pattern matchers.
#[derive(Debug)]
pub struct LiveRequest<'a> {
    request: &'a RequestDetails,
    method: String,
    scheme: String,
    destination: String,
    query: String,
    body: String,
}

impl<'a> LiveRequest<'a> {
    pub fn new(request: &'a RequestDetails) -> Self {
        Self {
            request,
            method: RequestField::Method.normalize(&request.method),
            scheme: RequestField::Scheme.normalize(&request.scheme),
            destination: RequestField::Destination.normalize(&request.destination),
            query: RequestField::Query.normalize(&request.query),
            body: RequestField::Body.normalize(&request.body),
        }
    }

    fn raw(&self, field: RequestField) -> &str {
        field.raw(self.request)
    }

    fn normalized(&self, field: RequestField) -> &str {
        match field {
            RequestField::Method => &self.method,
            RequestField::Scheme => &self.scheme,
            RequestField::Destination => &self.destination,
            RequestField::Query => &self.query,
            RequestField::Path => &self.request.path,
            RequestField::Body => &self.body,
        }
    }
}

/// How well a surviving template fits a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchScore {
    /// Specified (non-wildcard) fields, header names included
    pub specified: usize,
    /// Specified fields that were exact literals
    pub literal: usize,
    /// Names of the contributing fields, headers as `header:<name>`
    pub fields: Vec<String>,
}

impl MatchScore {
    /// Strictly better: more specified fields, then more exact literals.
    pub fn outranks(&self, other: &MatchScore) -> bool {
        (self.specified, self.literal) > (other.specified, other.literal)
    }
}

/// Template compiled for repeated evaluation.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    fields: Vec<(RequestField, CompiledMatcher)>,
    /// Lowercased header name and the values that must be present
    headers: Vec<(String, Vec<String>)>,
}

impl CompiledTemplate {
    pub fn compile(template: &RequestTemplate) -> Result<Self, regex::Error> {
        let candidates: [(RequestField, &Option<FieldMatcher>); 6] = [
            (RequestField::Method, &template.method),
            (RequestField::Scheme, &template.scheme),
            (RequestField::Destination, &template.destination),
            (RequestField::Path, &template.path),
            (RequestField::Query, &template.query),
            (RequestField::Body, &template.body),
        ];

        let mut fields = Vec::new();
        for (field, matcher) in candidates {
            if let Some(matcher) = matcher {
                let compiled = CompiledMatcher::compile(matcher, |v| field.normalize(v))?;
                fields.push((field, compiled));
            }
        }

        let headers = template
            .headers
            .iter()
            .map(|(name, values)| (name.to_ascii_lowercase(), values.clone()))
            .collect();

        Ok(Self { fields, headers })
    }

    /// Fields constrained by pattern matchers, which compare raw values.
    pub fn raw_fields(&self) -> impl Iterator<Item = RequestField> + '_ {
        self.fields
            .iter()
            .filter(|(_, matcher)| matcher.sees_raw())
            .map(|(field, _)| *field)
    }

    /// Lowercased names of the headers this template constrains.
    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.headers.iter().map(|(name, _)| name.as_str())
    }

    /// Score the template against a request, or `None` if any specified field
    /// fails to match.
    pub fn evaluate(&self, live: &LiveRequest<'_>) -> Option<MatchScore> {
        let mut score = MatchScore::default();

        for (field, matcher) in &self.fields {
            let value = if matcher.sees_raw() {
                live.raw(*field)
            } else {
                live.normalized(*field)
            };
            if !matcher.matches(value) {
                return None;
            }
            score.specified += 1;
            if matcher.is_literal() {
                score.literal += 1;
            }
            score.fields.push(field.name().to_string());
        }

        for (name, expected) in &self.headers {
            let actual = live.request.header_values(name)?;
            if !expected.iter().all(|value| actual.contains(value)) {
                return None;
            }
            score.specified += 1;
            score.literal += 1;
            score.fields.push(format!("header:{name}"));
        }

        Some(score)
    }
}
