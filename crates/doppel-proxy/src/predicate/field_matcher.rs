//! Field matchers: literal values and matcher expressions.
//!
//! A template field is either a plain string (an exact literal) or a tagged
//! expression `{"matcher": <kind>, "value": <parameters>}`. Expressions are data;
//! `CompiledMatcher` is the interpreter that evaluates them. A new kind needs a
//! variant in `Matcher`, its compiled form, and an arm in `CompiledMatcher::matches`.
//! The ranking in `crate::matching` only sees `matches` and `is_literal`.

use super::json::json_subset;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Matcher expression kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "matcher", content = "value", rename_all = "camelCase")]
pub enum Matcher {
    /// Exact string equality
    Exact(String),
    /// Shell-style glob where `*` matches any run of characters
    Glob(String),
    /// Regular expression (unanchored unless the pattern anchors itself)
    Regex(String),
    /// Substring containment
    Contains(String),
    /// Field presence (an empty value counts as absent)
    Exists(bool),
    /// Body parses as JSON equal to the value
    Json(serde_json::Value),
    /// Body parses as JSON containing the value as a subset
    JsonPartial(serde_json::Value),
}

/// A template field: literal shorthand or a matcher expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldMatcher {
    /// Plain string, compared exactly
    Literal(String),
    Expression(Matcher),
}

impl FieldMatcher {
    pub fn exact(value: impl Into<String>) -> Self {
        FieldMatcher::Literal(value.into())
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        FieldMatcher::Expression(Matcher::Glob(pattern.into()))
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        FieldMatcher::Expression(Matcher::Regex(pattern.into()))
    }

    /// Kind name as it appears in serialized templates.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldMatcher::Literal(_) | FieldMatcher::Expression(Matcher::Exact(_)) => "exact",
            FieldMatcher::Expression(Matcher::Glob(_)) => "glob",
            FieldMatcher::Expression(Matcher::Regex(_)) => "regex",
            FieldMatcher::Expression(Matcher::Contains(_)) => "contains",
            FieldMatcher::Expression(Matcher::Exists(_)) => "exists",
            FieldMatcher::Expression(Matcher::Json(_)) => "json",
            FieldMatcher::Expression(Matcher::JsonPartial(_)) => "jsonPartial",
        }
    }
}

/// Compiled matcher ready for evaluation.
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    Exact(String),
    Glob(Arc<Regex>),
    Regex(Arc<Regex>),
    Contains(String),
    Exists(bool),
    Json(serde_json::Value),
    JsonPartial(serde_json::Value),
}

impl CompiledMatcher {
    /// Compile a field matcher. `normalize` is applied to literal parameters so they
    /// compare against live values normalized the same way.
    pub fn compile(
        field: &FieldMatcher,
        normalize: impl Fn(&str) -> String,
    ) -> Result<Self, regex::Error> {
        let expression = match field {
            FieldMatcher::Literal(value) => return Ok(CompiledMatcher::Exact(normalize(value))),
            FieldMatcher::Expression(expression) => expression,
        };

        match expression {
            Matcher::Exact(value) => Ok(CompiledMatcher::Exact(normalize(value))),
            Matcher::Glob(pattern) => Ok(CompiledMatcher::Glob(Arc::new(glob_to_regex(pattern)?))),
            Matcher::Regex(pattern) => Ok(CompiledMatcher::Regex(Arc::new(Regex::new(pattern)?))),
            Matcher::Contains(value) => Ok(CompiledMatcher::Contains(value.clone())),
            Matcher::Exists(expected) => Ok(CompiledMatcher::Exists(*expected)),
            Matcher::Json(value) => Ok(CompiledMatcher::Json(value.clone())),
            Matcher::JsonPartial(value) => Ok(CompiledMatcher::JsonPartial(value.clone())),
        }
    }

    /// Pattern kinds evaluate against the raw field; the others against the
    /// normalized one.
    pub fn sees_raw(&self) -> bool {
        matches!(
            self,
            CompiledMatcher::Glob(_) | CompiledMatcher::Regex(_) | CompiledMatcher::Contains(_)
        )
    }

    /// Evaluate against a live field value.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            CompiledMatcher::Exact(expected) => value == expected,
            CompiledMatcher::Glob(regex) | CompiledMatcher::Regex(regex) => regex.is_match(value),
            CompiledMatcher::Contains(needle) => value.contains(needle.as_str()),
            CompiledMatcher::Exists(expected) => *expected == !value.is_empty(),
            CompiledMatcher::Json(expected) => parse_json(value).is_some_and(|v| &v == expected),
            CompiledMatcher::JsonPartial(expected) => {
                parse_json(value).is_some_and(|v| json_subset(&v, expected))
            }
        }
    }

    /// Exact literals rank above pattern matchers of equal specificity.
    pub fn is_literal(&self) -> bool {
        matches!(self, CompiledMatcher::Exact(_))
    }
}

fn parse_json(value: &str) -> Option<serde_json::Value> {
    serde_json::from_str(value).ok()
}

/// Translate a glob into an anchored regex; `*` is the only wildcard.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for (i, literal) in pattern.split('*').enumerate() {
        if i > 0 {
            source.push_str(".*");
        }
        source.push_str(&regex::escape(literal));
    }
    source.push('$');
    Regex::new(&source)
}
