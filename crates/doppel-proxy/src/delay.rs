//! Response delay rules and the delay injector.

use crate::error::EngineError;
use crate::model::RequestDetails;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Artificial latency for requests whose URL and method match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDelay {
    /// Regex over destination + path
    pub url_pattern: String,
    /// Exact method, or empty for any method
    #[serde(default)]
    pub http_method: String,
    /// Delay in milliseconds
    pub delay: u64,
}

#[derive(Debug, Clone)]
struct CompiledDelay {
    rule: ResponseDelay,
    pattern: Regex,
}

impl CompiledDelay {
    fn applies_to(&self, request: &RequestDetails) -> bool {
        let method_matches = self.rule.http_method.is_empty()
            || self.rule.http_method.eq_ignore_ascii_case(&request.method);
        method_matches && self.pattern.is_match(&request.url())
    }
}

/// Ordered delay rules; the first applicable rule wins.
#[derive(Debug, Clone, Default)]
pub struct ResponseDelayList {
    rules: Vec<CompiledDelay>,
}

impl ResponseDelayList {
    /// Validate and compile a full list. Any invalid rule rejects the whole list.
    pub fn compile(rules: Vec<ResponseDelay>) -> Result<Self, EngineError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.url_pattern.is_empty() {
                return Err(EngineError::InvalidDelay(
                    "urlPattern must not be empty".to_string(),
                ));
            }
            if !rule.http_method.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(EngineError::InvalidDelay(format!(
                    "httpMethod {:?} is not a method name",
                    rule.http_method
                )));
            }
            let pattern = Regex::new(&rule.url_pattern).map_err(|e| {
                EngineError::InvalidDelay(format!("urlPattern {:?}: {e}", rule.url_pattern))
            })?;
            compiled.push(CompiledDelay { rule, pattern });
        }
        Ok(Self { rules: compiled })
    }

    /// Delay of the first rule applying to the request, zero if none does.
    pub fn delay_for(&self, request: &RequestDetails) -> Duration {
        self.rules
            .iter()
            .find(|rule| rule.applies_to(request))
            .map(|rule| Duration::from_millis(rule.rule.delay))
            .unwrap_or(Duration::ZERO)
    }

    pub fn rules(&self) -> Vec<ResponseDelay> {
        self.rules.iter().map(|c| c.rule.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Suspend delivery for `delay`. Dropping the future (client gone) cancels the wait.
pub async fn apply_delay(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn rule(pattern: &str, method: &str, delay: u64) -> ResponseDelay {
        ResponseDelay {
            url_pattern: pattern.to_string(),
            http_method: method.to_string(),
            delay,
        }
    }

    fn request(method: &str, path: &str) -> RequestDetails {
        RequestDetails {
            method: method.to_string(),
            destination: "api.example.com".to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let list = ResponseDelayList::compile(vec![
            rule(r".*\/slow", "GET", 200),
            rule(r".*", "", 5),
        ])
        .unwrap();

        assert_eq!(
            list.delay_for(&request("GET", "/api/slow")),
            Duration::from_millis(200)
        );
        assert_eq!(
            list.delay_for(&request("POST", "/api/slow")),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_no_rule_means_no_delay() {
        let list = ResponseDelayList::compile(vec![rule(r".*\/slow", "GET", 200)]).unwrap();
        assert_eq!(list.delay_for(&request("GET", "/api/fast")), Duration::ZERO);
        assert_eq!(
            ResponseDelayList::default().delay_for(&request("GET", "/")),
            Duration::ZERO
        );
    }

    #[test]
    fn test_pattern_sees_destination() {
        let list = ResponseDelayList::compile(vec![rule(r"^api\.example\.com/", "", 50)]).unwrap();
        assert_eq!(
            list.delay_for(&request("GET", "/x")),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_method_comparison_ignores_case() {
        let list = ResponseDelayList::compile(vec![rule(".*", "get", 1)]).unwrap();
        assert_eq!(list.delay_for(&request("GET", "/")), Duration::from_millis(1));
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        assert!(matches!(
            ResponseDelayList::compile(vec![rule("(", "", 1)]),
            Err(EngineError::InvalidDelay(_))
        ));
        assert!(ResponseDelayList::compile(vec![rule("", "", 1)]).is_err());
        assert!(ResponseDelayList::compile(vec![rule(".*", "G E T", 1)]).is_err());
    }

    #[tokio::test]
    async fn test_apply_delay_waits() {
        let start = Instant::now();
        apply_delay(Duration::from_millis(30)).await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
