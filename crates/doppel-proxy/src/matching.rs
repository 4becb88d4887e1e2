//! Template ranking.
//!
//! Every template is evaluated against the request; a template with any failing
//! specified field is eliminated. Survivors are ranked by specificity (number of
//! specified fields, then number of exact literals). Equal ranks resolve to the
//! earliest stored template.

use crate::model::RequestDetails;
use crate::predicate::{LiveRequest, MatchScore};
use crate::store::CompiledPair;
use std::sync::Arc;
use tracing::trace;

/// Winning template and why it won.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Position in the store
    pub index: usize,
    pub pair: Arc<CompiledPair>,
    pub score: MatchScore,
}

/// Best matching template, or `None` when no template survives elimination.
pub fn find_best_match(
    request: &RequestDetails,
    templates: &[Arc<CompiledPair>],
) -> Option<MatchResult> {
    let live = LiveRequest::new(request);
    let mut best: Option<(usize, MatchScore)> = None;

    for (index, candidate) in templates.iter().enumerate() {
        let Some(score) = candidate.template.evaluate(&live) else {
            continue;
        };
        trace!(index, specified = score.specified, "Template survived");

        let better = match &best {
            None => true,
            Some((_, current)) => score.outranks(current),
        };
        if better {
            best = Some((index, score));
        }
    }

    best.map(|(index, score)| MatchResult {
        index,
        pair: Arc::clone(&templates[index]),
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RequestTemplate, ResponseDetails, TemplatePair};
    use crate::predicate::FieldMatcher;
    use crate::store::compile_pairs;

    fn template(
        method: Option<FieldMatcher>,
        path: Option<FieldMatcher>,
        body: &str,
    ) -> TemplatePair {
        TemplatePair::new(
            RequestTemplate {
                method,
                path,
                ..Default::default()
            },
            ResponseDetails::new(200, body),
        )
    }

    fn get(path: &str) -> RequestDetails {
        RequestDetails {
            method: "GET".to_string(),
            path: path.to_string(),
            destination: "api.example.com".to_string(),
            scheme: "http".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_specific_literal_beats_glob() {
        let templates = compile_pairs(vec![
            template(
                Some(FieldMatcher::exact("GET")),
                Some(FieldMatcher::glob("/users/*")),
                "any",
            ),
            template(
                Some(FieldMatcher::exact("GET")),
                Some(FieldMatcher::exact("/users/1")),
                "u1",
            ),
        ])
        .unwrap();

        let result = find_best_match(&get("/users/1"), &templates).unwrap();
        assert_eq!(result.index, 1);
        assert_eq!(result.pair.pair.response.body, "u1");

        let result = find_best_match(&get("/users/2"), &templates).unwrap();
        assert_eq!(result.pair.pair.response.body, "any");
    }

    #[test]
    fn test_more_specified_fields_win_regardless_of_order() {
        let templates = compile_pairs(vec![
            template(None, Some(FieldMatcher::exact("/users/1")), "path-only"),
            template(
                Some(FieldMatcher::exact("GET")),
                Some(FieldMatcher::exact("/users/1")),
                "method-and-path",
            ),
        ])
        .unwrap();

        let result = find_best_match(&get("/users/1"), &templates).unwrap();
        assert_eq!(result.pair.pair.response.body, "method-and-path");
        assert_eq!(result.score.fields, vec!["method", "path"]);
    }

    #[test]
    fn test_equal_rank_resolves_to_earliest() {
        let templates = compile_pairs(vec![
            template(None, Some(FieldMatcher::exact("/x")), "first"),
            template(None, Some(FieldMatcher::exact("/x")), "second"),
        ])
        .unwrap();

        for _ in 0..5 {
            let result = find_best_match(&get("/x"), &templates).unwrap();
            assert_eq!(result.index, 0);
        }
    }

    #[test]
    fn test_literal_beats_pattern_at_equal_specificity() {
        let templates = compile_pairs(vec![
            template(None, Some(FieldMatcher::regex("^/x$")), "regex"),
            template(None, Some(FieldMatcher::exact("/x")), "exact"),
        ])
        .unwrap();

        let result = find_best_match(&get("/x"), &templates).unwrap();
        assert_eq!(result.pair.pair.response.body, "exact");
    }

    #[test]
    fn test_no_survivor_is_no_match() {
        let templates = compile_pairs(vec![template(
            Some(FieldMatcher::exact("GET")),
            Some(FieldMatcher::exact("/users/1")),
            "u1",
        )])
        .unwrap();

        let mut request = get("/missing");
        request.method = "POST".to_string();
        assert!(find_best_match(&request, &templates).is_none());
        assert!(find_best_match(&get("/users/1"), &[]).is_none());
    }
}
