//! Request/response pairs: concrete exchanges and stored templates.

use super::request::{RequestDetails, RequestTemplate};
use super::response::ResponseDetails;
use serde::{Deserialize, Serialize};

/// A concrete exchange. This is also the payload shape middleware reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResponsePair {
    pub request: RequestDetails,
    pub response: ResponseDetails,
}

impl RequestResponsePair {
    pub fn new(request: RequestDetails, response: ResponseDetails) -> Self {
        Self { request, response }
    }
}

/// A stored template: request matchers plus the response to serve.
/// Immutable once stored; edits replace it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplatePair {
    pub request: RequestTemplate,
    pub response: ResponseDetails,
}

impl TemplatePair {
    pub fn new(request: RequestTemplate, response: ResponseDetails) -> Self {
        Self { request, response }
    }

    /// Template recorded from a live exchange.
    pub fn captured(pair: &RequestResponsePair) -> Self {
        Self {
            request: RequestTemplate::captured(&pair.request),
            response: pair.response.clone(),
        }
    }
}
