//! Per-exchange dispatch over the current mode.

use super::stats::Counters;
use super::{Engine, Settings};
use crate::cache::{CacheEntry, Fingerprint};
use crate::delay::apply_delay;
use crate::matching::find_best_match;
use crate::metrics;
use crate::middleware::{Middleware, MiddlewareError};
use crate::mode::Mode;
use crate::model::{RequestDetails, RequestResponsePair, ResponseDetails, TemplatePair};
use crate::store::StoreSnapshot;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Header set on every response the engine produces as an error.
pub const ERROR_HEADER: &str = "x-doppel-error";

/// What the transport should do with an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Send this response to the client
    Respond(ResponseDetails),
    /// Not handled here: pass the request through untouched
    Forward,
}

/// Error response produced by the engine itself.
fn error_response(status: u16, message: &str) -> ResponseDetails {
    ResponseDetails::new(status, format!("doppel: {message}\n")).with_header(ERROR_HEADER, "true")
}

fn describe(request: &RequestDetails) -> String {
    let mut url = format!(
        "{} {}://{}{}",
        request.method, request.scheme, request.destination, request.path
    );
    if !request.query.is_empty() {
        url.push('?');
        url.push_str(&request.query);
    }
    url
}

type Handled = Result<ResponseDetails, ResponseDetails>;

impl Engine {
    /// Handle one inbound exchange.
    pub async fn handle(&self, request: RequestDetails) -> Outcome {
        let settings = self.settings.read().clone();

        if !self.modes.is_webserver() && !settings.destination.matches(&request.destination) {
            debug!(destination = %request.destination, "Destination not handled, passing through");
            metrics::record_request("passthrough");
            return Outcome::Forward;
        }

        let mode = settings.mode;
        self.counters.record_exchange(mode);
        metrics::record_request(mode.as_str());

        // Generation before snapshot: a store replaced after this point also
        // flushes the cache, which voids anything computed from the old snapshot.
        let generation = self.cache.generation();
        let store = self.store.snapshot();
        let rule_delay = store.delays.delay_for(&request);

        let handled = match mode {
            Mode::Capture => self.capture(request, &settings, &store, generation).await,
            Mode::Simulate => self.simulate(request, &settings, &store, generation).await,
            Mode::Modify => self.modify(request, &settings).await,
            Mode::Synthesize => self.synthesize(request, &settings).await,
        };

        match handled {
            Ok(response) => {
                self.delay(&response, rule_delay).await;
                Outcome::Respond(response)
            }
            Err(response) => Outcome::Respond(response),
        }
    }

    async fn delay(&self, response: &ResponseDetails, rule_delay: Duration) {
        let (delay, source) = match response.fixed_delay() {
            Some(fixed) => (fixed, "fixed"),
            None => (rule_delay, "rule"),
        };
        if delay.is_zero() {
            return;
        }
        Counters::bump(&self.counters.delays_applied);
        metrics::record_delay(source, delay);
        debug!(delay_ms = delay.as_millis() as u64, source, "Delaying response");
        apply_delay(delay).await;
    }

    fn fingerprint(&self, request: &RequestDetails, store: &StoreSnapshot) -> Fingerprint {
        let significant: Cow<'_, BTreeSet<String>> = if store.header_names.is_empty() {
            Cow::Borrowed(&self.significant_headers)
        } else {
            Cow::Owned(
                self.significant_headers
                    .union(&store.header_names)
                    .cloned()
                    .collect(),
            )
        };
        Fingerprint::of(request, &significant, &store.raw_fields)
    }

    async fn forward(&self, request: &RequestDetails, mode: Mode) -> Handled {
        self.upstream.forward(request).await.map_err(|e| {
            error!(mode = %mode, request = %describe(request), "Upstream failed: {}", e);
            Counters::bump(&self.counters.upstream_failures);
            metrics::record_upstream_failure(mode.as_str());
            error_response(502, &format!("upstream failed: {e}"))
        })
    }

    /// Run middleware, rejecting output whose status is not an HTTP status.
    async fn run_middleware(
        &self,
        middleware: &Middleware,
        pair: RequestResponsePair,
    ) -> Result<RequestResponsePair, MiddlewareError> {
        let result = middleware.execute(pair).await.and_then(|pair| {
            if pair.response.has_valid_status() {
                Ok(pair)
            } else {
                Err(MiddlewareError::MalformedOutput(format!(
                    "response status {} is not an HTTP status",
                    pair.response.status
                )))
            }
        });
        match &result {
            Ok(_) => metrics::record_middleware("ok"),
            Err(e) => {
                Counters::bump(&self.counters.middleware_failures);
                metrics::record_middleware(e.kind());
            }
        }
        result
    }

    /// Middleware as an enhancement: on failure the untransformed pair is kept.
    async fn transform_or_keep(
        &self,
        settings: &Settings,
        pair: RequestResponsePair,
    ) -> RequestResponsePair {
        let Some(middleware) = &settings.middleware else {
            return pair;
        };
        match self.run_middleware(middleware, pair.clone()).await {
            Ok(transformed) => transformed,
            Err(e) => {
                warn!(kind = e.kind(), "Middleware failed, using untransformed pair: {}", e);
                pair
            }
        }
    }

    async fn capture(
        &self,
        request: RequestDetails,
        settings: &Settings,
        store: &StoreSnapshot,
        generation: u64,
    ) -> Handled {
        let fingerprint = self.fingerprint(&request, store);
        let response = self.forward(&request, Mode::Capture).await?;
        let pair = self
            .transform_or_keep(settings, RequestResponsePair::new(request, response))
            .await;

        if let Err(e) = self.store.append(TemplatePair::captured(&pair)) {
            warn!("Captured exchange not stored: {}", e);
        }
        self.cache.store(
            fingerprint,
            CacheEntry::Captured(Arc::new(pair.clone())),
            generation,
        );
        debug!(request = %describe(&pair.request), status = pair.response.status, "Captured");
        Ok(pair.response)
    }

    async fn simulate(
        &self,
        request: RequestDetails,
        settings: &Settings,
        store: &StoreSnapshot,
        generation: u64,
    ) -> Handled {
        let fingerprint = self.fingerprint(&request, store);

        let entry = match self.cache.lookup(&fingerprint) {
            Some(entry) => {
                Counters::bump(&self.counters.cache_hits);
                metrics::record_cache_lookup(true);
                entry
            }
            None => {
                metrics::record_cache_lookup(false);
                Counters::bump(&self.counters.match_attempts);
                let entry = match find_best_match(&request, &store.templates) {
                    Some(found) => CacheEntry::Matched {
                        index: found.index,
                        pair: found.pair,
                        score: found.score,
                    },
                    None => CacheEntry::Unmatched,
                };
                self.cache.store(fingerprint, entry.clone(), generation);
                entry
            }
        };

        let Some(response) = entry.response() else {
            Counters::bump(&self.counters.misses);
            metrics::record_match(false);
            debug!(request = %describe(&request), "No template matched");
            return Err(error_response(
                502,
                &format!("no match for {}", describe(&request)),
            ));
        };

        Counters::bump(&self.counters.matches);
        metrics::record_match(true);
        if let CacheEntry::Matched { index, score, .. } = &entry {
            debug!(index, fields = ?score.fields, "Template matched");
        }

        let pair = RequestResponsePair::new(request, response.clone());
        Ok(self.transform_or_keep(settings, pair).await.response)
    }

    async fn modify(&self, request: RequestDetails, settings: &Settings) -> Handled {
        let Some(middleware) = &settings.middleware else {
            return Err(error_response(503, "modify mode requires middleware"));
        };
        let response = self.forward(&request, Mode::Modify).await?;
        self.run_middleware(middleware, RequestResponsePair::new(request, response))
            .await
            .map(|pair| pair.response)
            .map_err(|e| {
                warn!(kind = e.kind(), "Middleware failed in modify mode: {}", e);
                error_response(503, &format!("middleware failed: {e}"))
            })
    }

    async fn synthesize(&self, request: RequestDetails, settings: &Settings) -> Handled {
        let Some(middleware) = &settings.middleware else {
            return Err(error_response(503, "synthesize mode requires middleware"));
        };
        let pair = RequestResponsePair::new(request, ResponseDetails::default());
        self.run_middleware(middleware, pair)
            .await
            .map(|pair| pair.response)
            .map_err(|e| {
                warn!(kind = e.kind(), "Middleware failed in synthesize mode: {}", e);
                error_response(503, &format!("middleware failed: {e}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_is_marked() {
        let response = error_response(502, "no match for GET http://x/");
        assert_eq!(response.status, 502);
        assert!(response.body.starts_with("doppel: no match"));
        assert_eq!(
            response.headers.get(ERROR_HEADER),
            Some(&vec!["true".to_string()])
        );
    }

    #[test]
    fn test_describe_includes_query() {
        let request = RequestDetails {
            method: "POST".to_string(),
            scheme: "https".to_string(),
            destination: "api.example.com".to_string(),
            path: "/missing".to_string(),
            query: "a=1".to_string(),
            ..Default::default()
        };
        assert_eq!(describe(&request), "POST https://api.example.com/missing?a=1");
    }
}
