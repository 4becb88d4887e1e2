//! Interaction store: the ordered template collection and response delay rules.
//!
//! Readers take an `Arc` snapshot and never hold the lock while matching. Writers
//! build a complete replacement state and swap it in, so a partially applied
//! import is never observable.

use crate::delay::{ResponseDelay, ResponseDelayList};
use crate::error::EngineError;
use crate::model::TemplatePair;
use crate::predicate::{CompiledTemplate, RequestField};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// A stored template with its compiled predicate.
#[derive(Debug)]
pub struct CompiledPair {
    pub pair: TemplatePair,
    pub template: CompiledTemplate,
}

impl CompiledPair {
    pub fn compile(pair: TemplatePair) -> Result<Self, regex::Error> {
        let template = CompiledTemplate::compile(&pair.request)?;
        Ok(Self { pair, template })
    }
}

/// One consistent view of the store.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub templates: Vec<Arc<CompiledPair>>,
    pub delays: Arc<ResponseDelayList>,
    /// Lowercased names of every header some template constrains
    pub header_names: BTreeSet<String>,
    /// Fields some template constrains with a pattern matcher
    pub raw_fields: BTreeSet<RequestField>,
}

impl StoreSnapshot {
    fn with_templates(templates: Vec<Arc<CompiledPair>>, delays: Arc<ResponseDelayList>) -> Self {
        let header_names = templates
            .iter()
            .flat_map(|t| t.template.header_names().map(str::to_string))
            .collect();
        let raw_fields = templates
            .iter()
            .flat_map(|t| t.template.raw_fields())
            .collect();
        Self {
            templates,
            delays,
            header_names,
            raw_fields,
        }
    }
}

/// Compile templates in order, failing on the first invalid one.
pub fn compile_pairs(pairs: Vec<TemplatePair>) -> Result<Vec<Arc<CompiledPair>>, EngineError> {
    pairs
        .into_iter()
        .enumerate()
        .map(|(index, pair)| {
            CompiledPair::compile(pair)
                .map(Arc::new)
                .map_err(|e| EngineError::InvalidTemplate {
                    index,
                    reason: e.to_string(),
                })
        })
        .collect()
}

#[derive(Default)]
pub struct InteractionStore {
    state: RwLock<Arc<StoreSnapshot>>,
}

impl InteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        Arc::clone(&self.state.read())
    }

    pub fn len(&self) -> usize {
        self.state.read().templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace templates and delays together. Both inputs are validated before
    /// anything is swapped in.
    pub fn replace(
        &self,
        pairs: Vec<TemplatePair>,
        delays: Vec<ResponseDelay>,
    ) -> Result<(), EngineError> {
        let templates = compile_pairs(pairs)?;
        let delays = Arc::new(ResponseDelayList::compile(delays)?);
        let count = templates.len();

        *self.state.write() = Arc::new(StoreSnapshot::with_templates(templates, delays));
        info!("Interaction store replaced with {} templates", count);
        Ok(())
    }

    /// Append a template (captured exchanges).
    pub fn append(&self, pair: TemplatePair) -> Result<(), EngineError> {
        let index = self.len();
        let compiled = CompiledPair::compile(pair).map_err(|e| EngineError::InvalidTemplate {
            index,
            reason: e.to_string(),
        })?;

        let mut state = self.state.write();
        let mut next = StoreSnapshot::clone(&state);
        next.header_names
            .extend(compiled.template.header_names().map(str::to_string));
        next.raw_fields.extend(compiled.template.raw_fields());
        next.templates.push(Arc::new(compiled));
        *state = Arc::new(next);
        debug!("Appended template #{}", state.templates.len() - 1);
        Ok(())
    }

    pub fn set_delays(&self, delays: Vec<ResponseDelay>) -> Result<(), EngineError> {
        let delays = Arc::new(ResponseDelayList::compile(delays)?);
        let mut state = self.state.write();
        let mut next = StoreSnapshot::clone(&state);
        next.delays = delays;
        *state = Arc::new(next);
        Ok(())
    }

    pub fn clear(&self) {
        *self.state.write() = Arc::new(StoreSnapshot::default());
        info!("Interaction store cleared");
    }

    /// Templates in stored order.
    pub fn pairs(&self) -> Vec<TemplatePair> {
        self.snapshot()
            .templates
            .iter()
            .map(|t| t.pair.clone())
            .collect()
    }

    pub fn delays(&self) -> Vec<ResponseDelay> {
        self.snapshot().delays.rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Headers, RequestTemplate, ResponseDetails};
    use crate::predicate::FieldMatcher;

    fn pair(path: FieldMatcher, body: &str) -> TemplatePair {
        TemplatePair::new(
            RequestTemplate {
                path: Some(path),
                ..Default::default()
            },
            ResponseDetails::new(200, body),
        )
    }

    fn delay(pattern: &str) -> ResponseDelay {
        ResponseDelay {
            url_pattern: pattern.to_string(),
            http_method: String::new(),
            delay: 10,
        }
    }

    #[test]
    fn test_replace_preserves_order() {
        let store = InteractionStore::new();
        store
            .replace(
                vec![
                    pair(FieldMatcher::exact("/a"), "a"),
                    pair(FieldMatcher::exact("/b"), "b"),
                ],
                vec![delay("a"), delay("b")],
            )
            .unwrap();

        let bodies: Vec<_> = store.pairs().into_iter().map(|p| p.response.body).collect();
        assert_eq!(bodies, vec!["a", "b"]);
        let patterns: Vec<_> = store.delays().into_iter().map(|d| d.url_pattern).collect();
        assert_eq!(patterns, vec!["a", "b"]);
    }

    #[test]
    fn test_invalid_template_keeps_previous_state() {
        let store = InteractionStore::new();
        store
            .replace(vec![pair(FieldMatcher::exact("/a"), "a")], vec![])
            .unwrap();

        let err = store
            .replace(
                vec![
                    pair(FieldMatcher::exact("/b"), "b"),
                    pair(FieldMatcher::regex("(broken"), "c"),
                ],
                vec![],
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTemplate { index: 1, .. }));
        assert_eq!(store.len(), 1);
        assert_eq!(store.pairs()[0].response.body, "a");
    }

    #[test]
    fn test_invalid_delay_keeps_previous_state() {
        let store = InteractionStore::new();
        store
            .replace(vec![pair(FieldMatcher::exact("/a"), "a")], vec![delay("ok")])
            .unwrap();

        assert!(store.replace(vec![], vec![delay("[")]).is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.delays().len(), 1);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let store = InteractionStore::new();
        let before = store.snapshot();
        store.append(pair(FieldMatcher::exact("/a"), "a")).unwrap();

        assert!(before.templates.is_empty());
        assert_eq!(store.snapshot().templates.len(), 1);
    }

    #[test]
    fn test_header_names_are_collected() {
        let store = InteractionStore::new();
        let mut with_header = pair(FieldMatcher::exact("/a"), "a");
        with_header.request.headers =
            Headers::from([("X-Tenant".to_string(), vec!["acme".to_string()])]);
        store.replace(vec![with_header], vec![]).unwrap();

        assert!(store.snapshot().header_names.contains("x-tenant"));

        store.clear();
        assert!(store.snapshot().header_names.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_pattern_fields_are_collected() {
        let store = InteractionStore::new();
        store
            .replace(vec![pair(FieldMatcher::exact("/a"), "a")], vec![])
            .unwrap();
        assert!(store.snapshot().raw_fields.is_empty());

        store.append(pair(FieldMatcher::glob("/b/*"), "b")).unwrap();
        assert_eq!(
            store.snapshot().raw_fields,
            BTreeSet::from([RequestField::Path])
        );
    }
}
