//! Match-outcome cache keyed by request fingerprint.
//!
//! Entries are spread over independently locked shards so lookups and stores for
//! different fingerprints do not contend. A generation counter guards against
//! stale writes: an entry computed before a flush is dropped instead of stored.
//!
//! Unmatched entries can be capped with [`RequestCache::with_max_unmatched`]. At
//! the cap a new one replaces another unmatched entry from its shard, or is not
//! stored. Matched and captured entries are never evicted.

mod fingerprint;

pub use fingerprint::Fingerprint;

use crate::model::{RequestResponsePair, ResponseDetails};
use crate::predicate::MatchScore;
use crate::store::CompiledPair;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const SHARD_COUNT: usize = 16;

/// Outcome remembered for a fingerprint.
#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// A stored template matched
    Matched {
        index: usize,
        pair: Arc<CompiledPair>,
        score: MatchScore,
    },
    /// Exchange recorded from the upstream
    Captured(Arc<RequestResponsePair>),
    /// Nothing matched
    Unmatched,
}

impl CacheEntry {
    /// Response to serve, if the outcome has one.
    pub fn response(&self) -> Option<&ResponseDetails> {
        match self {
            CacheEntry::Matched { pair, .. } => Some(&pair.pair.response),
            CacheEntry::Captured(pair) => Some(&pair.response),
            CacheEntry::Unmatched => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CacheEntry::Matched { .. } => "matched",
            CacheEntry::Captured(_) => "captured",
            CacheEntry::Unmatched => "unmatched",
        }
    }
}

/// Serializable view of one entry, for inspection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryView {
    pub fingerprint: Fingerprint,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseDetails>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched_fields: Vec<String>,
}

impl CacheEntryView {
    fn new(fingerprint: &Fingerprint, entry: &CacheEntry) -> Self {
        let (template_index, matched_fields) = match entry {
            CacheEntry::Matched { index, score, .. } => (Some(*index), score.fields.clone()),
            _ => (None, Vec::new()),
        };
        Self {
            fingerprint: fingerprint.clone(),
            kind: entry.kind(),
            template_index,
            response: entry.response().cloned(),
            matched_fields,
        }
    }
}

type Shard = RwLock<HashMap<Fingerprint, CacheEntry>>;

pub struct RequestCache {
    shards: Vec<Shard>,
    hasher: RandomState,
    generation: AtomicU64,
    /// Cap on unmatched entries; 0 means unbounded
    max_unmatched: usize,
    unmatched: AtomicUsize,
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCache {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
            hasher: RandomState::new(),
            generation: AtomicU64::new(0),
            max_unmatched: 0,
            unmatched: AtomicUsize::new(0),
        }
    }

    /// Cache holding at most `max` unmatched entries (0 for no limit).
    pub fn with_max_unmatched(max: usize) -> Self {
        Self {
            max_unmatched: max,
            ..Self::new()
        }
    }

    fn shard(&self, fingerprint: &Fingerprint) -> &Shard {
        let index = self.hasher.hash_one(fingerprint) as usize % SHARD_COUNT;
        &self.shards[index]
    }

    /// Current generation; read it before computing an entry and pass it to `store`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.shard(fingerprint).read().get(fingerprint).cloned()
    }

    /// Store an entry computed at `generation`. Last writer wins; a write from
    /// before the latest flush is discarded. Returns whether it was kept.
    pub fn store(&self, fingerprint: Fingerprint, entry: CacheEntry, generation: u64) -> bool {
        let mut shard = self.shard(&fingerprint).write();
        if self.generation() != generation {
            debug!(%fingerprint, "Discarding cache entry computed before a flush");
            return false;
        }

        let unmatched = matches!(entry, CacheEntry::Unmatched);
        let replaces_unmatched = matches!(shard.get(&fingerprint), Some(CacheEntry::Unmatched));
        if unmatched
            && !replaces_unmatched
            && self.max_unmatched > 0
            && self.unmatched.load(Ordering::SeqCst) >= self.max_unmatched
        {
            let victim = shard
                .iter()
                .find(|(_, e)| matches!(e, CacheEntry::Unmatched))
                .map(|(fp, _)| fp.clone());
            match victim {
                Some(victim) => {
                    shard.remove(&victim);
                    self.unmatched.fetch_sub(1, Ordering::SeqCst);
                    debug!(%victim, "Evicted unmatched cache entry");
                }
                None => {
                    debug!(%fingerprint, "Unmatched cache entries at capacity, not storing");
                    return false;
                }
            }
        }

        let previous = shard.insert(fingerprint, entry);
        if matches!(previous, Some(CacheEntry::Unmatched)) {
            self.unmatched.fetch_sub(1, Ordering::SeqCst);
        }
        if unmatched {
            self.unmatched.fetch_add(1, Ordering::SeqCst);
        }
        true
    }

    /// Discard every entry.
    pub fn flush(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for shard in &self.shards {
            let mut shard = shard.write();
            let unmatched = shard
                .values()
                .filter(|e| matches!(e, CacheEntry::Unmatched))
                .count();
            shard.clear();
            self.unmatched.fetch_sub(unmatched, Ordering::SeqCst);
        }
        info!("Request cache flushed");
    }

    /// Number of cached unmatched outcomes.
    pub fn unmatched_len(&self) -> usize {
        self.unmatched.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, ordered by fingerprint.
    pub fn entries(&self) -> Vec<CacheEntryView> {
        let mut views: Vec<CacheEntryView> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .iter()
                    .map(|(fp, entry)| CacheEntryView::new(fp, entry))
                    .collect::<Vec<_>>()
            })
            .collect();
        views.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        views
    }
}
