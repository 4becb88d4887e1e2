//! Per-engine aggregate counters.

use crate::mode::Mode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    /// Indexed by `Mode as usize`
    exchanges: [AtomicU64; 4],
    pub matches: AtomicU64,
    pub misses: AtomicU64,
    pub cache_hits: AtomicU64,
    pub match_attempts: AtomicU64,
    pub middleware_failures: AtomicU64,
    pub upstream_failures: AtomicU64,
    pub delays_applied: AtomicU64,
}

impl Counters {
    pub fn record_exchange(&self, mode: Mode) {
        self.exchanges[mode as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        Stats {
            counts: Mode::ALL
                .into_iter()
                .map(|mode| (mode.as_str().to_string(), load(&self.exchanges[mode as usize])))
                .collect(),
            matches: load(&self.matches),
            misses: load(&self.misses),
            cache_hits: load(&self.cache_hits),
            match_attempts: load(&self.match_attempts),
            middleware_failures: load(&self.middleware_failures),
            upstream_failures: load(&self.upstream_failures),
            delays_applied: load(&self.delays_applied),
        }
    }
}

/// Point-in-time statistics. Reading them never resets the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Exchanges handled per mode
    pub counts: BTreeMap<String, u64>,
    /// Requests answered from a template or captured exchange
    pub matches: u64,
    /// Requests nothing matched
    pub misses: u64,
    pub cache_hits: u64,
    /// Times the matcher ran over the store
    pub match_attempts: u64,
    pub middleware_failures: u64,
    pub upstream_failures: u64,
    pub delays_applied: u64,
}
