//! Dex search: global search over the catalog index and input debouncing.

#![forbid(unsafe_code)]

use std::time::Duration;

pub mod debounce;
mod engine;

pub use debounce::{Debouncer, DEFAULT_DEBOUNCE};
pub use engine::{match_entries, normalize_query, SearchEngine, SearchOutcome, SearchSnapshot};

pub const DEFAULT_RESULT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    pub limit: usize,
    pub debounce: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { limit: DEFAULT_RESULT_LIMIT, debounce: DEFAULT_DEBOUNCE }
    }
}

impl SearchConfig {
    /// Defaults overridden by `DEX_SEARCH_LIMIT` and `DEX_SEARCH_DEBOUNCE_MS`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = std::env::var("DEX_SEARCH_LIMIT").ok().and_then(|s| s.parse::<usize>().ok()).filter(|n| *n > 0) {
            cfg.limit = n;
        }
        if let Some(ms) = std::env::var("DEX_SEARCH_DEBOUNCE_MS").ok().and_then(|s| s.parse::<u64>().ok()) {
            cfg.debounce = Duration::from_millis(ms);
        }
        cfg
    }
}
