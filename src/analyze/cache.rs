//! Process-wide result cache.
//!
//! Keys are a fixed-length prefix of the normalized text, so long texts that
//! share a prefix share a result. Eviction is FIFO by insertion: when the cache
//! grows past capacity the oldest 10% of entries are dropped. Lookups do not
//! refresh an entry's age.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use metrics::{counter, gauge};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::model::{Category, ConfidenceScores, Sentiment};

/// Fraction of entries dropped per eviction.
const EVICT_FRACTION: f64 = 0.10;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Trim, collapse whitespace runs, keep the first `chars` characters.
/// Case is preserved.
pub fn cache_key(text: &str, chars: usize) -> String {
    let collapsed = RE_WS.replace_all(text.trim(), " ");
    collapsed.chars().take(chars).collect()
}

/// Cached four-way result for a text key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheEntry {
    pub sentiment: Sentiment,
    pub category: Category,
    pub is_spam: bool,
    pub quality_score: f32,
    pub confidence_scores: ConfidenceScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    /// hits / (hits + misses); 0 before any lookup.
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Inner {
    map: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

#[derive(Debug)]
pub struct ResultCache {
    inner: Mutex<Inner>,
    capacity: usize,
    key_chars: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: usize, key_chars: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            key_chars: key_chars.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn key_for(&self, text: &str) -> String {
        cache_key(text, self.key_chars)
    }

    pub fn lookup(&self, text: &str) -> Option<CacheEntry> {
        let key = self.key_for(text);
        let hit = self.lock().map.get(&key).copied();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("analyzer_cache_hits_total").increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            counter!("analyzer_cache_misses_total").increment(1);
        }
        hit
    }

    /// Insert or overwrite. Overwriting keeps the entry's original position in
    /// the eviction order.
    pub fn store(&self, text: &str, entry: CacheEntry) {
        self.store_many(std::iter::once((text, entry)));
    }

    /// Store a whole batch under one lock.
    pub fn store_many<'a, I>(&self, entries: I)
    where
        I: IntoIterator<Item = (&'a str, CacheEntry)>,
    {
        let mut inner = self.lock();
        for (text, entry) in entries {
            let key = self.key_for(text);
            if inner.map.insert(key.clone(), entry).is_none() {
                inner.order.push_back(key);
            }
        }
        if inner.map.len() > self.capacity {
            let evicted = self.evict(&mut inner);
            tracing::debug!(target: "cache", evicted, remaining = inner.map.len(), "cache eviction");
            counter!("analyzer_cache_evictions_total").increment(evicted as u64);
        }
        gauge!("analyzer_cache_entries").set(inner.map.len() as f64);
    }

    fn evict(&self, inner: &mut Inner) -> usize {
        let n = ((inner.map.len() as f64 * EVICT_FRACTION).ceil() as usize)
            .max(inner.map.len() - self.capacity);
        let mut evicted = 0;
        while evicted < n {
            let Some(old) = inner.order.pop_front() else {
                break;
            };
            if inner.map.remove(&old).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// Drop every entry; returns how many there were. Hit/miss counters are kept.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.map.len();
        inner.map.clear();
        inner.order.clear();
        gauge!("analyzer_cache_entries").set(0.0);
        dropped
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            entries: self.len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(q: f32) -> CacheEntry {
        CacheEntry {
            sentiment: Sentiment::Neutral,
            category: Category::General,
            is_spam: false,
            quality_score: q,
            confidence_scores: ConfidenceScores::uniform(0.3),
        }
    }

    #[test]
    fn key_normalizes_whitespace_but_not_case() {
        assert_eq!(cache_key("  Nice \n\t serum  ", 100), "Nice serum");
        assert_ne!(cache_key("Nice", 100), cache_key("nice", 100));
        assert_eq!(cache_key("abcdef", 3), "abc");
    }

    #[test]
    fn long_texts_with_shared_prefix_share_an_entry() {
        let cache = ResultCache::new(10, 10);
        cache.store("0123456789 first tail", entry(0.9));
        let hit = cache.lookup("0123456789 another tail").expect("prefix hit");
        assert_eq!(hit.quality_score, 0.9);
    }

    #[test]
    fn hit_and_miss_counters() {
        let cache = ResultCache::new(10, 100);
        assert!(cache.lookup("a").is_none());
        cache.store("a", entry(0.5));
        assert!(cache.lookup("a").is_some());
        let s = cache.stats();
        assert_eq!((s.hits, s.misses, s.entries), (1, 1, 1));
        assert!((s.hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn overflow_evicts_oldest_tenth() {
        let cache = ResultCache::new(20, 100);
        for i in 0..21 {
            cache.store(&format!("text {i}"), entry(0.5));
        }
        // 21 entries > 20: drop ceil(2.1) = 3 oldest
        assert_eq!(cache.len(), 18);
        assert!(cache.lookup("text 0").is_none());
        assert!(cache.lookup("text 2").is_none());
        assert!(cache.lookup("text 3").is_some());
        assert!(cache.lookup("text 20").is_some());
    }

    #[test]
    fn clear_empties_entries_but_keeps_counters() {
        let cache = ResultCache::new(10, 100);
        cache.store("a", entry(0.5));
        cache.store("b", entry(0.5));
        assert!(cache.lookup("a").is_some());
        assert_eq!(cache.clear(), 2);
        assert!(cache.lookup("a").is_none());
        let s = cache.stats();
        assert_eq!((s.hits, s.misses, s.entries), (1, 1, 0));
    }

    #[test]
    fn lookup_does_not_refresh_age() {
        let cache = ResultCache::new(2, 100);
        cache.store("old", entry(0.1));
        cache.store("mid", entry(0.2));
        assert!(cache.lookup("old").is_some());
        cache.store("new", entry(0.3));
        assert!(cache.lookup("old").is_none());
        assert!(cache.lookup("new").is_some());
    }
}
