//! In-process response cache with TTL expiry and strict LRU eviction.
//!
//! Keys are [`Fingerprint`]s: a SHA-256 over the normalized query text, the
//! model name and the sampling temperature. Superficial differences in case
//! or spacing therefore share one entry.

use crate::textutil::normalize_for_key;
use crate::types::{Message, Role};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Normalized request identity shared by the cache and the deduplicator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a conversation by its latest user query.
    ///
    /// Falls back to the full transcript when no user message exists.
    pub fn for_request(messages: &[Message], model: &str, temperature: f64) -> Self {
        let query = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| normalize_for_key(&message.content))
            .unwrap_or_else(|| {
                messages
                    .iter()
                    .map(|message| normalize_for_key(&message.content))
                    .collect::<Vec<_>>()
                    .join("\n")
            });
        Self::from_parts(&query, model, temperature)
    }

    fn from_parts(query: &str, model: &str, temperature: f64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        hasher.update([0u8]);
        hasher.update(model.trim().as_bytes());
        hasher.update([0u8]);
        // Fixed precision so 0.1 and 0.10000000001 land together.
        hasher.update(format!("{temperature:.4}").as_bytes());
        let digest = hasher.finalize();
        Self(digest.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Twelve hex chars are plenty for log correlation.
        write!(f, "{}", &self.0[..self.0.len().min(12)])
    }
}

/// Read-only cache counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<Fingerprint, CacheEntry>,
    /// Recency order, least recently used at the front.
    order: VecDeque<Fingerprint>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn touch(&mut self, key: &Fingerprint) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }

    fn forget(&mut self, key: &Fingerprint) {
        self.entries.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

/// Bounded LRU + TTL response cache, safe to share across tasks.
#[derive(Debug)]
pub struct ResponseCache {
    capacity: usize,
    default_ttl: Duration,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            default_ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the cached value and mark it most recently used.
    ///
    /// Expired entries are removed here and count as a miss.
    pub fn lookup(&self, key: &Fingerprint) -> Option<String> {
        self.lookup_at(key, Instant::now())
    }

    fn lookup_at(&self, key: &Fingerprint, now: Instant) -> Option<String> {
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            state.forget(key);
            state.misses += 1;
            tracing::debug!(key = %key, "cache entry expired");
            return None;
        }
        state.hits += 1;
        state.touch(key);
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or replace a value, evicting the LRU entry when full.
    pub fn store(&self, key: Fingerprint, value: String, ttl: Duration) {
        self.store_at(key, value, ttl, Instant::now());
    }

    fn store_at(&self, key: Fingerprint, value: String, ttl: Duration, now: Instant) {
        let mut state = self.lock();
        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
                state.evictions += 1;
                tracing::debug!(key = %oldest, "cache evicted least recently used entry");
            }
        }
        state.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at: now,
                ttl,
            },
        );
        state.touch(&key);
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            size: state.entries.len(),
            capacity: self.capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // A panic while holding the lock leaves plain data behind; keep serving.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: usize) -> Fingerprint {
        Fingerprint::from_parts(&format!("query {n}"), "m", 0.1)
    }

    const TTL: Duration = Duration::from_secs(300);

    #[test]
    fn fingerprint_ignores_case_and_spacing() {
        let a = Fingerprint::for_request(&[Message::user("Test Query")], "grok", 0.1);
        let b = Fingerprint::for_request(&[Message::user("test query")], "grok", 0.1);
        let c = Fingerprint::for_request(&[Message::user("  Test   Query\n")], "grok", 0.1);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn fingerprint_includes_model_and_temperature() {
        let msgs = [Message::user("test")];
        let base = Fingerprint::for_request(&msgs, "grok", 0.1);
        assert_ne!(base, Fingerprint::for_request(&msgs, "grok", 0.5));
        assert_ne!(base, Fingerprint::for_request(&msgs, "other", 0.1));
    }

    #[test]
    fn fingerprint_keys_on_latest_user_query() {
        let first = vec![Message::system("sys"), Message::user("list files")];
        let later = vec![
            Message::system("sys"),
            Message::user("list files"),
            Message::assistant("ls -la"),
            Message::user("List files"),
        ];
        assert_eq!(
            Fingerprint::for_request(&first, "m", 0.1),
            Fingerprint::for_request(&later, "m", 0.1)
        );
    }

    #[test]
    fn lookup_returns_stored_value_until_ttl() {
        let cache = ResponseCache::new(4, TTL);
        let start = Instant::now();
        cache.store_at(key(1), "v1".into(), Duration::from_secs(10), start);
        assert_eq!(
            cache.lookup_at(&key(1), start + Duration::from_secs(9)),
            Some("v1".into())
        );
        assert_eq!(cache.lookup_at(&key(1), start + Duration::from_secs(10)), None);
        // Lazily evicted on that access.
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn storing_beyond_capacity_evicts_least_recently_touched() {
        let cache = ResponseCache::new(3, TTL);
        for n in 0..3 {
            cache.store(key(n), format!("v{n}"), TTL);
        }
        // Touch key 0 so key 1 becomes the LRU entry.
        assert!(cache.lookup(&key(0)).is_some());
        cache.store(key(3), "v3".into(), TTL);

        assert!(cache.lookup(&key(1)).is_none());
        assert!(cache.lookup(&key(0)).is_some());
        assert!(cache.lookup(&key(2)).is_some());
        assert!(cache.lookup(&key(3)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn replacing_existing_key_does_not_evict() {
        let cache = ResponseCache::new(2, TTL);
        cache.store(key(0), "a".into(), TTL);
        cache.store(key(1), "b".into(), TTL);
        cache.store(key(0), "c".into(), TTL);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.lookup(&key(0)), Some("c".into()));
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = ResponseCache::new(2, TTL);
        cache.store(key(0), "a".into(), TTL);
        let _ = cache.lookup(&key(0));
        let _ = cache.lookup(&key(9));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn concurrent_access_keeps_size_bounded() {
        let cache = std::sync::Arc::new(ResponseCache::new(8, TTL));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for n in 0..50 {
                        cache.store(key(t * 100 + n), "v".into(), TTL);
                        let _ = cache.lookup(&key(n));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.stats().size <= 8);
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn n_plus_one_distinct_keys_evict_exactly_the_first(capacity in 1usize..24) {
                let cache = ResponseCache::new(capacity, TTL);
                for n in 0..=capacity {
                    cache.store(key(n), n.to_string(), TTL);
                }
                prop_assert!(cache.lookup(&key(0)).is_none());
                for n in 1..=capacity {
                    prop_assert_eq!(cache.lookup(&key(n)), Some(n.to_string()));
                }
                prop_assert_eq!(cache.stats().evictions, 1);
            }
        }
    }
}
