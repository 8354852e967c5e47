//! Bounded cache mapping a raw bearer token to its already-validated claims.
//!
//! Avoids paying the signature-verification cost on every request carrying
//! the same token (hot paths like polling clients re-send one token
//! thousands of times within its lifetime). Sharded by a hash of the token so
//! concurrent lookups for different tokens don't contend on one lock; each
//! shard is capped at a fixed entry count, with the oldest-inserted entry in
//! that shard evicted to make room rather than growing unbounded — the same
//! fixed-capacity discipline as [`crate::context::ContextPool`]. A background
//! task sweeps every shard once a minute to drop entries nobody has read
//! since they expired.

use super::jwt::JwtClaims;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default maximum number of cached tokens, spread evenly across shards.
pub const DEFAULT_CAPACITY: usize = 10_000;

const SHARD_COUNT: usize = 16;
const REAP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    claims: JwtClaims,
    expires_at: u64,
}

struct ShardInner {
    entries: HashMap<String, Entry>,
    insertion_order: VecDeque<String>,
    capacity: usize,
}

struct Shard {
    inner: RwLock<ShardInner>,
}

/// Thread-safe, sharded, fixed-capacity token cache.
pub struct TokenCache {
    shards: Arc<[Shard]>,
}

/// Selects a token's shard with an FNV-1a hash over its raw bytes — tokens
/// are base64url and case-sensitive, so unlike header-name comparisons this
/// needs no ASCII lowering first.
fn shard_index(token: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &byte in token.as_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash as usize) & (SHARD_COUNT - 1)
}

impl TokenCache {
    /// Builds an empty cache holding at most `capacity` entries in total,
    /// spawning its background reaper if a tokio runtime is currently
    /// active (a plain `#[test]` or non-async doctest has none, and simply
    /// runs without periodic sweeping — expired entries are still dropped
    /// lazily on [`get`](Self::get)).
    pub fn new(capacity: usize) -> Self {
        let per_shard = (capacity / SHARD_COUNT).max(1);
        let shards: Arc<[Shard]> = (0..SHARD_COUNT)
            .map(|_| Shard {
                inner: RwLock::new(ShardInner {
                    entries: HashMap::new(),
                    insertion_order: VecDeque::new(),
                    capacity: per_shard,
                }),
            })
            .collect::<Vec<_>>()
            .into();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let shards = shards.clone();
            handle.spawn(async move {
                loop {
                    tokio::time::sleep(REAP_INTERVAL).await;
                    let now = unix_now();
                    for shard in shards.iter() {
                        let mut inner = shard.inner.write().expect("token cache shard poisoned");
                        inner.entries.retain(|_, entry| entry.expires_at > now);
                    }
                }
            });
        }

        Self { shards }
    }

    /// Returns previously cached claims for `token`, unless they've since
    /// expired (in which case the stale entry is dropped and `None` is
    /// returned, same as a cache miss).
    pub fn get(&self, token: &str) -> Option<JwtClaims> {
        let shard = &self.shards[shard_index(token)];
        let now = unix_now();

        {
            let inner = shard.inner.read().expect("token cache shard poisoned");
            match inner.entries.get(token) {
                Some(entry) if entry.expires_at > now => return Some(entry.claims.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut inner = shard.inner.write().expect("token cache shard poisoned");
        inner.entries.remove(token);
        None
    }

    /// Inserts `claims` for `token`, expiring at `expires_at` (a Unix
    /// timestamp, independent of the token's own `exp`), evicting the oldest
    /// entry in the same shard first if it's already at capacity. A
    /// re-insertion of a token already present replaces its claims without
    /// consuming another eviction slot.
    pub fn insert(&self, token: String, claims: JwtClaims, expires_at: u64) {
        let shard = &self.shards[shard_index(&token)];
        let mut inner = shard.inner.write().expect("token cache shard poisoned");

        if !inner.entries.contains_key(&token) {
            if inner.entries.len() >= inner.capacity {
                if let Some(oldest) = inner.insertion_order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
            inner.insertion_order.push_back(token.clone());
        }

        inner.entries.insert(token, Entry { claims, expires_at });
    }

    /// Number of entries currently cached across all shards, including any
    /// not yet pruned for expiry.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.inner.read().expect("token cache shard poisoned").entries.len())
            .sum()
    }

    /// Whether the cache currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: u64) -> JwtClaims {
        JwtClaims {
            sub: "user".into(),
            iat: 0,
            exp,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn caches_and_returns_unexpired_claims() {
        let cache = TokenCache::new(4 * SHARD_COUNT);
        let exp = unix_now() + 3600;
        cache.insert("tok-1".into(), claims(exp), exp);

        assert_eq!(cache.get("tok-1").map(|c| c.sub), Some("user".to_string()));
    }

    #[test]
    fn drops_expired_entries_on_read() {
        let cache = TokenCache::new(4 * SHARD_COUNT);
        let exp = unix_now().saturating_sub(1);
        cache.insert("tok-1".into(), claims(exp), exp);

        assert!(cache.get("tok-1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_the_oldest_entry_in_a_shard_once_over_capacity() {
        // Force every token into the same shard by overriding capacity
        // through a cache sized to exactly one entry per shard.
        let cache = TokenCache::new(SHARD_COUNT);
        let exp = unix_now() + 3600;

        let mut tokens: Vec<String> = (0..64).map(|i| format!("tok-{i}")).collect();
        tokens.retain(|t| shard_index(t) == shard_index("tok-0"));
        assert!(tokens.len() >= 2, "need at least two tokens colliding into one shard");

        for token in &tokens {
            cache.insert(token.clone(), claims(exp), exp);
        }

        assert!(cache.get(&tokens[0]).is_none());
        assert!(cache.get(tokens.last().unwrap()).is_some());
    }

    #[test]
    fn re_inserting_an_existing_token_does_not_cost_an_eviction_slot() {
        let cache = TokenCache::new(SHARD_COUNT);
        let exp = unix_now() + 3600;

        let mut tokens: Vec<String> = (0..64).map(|i| format!("tok-{i}")).collect();
        tokens.retain(|t| shard_index(t) == shard_index("tok-0"));
        let (first, second) = (tokens[0].clone(), tokens[1].clone());

        cache.insert(first.clone(), claims(exp), exp);
        cache.insert(first.clone(), claims(exp + 3600), exp + 3600);
        cache.insert(second.clone(), claims(exp), exp);

        assert!(cache.get(&first).is_some());
        assert!(cache.get(&second).is_some());
    }
}
