use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crossbeam::sync::ShardedLock;
use tracing::{event, Level};

use crate::{config::CacheKeyFn, models::EvaluationContext};

struct CacheEntry<V> {
    value: V,
    expiration: Instant,
}

/// In memory cache keyed by a function of the evaluation context.
///
/// Expired entries are removed lazily when read, or by [`TtlCache::purge_expired`].
/// There is no size bound.
pub struct TtlCache<V> {
    ttl: Duration,
    key_fn: CacheKeyFn,
    store: ShardedLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, key_fn: CacheKeyFn) -> Self {
        Self {
            ttl,
            key_fn,
            store: ShardedLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn key(&self, ctx: &EvaluationContext) -> String {
        (self.key_fn)(ctx)
    }

    pub fn get(&self, ctx: &EvaluationContext) -> Option<V> {
        let key = self.key(ctx);
        {
            let store = self
                .store
                .read()
                .expect("should always be able to acquire read lock");
            match store.get(&key) {
                None => return None,
                Some(entry) if Instant::now() < entry.expiration => {
                    return Some(entry.value.clone())
                }
                Some(_) => {}
            }
        }

        let mut store = self
            .store
            .write()
            .expect("should always be able to acquire write lock");
        // another caller may have refreshed the entry in between
        if let Some(entry) = store.get(&key) {
            if Instant::now() < entry.expiration {
                return Some(entry.value.clone());
            }
            event!(Level::TRACE, "Dropping expired cache entry {}", key);
            store.remove(&key);
        }
        None
    }

    pub fn set(&self, ctx: &EvaluationContext, value: V) {
        let key = self.key(ctx);
        let entry = CacheEntry {
            value,
            expiration: Instant::now() + self.ttl,
        };
        self.store
            .write()
            .expect("should always be able to acquire write lock")
            .insert(key, entry);
    }

    /// Removes every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self
            .store
            .write()
            .expect("should always be able to acquire write lock");
        let before = store.len();
        store.retain(|_, entry| now < entry.expiration);
        before - store.len()
    }

    pub fn len(&self) -> usize {
        self.store
            .read()
            .expect("should always be able to acquire read lock")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, thread};

    use super::*;

    fn ctx(targeting_key: &str) -> EvaluationContext {
        EvaluationContext {
            targeting_key: targeting_key.to_string(),
            application: "app".to_string(),
            environment: "production".to_string(),
            ..Default::default()
        }
    }

    fn targeting_key_cache(ttl: Duration) -> TtlCache<String> {
        TtlCache::new(ttl, Arc::new(|ctx: &EvaluationContext| ctx.targeting_key.clone()))
    }

    #[test]
    fn test_get_before_and_after_ttl() {
        let cache = targeting_key_cache(Duration::from_millis(50));
        cache.set(&ctx("user-1"), "value".to_string());
        assert_eq!(cache.get(&ctx("user-1")), Some("value".to_string()));
        assert_eq!(cache.get(&ctx("user-2")), None);

        thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get(&ctx("user-1")), None);
        // expired entries are removed on read
        assert!(cache.is_empty());
    }

    #[test]
    fn test_custom_key_fn() {
        let cache: TtlCache<u32> = TtlCache::new(
            Duration::from_secs(30),
            Arc::new(|ctx: &EvaluationContext| {
                format!("{}/{}", ctx.environment, ctx.targeting_key)
            }),
        );
        cache.set(&ctx("user-1"), 1);
        assert_eq!(cache.key(&ctx("user-1")), "production/user-1");

        let other_env = EvaluationContext {
            environment: "staging".to_string(),
            ..ctx("user-1")
        };
        assert_eq!(cache.get(&other_env), None);
        assert_eq!(cache.get(&ctx("user-1")), Some(1));
    }

    #[test]
    fn test_set_overwrites() {
        let cache = targeting_key_cache(Duration::from_secs(30));
        cache.set(&ctx("user-1"), "first".to_string());
        cache.set(&ctx("user-1"), "second".to_string());
        assert_eq!(cache.get(&ctx("user-1")), Some("second".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let cache = targeting_key_cache(Duration::from_millis(30));
        cache.set(&ctx("user-1"), "a".to_string());
        cache.set(&ctx("user-2"), "b".to_string());
        thread::sleep(Duration::from_millis(50));
        cache.set(&ctx("user-3"), "c".to_string());

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&ctx("user-3")), Some("c".to_string()));
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(targeting_key_cache(Duration::from_secs(30)));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for j in 0..100 {
                        let key = format!("user-{}", (i * 100 + j) % 50);
                        cache.set(&ctx(&key), key.clone());
                        assert!(cache.get(&ctx(&key)).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread should not panic");
        }
        assert_eq!(cache.len(), 50);
    }
}
