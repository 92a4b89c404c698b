use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheValue<V> {
    value: V,
    expires_at: Instant,
}

/// In-memory cache where every entry lives for a fixed time-to-live.
///
/// Used by the weather and football providers so a short refresh interval
/// does not hammer upstreams whose data changes slowly.
#[derive(Clone)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    ttl: Duration,
    inner: Arc<Mutex<HashMap<K, CacheValue<V>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + std::fmt::Debug,
    V: Clone + Send + Sync,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock().await;
        if let Some(entry) = cache.get(key) {
            if entry.expires_at <= Instant::now() {
                debug!("Cache entry expired for key: {:?}", key);
                cache.remove(key);
                return None;
            }
            debug!("Cache HIT for key: {:?}", key);
            return Some(entry.value.clone());
        }
        debug!("Cache MISS for key: {:?}", key);
        None
    }

    pub async fn put(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        let mut cache = self.inner.lock().await;
        debug!("Cache PUT for key: {:?}", key);
        cache.insert(key, CacheValue { value, expires_at });
    }
}
