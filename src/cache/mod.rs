//! Keyed caches.
//!
//! A cache family is generic over the cached value type and registered as a
//! singleton: cached state outlives any one operation scope.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::composition::{Manifest, Provider, ResolveError, Scope, ServiceKey, Shared};
use crate::contract::{Cardinality, ContractId, Lifetime, OpenContract, TypeParam};

/// Open contract for caches: single-bound per value type.
pub const CACHE: OpenContract = OpenContract::new("Cache", 1, Cardinality::Single);

/// The closed cache contract for value type `T`.
pub fn cache_contract<T: Send + Sync + 'static>() -> ContractId {
    ContractId::close(CACHE, vec![TypeParam::of::<T>()])
}

/// String-keyed cache of values of type `T`.
#[async_trait]
pub trait Cache<T: Clone + Send + Sync + 'static>: Send + Sync {
    async fn get(&self, key: &str) -> Option<T>;

    async fn get_all(&self) -> Vec<T>;

    async fn set(&self, key: &str, value: T);

    async fn exists(&self, key: &str) -> bool;

    /// Drop every entry.
    async fn reset(&self);
}

/// In-process [`Cache`] over a hash map.
pub struct MemoryCache<T> {
    entries: RwLock<HashMap<String, T>>,
}

impl<T> MemoryCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Cache<T> for MemoryCache<T> {
    async fn get(&self, key: &str) -> Option<T> {
        self.entries.read().await.get(key).cloned()
    }

    async fn get_all(&self) -> Vec<T> {
        self.entries.read().await.values().cloned().collect()
    }

    async fn set(&self, key: &str, value: T) {
        self.entries.write().await.insert(key.to_string(), value);
    }

    async fn exists(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    async fn reset(&self) {
        self.entries.write().await.clear();
    }
}

impl Manifest {
    /// Register a singleton cache for value type `T`.
    pub fn cache<T: Clone + Send + Sync + 'static>(&mut self, cache: Arc<dyn Cache<T>>) -> &mut Self {
        let provider: Provider =
            Arc::new(move |_scope| Ok(Arc::new(Arc::clone(&cache)) as Shared));
        self.service(
            ServiceKey::Contract(cache_contract::<T>()),
            Lifetime::Singleton,
            provider,
        )
    }
}

impl Scope {
    /// The registered cache for value type `T`.
    pub fn cache<T: Clone + Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<dyn Cache<T>>, ResolveError> {
        self.resolve(&ServiceKey::Contract(cache_contract::<T>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_exists() {
        let cache = MemoryCache::new();
        assert!(!cache.exists("a").await);

        cache.set("a", 1u32).await;

        assert!(cache.exists("a").await);
        assert_eq!(cache.get("a").await, Some(1));
        assert_eq!(cache.get("b").await, None);
    }

    #[tokio::test]
    async fn set_overwrites() {
        let cache = MemoryCache::new();
        cache.set("a", 1u32).await;
        cache.set("a", 2u32).await;
        assert_eq!(cache.get("a").await, Some(2));
    }

    #[tokio::test]
    async fn get_all_returns_every_value() {
        let cache = MemoryCache::new();
        cache.set("a", 1u32).await;
        cache.set("b", 2u32).await;

        let mut all = cache.get_all().await;
        all.sort_unstable();
        assert_eq!(all, vec![1, 2]);
    }

    #[tokio::test]
    async fn reset_empties_the_cache() {
        let cache = MemoryCache::new();
        cache.set("a", 1u32).await;
        cache.reset().await;
        assert!(!cache.exists("a").await);
        assert!(cache.get_all().await.is_empty());
    }
}
