// Copyright 2026 scrivener Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{borrow::Cow, fmt::Debug, hash::Hash, ops::Deref, sync::Arc, time::Duration};

use equivalent::Equivalent;
use hashbrown::DefaultHashBuilder;
use scrivener_common::{
    code::{HashBuilder, Key, Value},
    error::{Error, ErrorKind, Result},
    metrics::{model::Metrics, registry::noop::NoopMetricsRegistry, BoxedRegistry},
    writer::{disabled_writer, CacheWriter},
};
use serde::{Deserialize, Serialize};

use crate::{
    eviction::{
        fifo::{Fifo, FifoConfig},
        lru::{Lru, LruConfig},
    },
    indexer::HashTableIndexer,
    raw::{ArcWriter, RawCache, RawCacheConfig, RawCacheEntry, Weighter},
};

/// In-memory cache with FIFO eviction.
pub type FifoCache<K, V, S = DefaultHashBuilder> = RawCache<Fifo<K, V>, S, HashTableIndexer<Fifo<K, V>>>;
/// Entry of [`FifoCache`].
pub type FifoCacheEntry<K, V> = RawCacheEntry<Fifo<K, V>>;

/// In-memory cache with LRU eviction.
pub type LruCache<K, V, S = DefaultHashBuilder> = RawCache<Lru<K, V>, S, HashTableIndexer<Lru<K, V>>>;
/// Entry of [`LruCache`].
pub type LruCacheEntry<K, V> = RawCacheEntry<Lru<K, V>>;

/// A cached entry of [`Cache`].
pub enum CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    /// Cache entry with FIFO eviction.
    Fifo(FifoCacheEntry<K, V>),
    /// Cache entry with LRU eviction.
    Lru(LruCacheEntry<K, V>),
}

impl<K, V> Debug for CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fifo(e) => f.debug_tuple("Fifo").field(e).finish(),
            Self::Lru(e) => f.debug_tuple("Lru").field(e).finish(),
        }
    }
}

impl<K, V> Clone for CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    fn clone(&self) -> Self {
        match self {
            Self::Fifo(entry) => Self::Fifo(entry.clone()),
            Self::Lru(entry) => Self::Lru(entry.clone()),
        }
    }
}

impl<K, V> Deref for CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    type Target = V;

    fn deref(&self) -> &Self::Target {
        self.value()
    }
}

impl<K, V> From<FifoCacheEntry<K, V>> for CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    fn from(entry: FifoCacheEntry<K, V>) -> Self {
        Self::Fifo(entry)
    }
}

impl<K, V> From<LruCacheEntry<K, V>> for CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    fn from(entry: LruCacheEntry<K, V>) -> Self {
        Self::Lru(entry)
    }
}

impl<K, V> CacheEntry<K, V>
where
    K: Key,
    V: Value,
{
    /// Key hash of the cached entry.
    pub fn hash(&self) -> u64 {
        match self {
            CacheEntry::Fifo(entry) => entry.hash(),
            CacheEntry::Lru(entry) => entry.hash(),
        }
    }

    /// Key of the cached entry.
    pub fn key(&self) -> &K {
        match self {
            CacheEntry::Fifo(entry) => entry.key(),
            CacheEntry::Lru(entry) => entry.key(),
        }
    }

    /// Value of the cached entry.
    pub fn value(&self) -> &V {
        match self {
            CacheEntry::Fifo(entry) => entry.value(),
            CacheEntry::Lru(entry) => entry.value(),
        }
    }

    /// Weight of the cached entry.
    pub fn weight(&self) -> usize {
        match self {
            CacheEntry::Fifo(entry) => entry.weight(),
            CacheEntry::Lru(entry) => entry.weight(),
        }
    }

    /// Returns `true` if the entry has been removed or replaced since it was returned.
    pub fn is_outdated(&self) -> bool {
        match self {
            CacheEntry::Fifo(entry) => entry.is_outdated(),
            CacheEntry::Lru(entry) => entry.is_outdated(),
        }
    }
}

/// Eviction algorithm config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EvictionConfig {
    /// FIFO eviction algorithm config.
    Fifo(FifoConfig),
    /// LRU eviction algorithm config.
    Lru(LruConfig),
}

impl From<FifoConfig> for EvictionConfig {
    fn from(value: FifoConfig) -> EvictionConfig {
        EvictionConfig::Fifo(value)
    }
}

impl From<LruConfig> for EvictionConfig {
    fn from(value: LruConfig) -> EvictionConfig {
        EvictionConfig::Lru(value)
    }
}

/// In-memory cache builder.
pub struct CacheBuilder<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    name: Cow<'static, str>,

    capacity: usize,
    shards: usize,
    eviction_config: EvictionConfig,

    hash_builder: S,
    weighter: Arc<dyn Weighter<K, V>>,
    writer: ArcWriter<K, V>,
    time_to_live: Option<Duration>,

    registry: BoxedRegistry,
}

impl<K, V> CacheBuilder<K, V, DefaultHashBuilder>
where
    K: Key,
    V: Value,
{
    /// Create a new in-memory cache builder.
    pub fn new(capacity: usize) -> Self {
        Self {
            name: "scrivener".into(),

            capacity,
            shards: 8,
            eviction_config: LruConfig::default().into(),

            hash_builder: Default::default(),
            weighter: Arc::new(|_, _| 1),
            writer: disabled_writer(),
            time_to_live: None,

            registry: Box::new(NoopMetricsRegistry),
        }
    }
}

impl<K, V, S> CacheBuilder<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Set the name of the cache. The name is used as the metrics label.
    ///
    /// Default: `scrivener`.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Set in-memory cache sharding count. Entries will be distributed to different shards based on their hash.
    /// Operations on different shard can be parallelized, while notifications of one shard are serialized.
    ///
    /// Default: 8.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set in-memory cache eviction algorithm.
    ///
    /// Default: LRU.
    pub fn with_eviction_config(mut self, eviction_config: impl Into<EvictionConfig>) -> Self {
        self.eviction_config = eviction_config.into();
        self
    }

    /// Set in-memory cache hash builder.
    pub fn with_hash_builder<OS>(self, hash_builder: OS) -> CacheBuilder<K, V, OS>
    where
        OS: HashBuilder,
    {
        CacheBuilder {
            name: self.name,
            capacity: self.capacity,
            shards: self.shards,
            eviction_config: self.eviction_config,
            hash_builder,
            weighter: self.weighter,
            writer: self.writer,
            time_to_live: self.time_to_live,
            registry: self.registry,
        }
    }

    /// Set in-memory cache weighter.
    ///
    /// Capacity is split evenly over the shards. An entry heavier than its shard capacity evicts every other entry
    /// of the shard and is still admitted, so usage exceeds capacity until the next insert into that shard.
    ///
    /// Default: every entry weighs 1.
    pub fn with_weighter(mut self, weighter: impl Weighter<K, V>) -> Self {
        self.weighter = Arc::new(weighter);
        self
    }

    /// Set the writer that explicit writes and all removals are propagated to.
    ///
    /// Default: [`disabled_writer`].
    pub fn with_writer(mut self, writer: impl CacheWriter<K, V>) -> Self {
        self.writer = Arc::new(writer);
        self
    }

    /// Set the time-to-live of the entries, counted from their insertion or load.
    ///
    /// Default: entries never expire.
    pub fn with_time_to_live(mut self, time_to_live: Duration) -> Self {
        self.time_to_live = Some(time_to_live);
        self
    }

    /// Set the metrics registry.
    ///
    /// Default: [`NoopMetricsRegistry`].
    pub fn with_metrics_registry(mut self, registry: BoxedRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Build in-memory cache with the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the shard count is zero. Use [`CacheBuilder::try_build`] to get an error instead.
    pub fn build(self) -> Cache<K, V, S> {
        match self.try_build() {
            Ok(cache) => cache,
            Err(e) => panic!("build in-memory cache failed: {e}"),
        }
    }

    /// Build in-memory cache with the given configuration, validating it first.
    pub fn try_build(self) -> Result<Cache<K, V, S>> {
        if self.shards == 0 {
            return Err(Error::new(ErrorKind::Config, "shards must be greater than zero.")
                .with_context("name", &self.name)
                .with_context("shards", self.shards));
        }

        let metrics = Arc::new(Metrics::new(self.name, self.registry.as_ref()));

        let cache = match self.eviction_config {
            EvictionConfig::Fifo(eviction_config) => Cache::Fifo(RawCache::new(RawCacheConfig {
                capacity: self.capacity,
                shards: self.shards,
                eviction_config,
                hash_builder: self.hash_builder,
                weighter: self.weighter,
                writer: self.writer,
                time_to_live: self.time_to_live,
                metrics,
            })),
            EvictionConfig::Lru(eviction_config) => Cache::Lru(RawCache::new(RawCacheConfig {
                capacity: self.capacity,
                shards: self.shards,
                eviction_config,
                hash_builder: self.hash_builder,
                weighter: self.weighter,
                writer: self.writer,
                time_to_live: self.time_to_live,
                metrics,
            })),
        };
        Ok(cache)
    }
}

/// In-memory cache that propagates its mutations to a [`CacheWriter`].
///
/// Cloning the cache shares it.
pub enum Cache<K, V, S = DefaultHashBuilder>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// In-memory cache with FIFO eviction.
    Fifo(FifoCache<K, V, S>),
    /// In-memory cache with LRU eviction.
    Lru(LruCache<K, V, S>),
}

impl<K, V, S> Debug for Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fifo(_) => f.debug_tuple("Cache::FifoCache").finish(),
            Self::Lru(_) => f.debug_tuple("Cache::LruCache").finish(),
        }
    }
}

impl<K, V, S> Clone for Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn clone(&self) -> Self {
        match self {
            Self::Fifo(cache) => Self::Fifo(cache.clone()),
            Self::Lru(cache) => Self::Lru(cache.clone()),
        }
    }
}

impl<K, V> Cache<K, V, DefaultHashBuilder>
where
    K: Key,
    V: Value,
{
    /// Create a new in-memory cache builder with capacity.
    pub fn builder(capacity: usize) -> CacheBuilder<K, V, DefaultHashBuilder> {
        CacheBuilder::new(capacity)
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Insert or update a cache entry, propagating exactly one write.
    ///
    /// If the write fails, the entry stays cached and the propagation error is returned.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::cache::insert"))]
    pub fn insert(&self, key: K, value: V) -> Result<CacheEntry<K, V>> {
        match self {
            Cache::Fifo(cache) => cache.insert(key, value).map(CacheEntry::from),
            Cache::Lru(cache) => cache.insert(key, value).map(CacheEntry::from),
        }
    }

    /// Remove a cached entry with the given key, propagating an explicit delete.
    ///
    /// If the delete fails, the entry is still removed and the propagation error is returned.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::cache::remove"))]
    pub fn remove<Q>(&self, key: &Q) -> Result<Option<CacheEntry<K, V>>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        match self {
            Cache::Fifo(cache) => cache.remove(key).map(|opt| opt.map(CacheEntry::from)),
            Cache::Lru(cache) => cache.remove(key).map(|opt| opt.map(CacheEntry::from)),
        }
    }

    /// Get the live cached entry with the given key.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::cache::get"))]
    pub fn get<Q>(&self, key: &Q) -> Option<CacheEntry<K, V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        match self {
            Cache::Fifo(cache) => cache.get(key).map(CacheEntry::from),
            Cache::Lru(cache) => cache.get(key).map(CacheEntry::from),
        }
    }

    /// Get the live cached entry with the given key, or load and store it with `loader` on a miss.
    ///
    /// Loaded entries are not propagated to the writer.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::cache::get_with"))]
    pub fn get_with<F, ER>(&self, key: K, loader: F) -> Result<CacheEntry<K, V>>
    where
        F: FnOnce() -> std::result::Result<V, ER>,
        ER: Into<anyhow::Error>,
    {
        match self {
            Cache::Fifo(cache) => cache.get_with(key, loader).map(CacheEntry::from),
            Cache::Lru(cache) => cache.get_with(key, loader).map(CacheEntry::from),
        }
    }

    /// Check if the in-memory cache contains a live cached entry with the given key.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::cache::contains"))]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        match self {
            Cache::Fifo(cache) => cache.contains(key),
            Cache::Lru(cache) => cache.contains(key),
        }
    }

    /// Clear the in-memory cache, propagating an explicit delete per entry.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::cache::clear"))]
    pub fn clear(&self) -> Result<()> {
        match self {
            Cache::Fifo(cache) => cache.clear(),
            Cache::Lru(cache) => cache.clear(),
        }
    }

    /// Drop the entries that outlived the time-to-live, returning how many were dropped.
    pub fn evict_expired(&self) -> usize {
        match self {
            Cache::Fifo(cache) => cache.evict_expired(),
            Cache::Lru(cache) => cache.evict_expired(),
        }
    }

    /// Get the capacity of the in-memory cache.
    pub fn capacity(&self) -> usize {
        match self {
            Cache::Fifo(cache) => cache.capacity(),
            Cache::Lru(cache) => cache.capacity(),
        }
    }

    /// Get the usage of the in-memory cache.
    pub fn usage(&self) -> usize {
        match self {
            Cache::Fifo(cache) => cache.usage(),
            Cache::Lru(cache) => cache.usage(),
        }
    }

    /// Get the entry count of the in-memory cache.
    pub fn len(&self) -> usize {
        match self {
            Cache::Fifo(cache) => cache.len(),
            Cache::Lru(cache) => cache.len(),
        }
    }

    /// Returns `true` if the in-memory cache holds no entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the shard count of the in-memory cache.
    pub fn shards(&self) -> usize {
        match self {
            Cache::Fifo(cache) => cache.shards(),
            Cache::Lru(cache) => cache.shards(),
        }
    }

    /// Get the writer of the in-memory cache.
    pub fn writer(&self) -> &ArcWriter<K, V> {
        match self {
            Cache::Fifo(cache) => cache.writer(),
            Cache::Lru(cache) => cache.writer(),
        }
    }

    /// Get the hash builder of the in-memory cache.
    pub fn hash_builder(&self) -> &Arc<S> {
        match self {
            Cache::Fifo(cache) => cache.hash_builder(),
            Cache::Lru(cache) => cache.hash_builder(),
        }
    }
}
