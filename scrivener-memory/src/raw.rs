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

use std::{
    fmt::Debug,
    hash::Hash,
    ops::Deref,
    sync::Arc,
    time::{Duration, Instant},
};

use equivalent::Equivalent;
use itertools::Itertools;
use parking_lot::RwLock;
use scrivener_common::{
    code::HashBuilder,
    error::{Error, ErrorKind, Result},
    metrics::model::Metrics,
    removal::RemovalCause,
    writer::CacheWriter,
};

use crate::{
    eviction::{Eviction, Op},
    indexer::Indexer,
    record::{Data, Record},
};

/// The weighter for the in-memory cache.
///
/// The weighter is used to calculate the weight of the cache entry.
pub trait Weighter<K, V>: Fn(&K, &V) -> usize + Send + Sync + 'static {}
impl<K, V, T> Weighter<K, V> for T where T: Fn(&K, &V) -> usize + Send + Sync + 'static {}

/// Shared writer of a cache.
pub type ArcWriter<K, V> = Arc<dyn CacheWriter<K, V>>;

/// Config of [`RawCache`].
pub struct RawCacheConfig<E, S>
where
    E: Eviction,
    S: HashBuilder,
{
    /// Total capacity, split evenly over the shards.
    pub capacity: usize,
    /// Shard count.
    pub shards: usize,
    /// Config of the eviction algorithm of each shard.
    pub eviction_config: E::Config,
    /// Hash builder of the keys.
    pub hash_builder: S,
    /// Weighter of the entries.
    pub weighter: Arc<dyn Weighter<E::Key, E::Value>>,
    /// Writer notified of explicit writes and all removals.
    pub writer: ArcWriter<E::Key, E::Value>,
    /// Time-to-live of the entries.
    pub time_to_live: Option<Duration>,
    /// Metrics of the cache.
    pub metrics: Arc<Metrics>,
}

/// Result of a shard lookup.
enum Lookup<E>
where
    E: Eviction,
{
    Hit(Arc<Record<E>>),
    Expired(Arc<Record<E>>),
    Miss,
}

struct RawCacheShard<E, I>
where
    E: Eviction,
    I: Indexer<Eviction = E>,
{
    eviction: E,
    indexer: I,

    usage: usize,
    capacity: usize,
    time_to_live: Option<Duration>,

    writer: ArcWriter<E::Key, E::Value>,
    metrics: Arc<Metrics>,
}

impl<E, I> RawCacheShard<E, I>
where
    E: Eviction,
    I: Indexer<Eviction = E>,
{
    /// Unlink the record of the key from both the indexer and the eviction container.
    fn detach<Q>(&mut self, hash: u64, key: &Q) -> Option<Arc<Record<E>>>
    where
        Q: Hash + Equivalent<E::Key> + ?Sized,
    {
        let record = self.indexer.remove(hash, key)?;
        if record.is_in_eviction() {
            self.eviction.remove(&record);
        }
        debug_assert!(!record.is_in_eviction());

        self.usage -= record.weight();
        self.metrics.cache_usage.decrease(record.weight() as _);

        Some(record)
    }

    /// Evict entries to fit the target usage.
    ///
    /// Victims that already outlived their time-to-live are reported as expired rather than evicted for size.
    fn evict(&mut self, target: usize, now: Instant, evicted: &mut Vec<(RemovalCause, Arc<Record<E>>)>) {
        while self.usage > target {
            let Some(victim) = self.eviction.pop() else {
                break;
            };

            let record = self.indexer.remove(victim.hash(), victim.key());
            debug_assert!(record.as_ref().is_some_and(|r| Arc::ptr_eq(r, &victim)));

            self.usage -= victim.weight();
            self.metrics.cache_usage.decrease(victim.weight() as _);

            let cause = if victim.is_expired(self.time_to_live, now) {
                self.metrics.cache_expire.increase(1);
                RemovalCause::Expired
            } else {
                self.metrics.cache_evict.increase(1);
                RemovalCause::Size
            };
            evicted.push((cause, victim));
        }
    }

    /// Store the record, evicting overflow records first.
    ///
    /// A record heavier than the shard capacity empties the shard and is still stored, until the next insert evicts
    /// it. Returns the record replaced by the new one, if any.
    fn emplace(
        &mut self,
        record: Arc<Record<E>>,
        now: Instant,
        evicted: &mut Vec<(RemovalCause, Arc<Record<E>>)>,
    ) -> Option<Arc<Record<E>>> {
        let weight = record.weight();

        let old = self.detach(record.hash(), record.key());
        self.evict(self.capacity.saturating_sub(weight), now, evicted);

        let replaced = self.indexer.insert(record.clone());
        debug_assert!(replaced.is_none());
        self.eviction.push(record);

        self.usage += weight;
        self.metrics.cache_usage.increase(weight as _);

        old
    }

    fn lookup<Q>(&self, hash: u64, key: &Q, now: Instant) -> Lookup<E>
    where
        Q: Hash + Equivalent<E::Key> + ?Sized,
    {
        match self.indexer.get(hash, key) {
            Some(record) if record.is_expired(self.time_to_live, now) => {
                self.metrics.cache_miss.increase(1);
                Lookup::Expired(record.clone())
            }
            Some(record) => {
                self.metrics.cache_hit.increase(1);
                Lookup::Hit(record.clone())
            }
            None => {
                self.metrics.cache_miss.increase(1);
                Lookup::Miss
            }
        }
    }

    /// Drop the given expired record if it is still the one indexed for its key.
    fn expire(&mut self, record: &Arc<Record<E>>) -> bool {
        match self.indexer.get(record.hash(), record.key()) {
            Some(indexed) if Arc::ptr_eq(indexed, record) => {}
            _ => return false,
        }
        self.detach(record.hash(), record.key());
        self.metrics.cache_expire.increase(1);
        true
    }

    fn notify_write(&self, record: &Record<E>) -> Result<()> {
        self.metrics.propagation_write.increase(1);
        self.writer.write(record.key(), record.value()).inspect_err(|_| {
            self.metrics.propagation_failure.increase(1);
        })
    }

    fn notify_delete(&self, record: &Record<E>, cause: RemovalCause) -> Result<()> {
        self.metrics.propagation_delete.increase(1);
        self.writer
            .delete(record.key(), Some(record.value()), cause)
            .inspect_err(|_| {
                self.metrics.propagation_failure.increase(1);
            })
    }

    /// Notify deletes that no caller asked for. Failures are logged and counted only.
    fn notify_collateral<'a>(&self, records: impl IntoIterator<Item = &'a (RemovalCause, Arc<Record<E>>)>) {
        for (cause, record) in records {
            if let Err(e) = self.notify_delete(record, *cause) {
                tracing::warn!(
                    "[raw]: propagate delete failed, hash: {}, cause: {}, error: {}",
                    record.hash(),
                    cause,
                    e
                );
            }
        }
    }
}

struct RawCacheInner<E, S, I>
where
    E: Eviction,
    S: HashBuilder,
    I: Indexer<Eviction = E>,
{
    shards: Vec<RwLock<RawCacheShard<E, I>>>,

    capacity: usize,
    time_to_live: Option<Duration>,

    hash_builder: Arc<S>,
    weighter: Arc<dyn Weighter<E::Key, E::Value>>,
    writer: ArcWriter<E::Key, E::Value>,

    metrics: Arc<Metrics>,
}

/// The sharded in-memory cache that drives a [`CacheWriter`].
///
/// Every mutation is applied to the shard before the writer is notified, and the notification is sent while the
/// shard write lock is still held. Notifications for one key therefore reach the writer in the order the mutations
/// were applied, and a failing writer never changes what the cache holds.
pub struct RawCache<E, S, I>
where
    E: Eviction,
    S: HashBuilder,
    I: Indexer<Eviction = E>,
{
    inner: Arc<RawCacheInner<E, S, I>>,
}

impl<E, S, I> Clone for RawCache<E, S, I>
where
    E: Eviction,
    S: HashBuilder,
    I: Indexer<Eviction = E>,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E, S, I> RawCache<E, S, I>
where
    E: Eviction,
    S: HashBuilder,
    I: Indexer<Eviction = E>,
{
    /// Create a raw cache.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is zero.
    pub fn new(config: RawCacheConfig<E, S>) -> Self {
        assert!(config.shards > 0, "shards must be greater than zero.");

        let shards = (0..config.shards)
            .map(|index| Self::shard_capacity_for(config.capacity, config.shards, index))
            .map(|shard_capacity| RawCacheShard {
                eviction: E::new(shard_capacity, &config.eviction_config),
                indexer: I::default(),
                usage: 0,
                capacity: shard_capacity,
                time_to_live: config.time_to_live,
                writer: config.writer.clone(),
                metrics: config.metrics.clone(),
            })
            .map(RwLock::new)
            .collect_vec();

        let inner = RawCacheInner {
            shards,
            capacity: config.capacity,
            time_to_live: config.time_to_live,
            hash_builder: Arc::new(config.hash_builder),
            weighter: config.weighter,
            writer: config.writer,
            metrics: config.metrics,
        };

        Self { inner: Arc::new(inner) }
    }

    /// Insert or update an entry and propagate it with exactly one write.
    ///
    /// If the write fails, the entry stays cached and the propagation error is returned.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::raw::insert"))]
    pub fn insert(&self, key: E::Key, value: E::Value) -> Result<RawCacheEntry<E>> {
        let record = self.record(key, value);
        let mut evicted = vec![];

        let mut shard = self.inner.shards[self.shard(record.hash())].write();
        match shard.emplace(record.clone(), Instant::now(), &mut evicted) {
            Some(_) => self.inner.metrics.cache_replace.increase(1),
            None => self.inner.metrics.cache_insert.increase(1),
        }
        shard.notify_collateral(&evicted);
        shard.notify_write(&record)?;
        drop(shard);

        Ok(RawCacheEntry { record })
    }

    /// Store a loaded entry without propagating a write.
    fn load(&self, key: E::Key, value: E::Value) -> RawCacheEntry<E> {
        let record = self.record(key, value);
        let mut evicted = vec![];

        let mut shard = self.inner.shards[self.shard(record.hash())].write();
        shard.emplace(record.clone(), Instant::now(), &mut evicted);
        self.inner.metrics.cache_load.increase(1);
        shard.notify_collateral(&evicted);
        drop(shard);

        RawCacheEntry { record }
    }

    /// Remove the entry of the key and propagate it with an explicit delete.
    ///
    /// If the delete fails, the entry is still removed and the propagation error is returned.
    /// An entry that already outlived its time-to-live is reported as expired and not returned.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::raw::remove"))]
    pub fn remove<Q>(&self, key: &Q) -> Result<Option<RawCacheEntry<E>>>
    where
        Q: Hash + Equivalent<E::Key> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);

        let mut shard = self.inner.shards[self.shard(hash)].write();
        let Some(record) = shard.detach(hash, key) else {
            return Ok(None);
        };

        if record.is_expired(self.inner.time_to_live, Instant::now()) {
            self.inner.metrics.cache_expire.increase(1);
            shard.notify_collateral([&(RemovalCause::Expired, record)]);
            return Ok(None);
        }

        self.inner.metrics.cache_remove.increase(1);
        shard.notify_delete(&record, RemovalCause::Explicit)?;
        drop(shard);

        Ok(Some(RawCacheEntry { record }))
    }

    /// Get the live entry of the key.
    ///
    /// An entry that outlived its time-to-live is dropped, reported as expired, and treated as a miss.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::raw::get"))]
    pub fn get<Q>(&self, key: &Q) -> Option<RawCacheEntry<E>>
    where
        Q: Hash + Equivalent<E::Key> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);
        let shard = &self.inner.shards[self.shard(hash)];
        let now = Instant::now();

        let lookup = match E::acquire() {
            Op::Noop => shard.read().lookup(hash, key, now),
            Op::Mutable => {
                let mut shard = shard.write();
                let lookup = shard.lookup(hash, key, now);
                match &lookup {
                    Lookup::Hit(record) => shard.eviction.access(record),
                    Lookup::Expired(record) => {
                        if shard.expire(record) {
                            shard.notify_collateral([&(RemovalCause::Expired, record.clone())]);
                        }
                        return None;
                    }
                    Lookup::Miss => {}
                }
                lookup
            }
        };

        match lookup {
            Lookup::Hit(record) => Some(RawCacheEntry { record }),
            Lookup::Expired(record) => {
                let mut shard = shard.write();
                if shard.expire(&record) {
                    shard.notify_collateral([&(RemovalCause::Expired, record)]);
                }
                None
            }
            Lookup::Miss => None,
        }
    }

    /// Get the live entry of the key, or load and store it on a miss.
    ///
    /// The loader runs without any lock held. A loaded entry is never propagated as a write.
    /// Concurrent misses on the same key may each run the loader; the last store wins.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::raw::get_with"))]
    pub fn get_with<F, ER>(&self, key: E::Key, loader: F) -> Result<RawCacheEntry<E>>
    where
        F: FnOnce() -> std::result::Result<E::Value, ER>,
        ER: Into<anyhow::Error>,
    {
        if let Some(entry) = self.get(&key) {
            return Ok(entry);
        }
        let value = loader().map_err(|e| Error::new(ErrorKind::External, "load failed").with_source(e))?;
        Ok(self.load(key, value))
    }

    /// Returns `true` if the cache holds a live entry of the key. Does not count as an access.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::raw::contains"))]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<E::Key> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);
        let now = Instant::now();

        self.inner.shards[self.shard(hash)]
            .read()
            .indexer
            .get(hash, key)
            .is_some_and(|record| !record.is_expired(self.inner.time_to_live, now))
    }

    /// Remove all entries, propagating an explicit delete for each.
    ///
    /// The cache is emptied even if deletes fail. The first failure is returned with the failure count attached.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::raw::clear"))]
    pub fn clear(&self) -> Result<()> {
        let mut first = None;
        let mut failures = 0;

        for shard in self.inner.shards.iter() {
            let mut records = vec![];
            let mut shard = shard.write();

            records.extend(shard.indexer.drain());
            shard.eviction.clear();
            self.inner.metrics.cache_usage.decrease(shard.usage as _);
            self.inner.metrics.cache_remove.increase(records.len() as _);
            shard.usage = 0;

            for record in records.iter() {
                if let Err(e) = shard.notify_delete(record, RemovalCause::Explicit) {
                    tracing::warn!("[raw]: propagate clear failed, hash: {}, error: {}", record.hash(), e);
                    failures += 1;
                    first.get_or_insert(e);
                }
            }
        }

        match first {
            Some(e) => Err(e.with_context("failures", failures)),
            None => Ok(()),
        }
    }

    /// Drop every entry that outlived its time-to-live, propagating an expired delete for each.
    ///
    /// Returns the count of dropped entries.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::memory::raw::evict_expired"))]
    pub fn evict_expired(&self) -> usize {
        let Some(ttl) = self.inner.time_to_live else {
            return 0;
        };
        let now = Instant::now();
        let mut count = 0;

        for shard in self.inner.shards.iter() {
            let mut expired = vec![];
            let mut shard = shard.write();

            let victims = shard
                .indexer
                .iter()
                .filter(|record| record.is_expired(Some(ttl), now))
                .cloned()
                .collect_vec();
            for record in victims {
                if shard.expire(&record) {
                    expired.push((RemovalCause::Expired, record));
                }
            }
            shard.notify_collateral(&expired);
            count += expired.len();
        }

        count
    }

    /// Total capacity, as the sum of entry weights.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Total weight of the cached entries.
    pub fn usage(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.read().usage).sum()
    }

    /// Count of the cached entries, expired ones that have not been dropped yet included.
    pub fn len(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.read().indexer.len()).sum()
    }

    /// Returns `true` if the cache holds no entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shard count.
    pub fn shards(&self) -> usize {
        self.inner.shards.len()
    }

    /// Time-to-live of the entries, if any.
    pub fn time_to_live(&self) -> Option<Duration> {
        self.inner.time_to_live
    }

    /// The writer the cache propagates to.
    pub fn writer(&self) -> &ArcWriter<E::Key, E::Value> {
        &self.inner.writer
    }

    /// Metrics of the cache.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// The hash builder of the cache.
    pub fn hash_builder(&self) -> &Arc<S> {
        &self.inner.hash_builder
    }

    fn record(&self, key: E::Key, value: E::Value) -> Arc<Record<E>> {
        let hash = self.inner.hash_builder.hash_one(&key);
        let weight = (self.inner.weighter)(&key, &value);
        Arc::new(Record::new(Data {
            key,
            value,
            hash,
            weight,
        }))
    }

    fn shard(&self, hash: u64) -> usize {
        hash as usize % self.inner.shards.len()
    }

    fn shard_capacity_for(total: usize, shards: usize, index: usize) -> usize {
        let base = total / shards;
        let remainder = total % shards;
        base + usize::from(index < remainder)
    }
}

/// A cached entry.
///
/// The entry stays readable after it leaves the cache.
pub struct RawCacheEntry<E>
where
    E: Eviction,
{
    record: Arc<Record<E>>,
}

impl<E> Debug for RawCacheEntry<E>
where
    E: Eviction,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawCacheEntry").field("record", &self.record).finish()
    }
}

impl<E> Clone for RawCacheEntry<E>
where
    E: Eviction,
{
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
        }
    }
}

impl<E> Deref for RawCacheEntry<E>
where
    E: Eviction,
{
    type Target = E::Value;

    fn deref(&self) -> &Self::Target {
        self.value()
    }
}

impl<E> RawCacheEntry<E>
where
    E: Eviction,
{
    /// Key hash.
    pub fn hash(&self) -> u64 {
        self.record.hash()
    }

    /// Key.
    pub fn key(&self) -> &E::Key {
        self.record.key()
    }

    /// Value.
    pub fn value(&self) -> &E::Value {
        self.record.value()
    }

    /// Weight, as given by the weighter.
    pub fn weight(&self) -> usize {
        self.record.weight()
    }

    /// Returns `true` if the entry has been removed or replaced since it was returned.
    pub fn is_outdated(&self) -> bool {
        !self.record.is_in_indexer()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use hashbrown::DefaultHashBuilder;
    use rand::{rng, Rng};
    use scrivener_common::{removal::RemovalCause, writer::disabled_writer};

    use super::*;
    use crate::{
        eviction::{
            fifo::{Fifo, FifoConfig},
            lru::{Lru, LruConfig},
        },
        indexer::HashTableIndexer,
        test_utils::{FailingWriter, Notification, RecordingWriter},
    };

    type FifoRawCache<K, V> = RawCache<Fifo<K, V>, DefaultHashBuilder, HashTableIndexer<Fifo<K, V>>>;
    type LruRawCache<K, V> = RawCache<Lru<K, V>, DefaultHashBuilder, HashTableIndexer<Lru<K, V>>>;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<FifoRawCache<u64, u64>>();
        is_send_sync_static::<LruRawCache<u64, u64>>();
        is_send_sync_static::<RawCacheEntry<Lru<u64, u64>>>();
    }

    fn fifo_cache<K, V>(
        capacity: usize,
        shards: usize,
        writer: ArcWriter<K, V>,
        time_to_live: Option<Duration>,
    ) -> FifoRawCache<K, V>
    where
        K: scrivener_common::code::Key,
        V: scrivener_common::code::Value,
    {
        RawCache::new(RawCacheConfig {
            capacity,
            shards,
            eviction_config: FifoConfig::default(),
            hash_builder: Default::default(),
            weighter: Arc::new(|_, _| 1),
            writer,
            time_to_live,
            metrics: Arc::new(Metrics::noop()),
        })
    }

    fn lru_cache<K, V>(capacity: usize, writer: ArcWriter<K, V>) -> LruRawCache<K, V>
    where
        K: scrivener_common::code::Key,
        V: scrivener_common::code::Value,
    {
        RawCache::new(RawCacheConfig {
            capacity,
            shards: 1,
            eviction_config: LruConfig::default(),
            hash_builder: Default::default(),
            weighter: Arc::new(|_, _| 1),
            writer,
            time_to_live: None,
            metrics: Arc::new(Metrics::noop()),
        })
    }

    #[test_log::test]
    fn test_insert_propagates_one_write() {
        let writer = Arc::new(RecordingWriter::<String, u64>::default());
        let cache = fifo_cache(16, 4, writer.clone(), None);

        let entry = cache.insert("x".to_string(), 1).unwrap();
        assert_eq!(*entry, 1);
        assert_eq!(
            writer.notifications(),
            vec![Notification::Write {
                key: "x".to_string(),
                value: 1
            }]
        );
    }

    #[test_log::test]
    fn test_replace_propagates_only_the_write() {
        let writer = Arc::new(RecordingWriter::<u64, u64>::default());
        let cache = fifo_cache(16, 1, writer.clone(), None);

        let first = cache.insert(1, 1).unwrap();
        cache.insert(1, 2).unwrap();

        assert!(first.is_outdated());
        assert_eq!(*cache.get(&1).unwrap(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.usage(), 1);
        assert_eq!(
            writer.notifications(),
            vec![
                Notification::Write { key: 1, value: 1 },
                Notification::Write { key: 1, value: 2 },
            ]
        );
    }

    #[test_log::test]
    fn test_failed_write_keeps_entry() {
        let writer = Arc::new(FailingWriter::default());
        let cache = fifo_cache::<String, u64>(16, 4, writer.clone(), None);

        let err = cache.insert("a".to_string(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Propagation);
        assert_eq!(cache.get("a").map(|e| *e), Some(1));
        assert_eq!(writer.calls(), 1);
    }

    #[test_log::test]
    fn test_remove_propagates_explicit_delete() {
        let writer = Arc::new(RecordingWriter::<String, u64>::default());
        let cache = fifo_cache(16, 4, writer.clone(), None);

        cache.insert("a".to_string(), 1).unwrap();
        writer.clear();

        let removed = cache.remove("a").unwrap().unwrap();
        assert_eq!(*removed, 1);
        assert!(removed.is_outdated());
        assert!(cache.remove("a").unwrap().is_none());
        assert_eq!(
            writer.notifications(),
            vec![Notification::Delete {
                key: "a".to_string(),
                value: Some(1),
                cause: RemovalCause::Explicit
            }]
        );
    }

    #[test_log::test]
    fn test_failed_delete_still_removes() {
        let cache = fifo_cache::<u64, u64>(16, 4, Arc::new(FailingWriter::default()), None);
        let _ = cache.insert(1, 1);

        let err = cache.remove(&1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Propagation);
        assert!(!cache.contains(&1));
        assert!(cache.is_empty());
    }

    #[test_log::test]
    fn test_eviction_propagates_size_delete() {
        let writer = Arc::new(RecordingWriter::<u64, u64>::default());
        let cache = fifo_cache(2, 1, writer.clone(), None);

        cache.insert(1, 10).unwrap();
        cache.insert(2, 20).unwrap();
        cache.insert(3, 30).unwrap();

        assert!(!cache.contains(&1));
        assert_eq!(cache.usage(), 2);
        assert_eq!(
            writer.notifications(),
            vec![
                Notification::Write { key: 1, value: 10 },
                Notification::Write { key: 2, value: 20 },
                Notification::Delete {
                    key: 1,
                    value: Some(10),
                    cause: RemovalCause::Size
                },
                Notification::Write { key: 3, value: 30 },
            ]
        );
    }

    #[test_log::test]
    fn test_failed_eviction_delete_does_not_fail_insert() {
        let cache = fifo_cache::<u64, u64>(1, 1, Arc::new(FailingWriter::default()), None);
        let _ = cache.insert(1, 1);
        // The write of 2 fails, the collateral delete of 1 is only logged.
        let err = cache.insert(2, 2).unwrap_err();
        assert_eq!(err.context_value("op"), Some("write"));
        assert!(cache.contains(&2));
        assert!(!cache.contains(&1));
    }

    #[test_log::test]
    fn test_lru_hit_protects_entry() {
        let writer = Arc::new(RecordingWriter::<u64, u64>::default());
        let cache = lru_cache(2, writer.clone());

        cache.insert(1, 1).unwrap();
        cache.insert(2, 2).unwrap();
        assert!(cache.get(&1).is_some());
        cache.insert(3, 3).unwrap();

        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert_eq!(writer.deletes(), vec![(2, Some(2), RemovalCause::Size)]);
    }

    #[test_log::test]
    fn test_get_with_does_not_propagate() {
        let writer = Arc::new(RecordingWriter::<String, u64>::default());
        let cache = lru_cache(16, writer.clone());

        let entry = cache
            .get_with("x".to_string(), || Ok::<_, anyhow::Error>(7))
            .unwrap();
        assert_eq!(*entry, 7);
        assert!(writer.notifications().is_empty());

        // A hit does not run the loader.
        let entry = cache
            .get_with("x".to_string(), || -> anyhow::Result<u64> { unreachable!() })
            .unwrap();
        assert_eq!(*entry, 7);

        cache.insert("x".to_string(), 8).unwrap();
        assert_eq!(writer.writes(), vec![("x".to_string(), 8)]);
    }

    #[test_log::test]
    fn test_get_with_loader_failure() {
        let cache = lru_cache::<u64, u64>(16, disabled_writer());
        let err = cache.get_with(1, || Err(anyhow::anyhow!("origin down"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::External);
        assert!(!cache.contains(&1));
    }

    #[test_log::test]
    fn test_expiration() {
        let writer = Arc::new(RecordingWriter::<u64, u64>::default());
        let cache = fifo_cache(16, 2, writer.clone(), Some(Duration::from_millis(20)));

        cache.insert(1, 1).unwrap();
        cache.insert(2, 2).unwrap();
        cache.insert(3, 3).unwrap();
        assert!(cache.get(&1).is_some());

        thread::sleep(Duration::from_millis(40));
        writer.clear();

        assert!(!cache.contains(&1));
        assert!(cache.get(&1).is_none());
        assert!(cache.get(&1).is_none());
        assert!(cache.remove(&2).unwrap().is_none());
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.evict_expired(), 0);
        assert!(cache.is_empty());

        let mut deletes = writer.deletes();
        deletes.sort_by_key(|(k, _, _)| *k);
        assert_eq!(
            deletes,
            vec![
                (1, Some(1), RemovalCause::Expired),
                (2, Some(2), RemovalCause::Expired),
                (3, Some(3), RemovalCause::Expired),
            ]
        );
    }

    #[test_log::test]
    fn test_stale_victim_is_reported_expired() {
        let writer = Arc::new(RecordingWriter::<u64, u64>::default());
        let cache = fifo_cache(1, 1, writer.clone(), Some(Duration::from_millis(20)));

        cache.insert(1, 1).unwrap();
        thread::sleep(Duration::from_millis(40));
        writer.clear();

        // Making room for 2 pops 1, which has already outlived its time-to-live.
        cache.insert(2, 2).unwrap();
        assert_eq!(writer.deletes(), vec![(1, Some(1), RemovalCause::Expired)]);
        assert_eq!(writer.writes(), vec![(2, 2)]);
        assert!(cache.contains(&2));
    }

    #[test_log::test]
    fn test_overweight_entry_is_admitted_alone() {
        let writer = Arc::new(RecordingWriter::<u64, u64>::default());
        let cache: FifoRawCache<u64, u64> = RawCache::new(RawCacheConfig {
            capacity: 4,
            shards: 1,
            eviction_config: FifoConfig::default(),
            hash_builder: Default::default(),
            weighter: Arc::new(|_: &u64, v: &u64| *v as usize),
            writer: writer.clone(),
            time_to_live: None,
            metrics: Arc::new(Metrics::noop()),
        });

        cache.insert(1, 1).unwrap();
        cache.insert(2, 1).unwrap();
        cache.insert(3, 10).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.usage(), 10);
        assert_eq!(
            writer.deletes(),
            vec![(1, Some(1), RemovalCause::Size), (2, Some(1), RemovalCause::Size)]
        );

        // The next insert evicts it.
        cache.insert(4, 1).unwrap();
        assert!(!cache.contains(&3));
        assert_eq!(cache.usage(), 1);
    }

    #[test_log::test]
    fn test_clear() {
        let writer = Arc::new(RecordingWriter::<u64, u64>::default());
        let cache = fifo_cache(16, 4, writer.clone(), None);
        for i in 0..8 {
            cache.insert(i, i).unwrap();
        }
        writer.clear();

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.usage(), 0);

        let mut deletes = writer.deletes();
        deletes.sort_by_key(|(k, _, _)| *k);
        assert_eq!(
            deletes,
            (0..8).map(|i| (i, Some(i), RemovalCause::Explicit)).collect_vec()
        );
    }

    #[test_log::test]
    fn test_clear_with_failing_writer() {
        let writer = Arc::new(FailingWriter::default());
        let cache = fifo_cache::<u64, u64>(16, 4, writer.clone(), None);
        for i in 0..8 {
            let _ = cache.insert(i, i);
        }

        let err = cache.clear().unwrap_err();
        assert_eq!(err.context_value("failures"), Some("8"));
        assert!(cache.is_empty());
        assert_eq!(writer.calls(), 16);
    }

    #[test_log::test]
    fn test_concurrent_inserts() {
        const THREADS: u64 = 8;
        const KEYS: u64 = 256;

        let writer = Arc::new(RecordingWriter::<u64, u64>::default());
        let cache = fifo_cache((THREADS * KEYS) as usize, 8, writer.clone(), None);

        let handles = (0..THREADS)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..KEYS {
                        cache.insert(t * KEYS + i, i).unwrap();
                    }
                })
            })
            .collect_vec();
        handles.into_iter().for_each(|h| h.join().unwrap());

        let mut keys = writer.writes().into_iter().map(|(k, _)| k).collect_vec();
        keys.sort();
        assert_eq!(keys, (0..THREADS * KEYS).collect_vec());
        assert_eq!(cache.len(), (THREADS * KEYS) as usize);
    }

    #[test_log::test]
    fn test_random_workload_accounts_usage() {
        let writer = Arc::new(RecordingWriter::<u64, u64>::default());
        let cache = lru_cache(64, writer.clone());
        let mut rng = rng();

        for _ in 0..10_000 {
            let key = rng.random_range(0..256u64);
            match rng.random_range(0..3) {
                0 => {
                    let _ = cache.insert(key, key);
                }
                1 => {
                    let _ = cache.get(&key);
                }
                _ => {
                    let _ = cache.remove(&key);
                }
            }
        }

        assert!(cache.usage() <= 64);
        assert_eq!(cache.usage(), cache.len());

        // Every key ever written either lives in the cache or has left it exactly once since its last write.
        let mut live = std::collections::HashSet::new();
        for n in writer.notifications() {
            match n {
                Notification::Write { key, .. } => {
                    live.insert(key);
                }
                Notification::Delete { key, .. } => assert!(live.remove(&key)),
            }
        }
        assert_eq!(live.len(), cache.len());
        assert!(live.iter().all(|k| cache.contains(k)));
    }

    #[test]
    fn test_shard_capacity_for() {
        let caps = (0..3)
            .map(|i| FifoRawCache::<u64, u64>::shard_capacity_for(10, 3, i))
            .collect_vec();
        assert_eq!(caps, vec![4, 3, 3]);
    }
}
