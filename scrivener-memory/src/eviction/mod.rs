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

use std::sync::Arc;

use scrivener_common::{
    code::{Key, Value},
    removable_queue::RemovableQueue,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::record::Record;

/// Bounds of an eviction algorithm config.
pub trait Config: Send + Sync + 'static + Clone + Serialize + DeserializeOwned + Default {}
impl<T> Config for T where T: Send + Sync + 'static + Clone + Serialize + DeserializeOwned + Default {}

/// What the cache must do with the eviction algorithm when an entry is hit.
pub enum Op {
    /// The algorithm ignores hits; lookups only need the shared shard lock.
    Noop,
    /// The algorithm updates its state on hits through [`Eviction::access`]; lookups take the exclusive shard lock.
    Mutable,
}

/// Cache eviction algorithm abstraction.
///
/// The algorithm holds shared references to the records it tracks. The caller guarantees that a record is pushed at
/// most once before it is popped or removed.
pub trait Eviction: Send + Sync + 'static + Sized {
    /// Cache eviction algorithm configurations.
    type Config: Config;
    /// Cache key.
    type Key: Key;
    /// Cache value.
    type Value: Value;

    /// Create a new cache eviction algorithm instance for a shard with the given capacity.
    fn new(capacity: usize, config: &Self::Config) -> Self;

    /// Push a record into the cache eviction algorithm instance.
    ///
    /// The instance MUST set the `IN_EVICTION` flag of the record.
    fn push(&mut self, record: Arc<Record<Self>>);

    /// Pop the next victim from the cache eviction algorithm instance.
    ///
    /// The instance MUST clear the `IN_EVICTION` flag of the record.
    fn pop(&mut self) -> Option<Arc<Record<Self>>>;

    /// Remove a record from the cache eviction algorithm instance.
    ///
    /// The instance MUST clear the `IN_EVICTION` flag of the record.
    fn remove(&mut self, record: &Arc<Record<Self>>) -> Option<Arc<Record<Self>>>;

    /// Notify the cache eviction algorithm instance that a record it holds has been hit.
    ///
    /// Only called if [`Eviction::acquire`] returns [`Op::Mutable`].
    fn access(&mut self, record: &Arc<Record<Self>>);

    /// Remove all records from the cache eviction algorithm instance.
    fn clear(&mut self) -> Vec<Arc<Record<Self>>>;

    /// Return the count of the records that in the cache eviction algorithm instance.
    fn len(&self) -> usize;

    /// Return if the cache eviction algorithm instance is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tell the cache how a hit interacts with the algorithm.
    fn acquire() -> Op;
}

/// Queue position bookkeeping shared by the queue-based algorithms.
///
/// Every removal and every reorder leaves a hole in the queue. The queue is rebuilt once its holes outnumber its
/// records by `compaction_factor`, so a shard that is never full still keeps its queue bounded.
pub(crate) struct RecordQueue<E>
where
    E: Eviction,
{
    queue: RemovableQueue<Arc<Record<E>>>,
    compaction_factor: usize,
}

impl<E> RecordQueue<E>
where
    E: Eviction,
{
    pub fn new(compaction_factor: usize) -> Self {
        Self {
            queue: RemovableQueue::new(),
            compaction_factor: compaction_factor.max(1),
        }
    }

    /// Push the record to the tail, storing its token in the record.
    pub fn push(&mut self, record: Arc<Record<E>>) {
        let token = self.queue.push(record.clone());
        record.set_token(Some(token));
    }

    pub fn pop(&mut self) -> Option<Arc<Record<E>>> {
        let record = self.queue.pop()?;
        record.take_token();
        Some(record)
    }

    /// Unlink the record, returning `None` if it is not queued.
    pub fn remove(&mut self, record: &Arc<Record<E>>) -> Option<Arc<Record<E>>> {
        let record = self.queue.remove(record.take_token()?)?;
        self.may_compact();
        Some(record)
    }

    /// Move a queued record to the tail.
    pub fn requeue(&mut self, record: &Arc<Record<E>>) {
        let Some(token) = record.take_token() else {
            return;
        };
        if let Some(record) = self.queue.remove(token) {
            self.push(record);
            self.may_compact();
        }
    }

    pub fn clear(&mut self) -> Vec<Arc<Record<E>>> {
        let records = self.queue.clear();
        for record in records.iter() {
            record.take_token();
        }
        records
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Slots of the underlying queue, holes included.
    #[cfg(test)]
    pub fn usage(&self) -> usize {
        self.queue.usage()
    }

    fn may_compact(&mut self) {
        let holes = self.queue.usage() - self.queue.len();
        if holes <= self.queue.len().max(1) * self.compaction_factor {
            return;
        }
        tracing::trace!(
            "[eviction]: compact queue, records: {}, holes: {}",
            self.queue.len(),
            holes
        );
        for record in self.queue.clear() {
            self.push(record);
        }
    }
}

pub mod fifo;
pub mod lru;
