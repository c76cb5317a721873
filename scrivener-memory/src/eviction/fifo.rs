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

use std::{marker::PhantomData, sync::Arc};

use scrivener_common::code::{Key, Value};
use serde::{Deserialize, Serialize};

use super::{Eviction, Op, RecordQueue};
use crate::record::Record;

/// Fifo eviction algorithm config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FifoConfig {
    /// Rebuild the queue once its holes outnumber its records by this factor.
    ///
    /// Replacing or removing an entry leaves a hole in the queue.
    pub compaction_factor: usize,
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self { compaction_factor: 2 }
    }
}

/// First-in-first-out eviction: records leave in insertion order, hits are ignored.
pub struct Fifo<K, V>
where
    K: Key,
    V: Value,
{
    queue: RecordQueue<Self>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> Eviction for Fifo<K, V>
where
    K: Key,
    V: Value,
{
    type Config = FifoConfig;
    type Key = K;
    type Value = V;

    fn new(_capacity: usize, config: &Self::Config) -> Self {
        Self {
            queue: RecordQueue::new(config.compaction_factor),
            _marker: PhantomData,
        }
    }

    fn push(&mut self, record: Arc<Record<Self>>) {
        debug_assert!(!record.is_in_eviction());
        record.set_in_eviction(true);
        self.queue.push(record);
    }

    fn pop(&mut self) -> Option<Arc<Record<Self>>> {
        let record = self.queue.pop()?;
        record.set_in_eviction(false);
        Some(record)
    }

    fn remove(&mut self, record: &Arc<Record<Self>>) -> Option<Arc<Record<Self>>> {
        let record = self.queue.remove(record)?;
        record.set_in_eviction(false);
        Some(record)
    }

    fn access(&mut self, _: &Arc<Record<Self>>) {}

    fn clear(&mut self) -> Vec<Arc<Record<Self>>> {
        let records = self.queue.clear();
        records.iter().for_each(|record| record.set_in_eviction(false));
        records
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn acquire() -> Op {
        Op::Noop
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::eviction::test_utils::{drain, record};

    type TestFifo = Fifo<u64, u64>;

    #[test]
    fn test_fifo() {
        let rs = (0..8).map(|i| record::<TestFifo>(i, i)).collect_vec();
        let mut fifo = TestFifo::new(100, &FifoConfig::default());

        for r in rs.iter().take(4) {
            fifo.push(r.clone());
        }
        assert!(rs[0].is_in_eviction());

        assert_eq!(*fifo.pop().unwrap().key(), 0);
        assert_eq!(*fifo.pop().unwrap().key(), 1);
        assert!(!rs[0].is_in_eviction());

        fifo.push(rs[4].clone());
        fifo.push(rs[5].clone());
        fifo.push(rs[6].clone());

        // Hits never reorder a fifo.
        fifo.access(&rs[2]);

        assert!(fifo.remove(&rs[3]).is_some());
        assert!(fifo.remove(&rs[5]).is_some());
        assert!(fifo.remove(&rs[5]).is_none());
        assert!(!rs[3].is_in_eviction());
        assert_eq!(fifo.len(), 3);

        assert_eq!(drain(&mut fifo), vec![2, 4, 6]);
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_fifo_clear() {
        let rs = (0..4).map(|i| record::<TestFifo>(i, i)).collect_vec();
        let mut fifo = TestFifo::new(100, &FifoConfig::default());
        rs.iter().for_each(|r| fifo.push(r.clone()));

        let cleared = fifo.clear();
        assert_eq!(cleared.iter().map(|r| *r.key()).collect_vec(), vec![0, 1, 2, 3]);
        assert!(rs.iter().all(|r| !r.is_in_eviction()));
        assert!(fifo.is_empty());
        assert!(fifo.remove(&rs[0]).is_none());
    }

    #[test]
    fn test_fifo_replace_keeps_queue_bounded() {
        let head = record::<TestFifo>(0, 0);
        let mut fifo = TestFifo::new(100, &FifoConfig::default());
        fifo.push(head.clone());

        // A replace removes the old record and pushes the new one.
        let mut current = record::<TestFifo>(1, 0);
        fifo.push(current.clone());
        for i in 1..10_000 {
            assert!(fifo.remove(&current).is_some());
            current = record::<TestFifo>(1, i);
            fifo.push(current.clone());
            assert!(fifo.queue.usage() <= 2 * 3 + 1);
        }
        assert_eq!(fifo.len(), 2);

        let drained = std::iter::from_fn(|| fifo.pop()).map(|r| *r.value()).collect_vec();
        assert_eq!(drained, vec![0, 9_999]);
    }
}
