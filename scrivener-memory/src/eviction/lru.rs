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

/// Lru eviction algorithm config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LruConfig {
    /// Rebuild the queue once its holes outnumber its records by this factor.
    ///
    /// Every hit, replace and removal leaves a hole behind.
    pub compaction_factor: usize,
}

impl Default for LruConfig {
    fn default() -> Self {
        Self { compaction_factor: 2 }
    }
}

/// Least-recently-used eviction.
pub struct Lru<K, V>
where
    K: Key,
    V: Value,
{
    queue: RecordQueue<Self>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> Eviction for Lru<K, V>
where
    K: Key,
    V: Value,
{
    type Config = LruConfig;
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

    fn access(&mut self, record: &Arc<Record<Self>>) {
        self.queue.requeue(record);
    }

    fn clear(&mut self) -> Vec<Arc<Record<Self>>> {
        let records = self.queue.clear();
        records.iter().for_each(|record| record.set_in_eviction(false));
        records
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn acquire() -> Op {
        Op::Mutable
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;
    use crate::eviction::test_utils::{drain, record};

    type TestLru = Lru<u64, u64>;

    #[test]
    fn test_lru() {
        let rs = (0..8).map(|i| record::<TestLru>(i, i)).collect_vec();
        let mut lru = TestLru::new(100, &LruConfig::default());

        for r in rs.iter().take(6) {
            lru.push(r.clone());
        }

        lru.access(&rs[0]);
        lru.access(&rs[2]);
        assert_eq!(*lru.pop().unwrap().key(), 1);

        assert!(lru.remove(&rs[3]).is_some());
        assert!(!rs[3].is_in_eviction());
        // Accessing a record that is no longer queued is a no-op.
        lru.access(&rs[3]);

        lru.push(rs[6].clone());
        lru.access(&rs[4]);
        assert_eq!(lru.len(), 5);

        assert_eq!(drain(&mut lru), vec![5, 0, 2, 6, 4]);
    }

    #[test]
    fn test_lru_compaction() {
        let rs = (0..4).map(|i| record::<TestLru>(i, i)).collect_vec();
        let mut lru = TestLru::new(100, &LruConfig { compaction_factor: 2 });
        rs.iter().for_each(|r| lru.push(r.clone()));

        for _ in 0..1000 {
            lru.access(&rs[1]);
            lru.access(&rs[2]);
        }
        assert_eq!(lru.len(), 4);
        assert!(lru.queue.usage() <= 4 * 3 + 1);

        assert_eq!(drain(&mut lru), vec![0, 3, 1, 2]);
    }

    #[test]
    fn test_lru_replace_keeps_queue_bounded() {
        let head = record::<TestLru>(0, 0);
        let mut lru = TestLru::new(100, &LruConfig::default());
        lru.push(head.clone());

        // A replace removes the old record and pushes the new one, with no hit in between.
        let mut current = record::<TestLru>(1, 0);
        lru.push(current.clone());
        for i in 1..10_000 {
            assert!(lru.remove(&current).is_some());
            current = record::<TestLru>(1, i);
            lru.push(current.clone());
            assert!(lru.queue.usage() <= 2 * 3 + 1);
        }
        assert_eq!(lru.len(), 2);
        assert_eq!(drain(&mut lru), vec![0, 1]);
    }

    #[test]
    fn test_lru_clear() {
        let rs = (0..4).map(|i| record::<TestLru>(i, i)).collect_vec();
        let mut lru = TestLru::new(100, &LruConfig::default());
        rs.iter().for_each(|r| lru.push(r.clone()));
        lru.access(&rs[0]);

        assert_eq!(lru.clear().iter().map(|r| *r.key()).collect_vec(), vec![1, 2, 3, 0]);
        assert!(rs.iter().all(|r| !r.is_in_eviction()));
        assert!(lru.is_empty());
    }
}
