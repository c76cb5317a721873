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

use std::{hash::Hash, sync::Arc};

use equivalent::Equivalent;
use hashbrown::hash_table::{Entry as HashTableEntry, HashTable};

use crate::{eviction::Eviction, record::Record};

/// Key to record index of a cache shard.
///
/// The indexer keeps the `IN_INDEXER` flag of its records up to date.
pub trait Indexer: Send + Sync + 'static + Default {
    /// The eviction algorithm the indexed records belong to.
    type Eviction: Eviction;

    /// Insert a record, returning the record it replaced, if any.
    fn insert(&mut self, record: Arc<Record<Self::Eviction>>) -> Option<Arc<Record<Self::Eviction>>>;

    /// Get the record of the key.
    fn get<Q>(&self, hash: u64, key: &Q) -> Option<&Arc<Record<Self::Eviction>>>
    where
        Q: Hash + Equivalent<<Self::Eviction as Eviction>::Key> + ?Sized;

    /// Remove the record of the key.
    fn remove<Q>(&mut self, hash: u64, key: &Q) -> Option<Arc<Record<Self::Eviction>>>
    where
        Q: Hash + Equivalent<<Self::Eviction as Eviction>::Key> + ?Sized;

    /// Remove all records.
    fn drain(&mut self) -> Vec<Arc<Record<Self::Eviction>>>;

    /// Iterate over the indexed records in arbitrary order.
    fn iter(&self) -> impl Iterator<Item = &Arc<Record<Self::Eviction>>>;

    /// Count of the indexed records.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`Indexer`] backed by a [`HashTable`] of records, probed with the precomputed key hash.
pub struct HashTableIndexer<E>
where
    E: Eviction,
{
    table: HashTable<Arc<Record<E>>>,
}

impl<E> Default for HashTableIndexer<E>
where
    E: Eviction,
{
    fn default() -> Self {
        Self {
            table: Default::default(),
        }
    }
}

impl<E> Indexer for HashTableIndexer<E>
where
    E: Eviction,
{
    type Eviction = E;

    fn insert(&mut self, mut record: Arc<Record<Self::Eviction>>) -> Option<Arc<Record<Self::Eviction>>> {
        record.set_in_indexer(true);
        match self
            .table
            .entry(record.hash(), |r| r.key() == record.key(), |r| r.hash())
        {
            HashTableEntry::Occupied(mut o) => {
                std::mem::swap(o.get_mut(), &mut record);
                record.set_in_indexer(false);
                Some(record)
            }
            HashTableEntry::Vacant(v) => {
                v.insert(record);
                None
            }
        }
    }

    fn get<Q>(&self, hash: u64, key: &Q) -> Option<&Arc<Record<Self::Eviction>>>
    where
        Q: Hash + Equivalent<<Self::Eviction as Eviction>::Key> + ?Sized,
    {
        self.table.find(hash, |r| key.equivalent(r.key()))
    }

    fn remove<Q>(&mut self, hash: u64, key: &Q) -> Option<Arc<Record<Self::Eviction>>>
    where
        Q: Hash + Equivalent<<Self::Eviction as Eviction>::Key> + ?Sized,
    {
        match self.table.find_entry(hash, |r| key.equivalent(r.key())) {
            Ok(o) => {
                let (record, _) = o.remove();
                record.set_in_indexer(false);
                Some(record)
            }
            Err(_) => None,
        }
    }

    fn drain(&mut self) -> Vec<Arc<Record<Self::Eviction>>> {
        self.table
            .drain()
            .inspect(|record| record.set_in_indexer(false))
            .collect()
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<Record<Self::Eviction>>> {
        self.table.iter()
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use std::hash::BuildHasher;

    use hashbrown::DefaultHashBuilder;

    use super::*;
    use crate::{eviction::fifo::Fifo, record::Data};

    type TestEviction = Fifo<String, u64>;

    fn record(hash_builder: &DefaultHashBuilder, key: &str, value: u64) -> Arc<Record<TestEviction>> {
        Arc::new(Record::new(Data {
            key: key.to_string(),
            value,
            hash: hash_builder.hash_one(key),
            weight: 1,
        }))
    }

    #[test]
    fn test_hash_table_indexer() {
        let hb = DefaultHashBuilder::default();
        let mut indexer = HashTableIndexer::<TestEviction>::default();

        let a1 = record(&hb, "a", 1);
        assert!(indexer.insert(a1.clone()).is_none());
        assert!(a1.is_in_indexer());

        let a2 = record(&hb, "a", 2);
        let old = indexer.insert(a2.clone()).unwrap();
        assert!(Arc::ptr_eq(&old, &a1));
        assert!(!a1.is_in_indexer());
        assert!(a2.is_in_indexer());
        assert_eq!(indexer.len(), 1);

        // Lookup by `&str` through `Equivalent`.
        let hit = indexer.get(hb.hash_one("a"), "a").unwrap();
        assert_eq!(*hit.value(), 2);
        assert!(indexer.get(hb.hash_one("b"), "b").is_none());

        assert!(indexer.insert(record(&hb, "b", 3)).is_none());
        let mut values = indexer.iter().map(|r| *r.value()).collect::<Vec<_>>();
        values.sort();
        assert_eq!(values, vec![2, 3]);

        let removed = indexer.remove(hb.hash_one("a"), "a").unwrap();
        assert!(!removed.is_in_indexer());
        assert!(indexer.remove(hb.hash_one("a"), "a").is_none());

        let drained = indexer.drain();
        assert_eq!(drained.len(), 1);
        assert!(!drained[0].is_in_indexer());
        assert!(indexer.is_empty());
    }
}
