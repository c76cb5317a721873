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

use std::fmt::Debug;

use scrivener_common::{
    code::{HashBuilder, Key, Value},
    error::Result,
    removal::RemovalCause,
    writer::CacheWriter,
};
use scrivener_memory::Cache;

/// How a [`TieredWriter`] feeds the secondary cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tiering {
    /// The secondary cache holds what the primary cache evicted.
    ///
    /// Deletes of evicted entries whose value is still present are inserted into the secondary cache. Writes and
    /// explicit deletes drop the demoted copy of the key, so it never outlives a newer value.
    Victim,
    /// The secondary cache holds everything written to the primary cache.
    ///
    /// Writes are inserted into the secondary cache and explicit deletes remove from it. Evictions are ignored.
    Inclusive,
}

/// A [`CacheWriter`] that propagates the notifications of a primary cache into a secondary [`Cache`].
///
/// Reads fall through to the secondary cache with the loader of the primary one, which raises no write:
///
/// ```rust
/// # use scrivener::{Cache, CacheBuilder, TieredWriter, Tiering};
/// let l2: Cache<u64, String> = CacheBuilder::new(1024).build();
/// let l1: Cache<u64, String> = CacheBuilder::new(16)
///     .with_writer(TieredWriter::new(l2.clone(), Tiering::Victim))
///     .build();
///
/// l1.insert(1, "one".to_string()).unwrap();
/// let entry = l1
///     .get_with(1, || l2.get(&1).map(|e| e.value().clone()).ok_or_else(|| anyhow::anyhow!("miss")))
///     .unwrap();
/// assert_eq!(entry.value(), "one");
/// ```
///
/// The writer must not feed the cache that invokes it.
pub struct TieredWriter<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    secondary: Cache<K, V, S>,
    tiering: Tiering,
}

impl<K, V, S> Debug for TieredWriter<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredWriter")
            .field("secondary", &self.secondary)
            .field("tiering", &self.tiering)
            .finish()
    }
}

impl<K, V, S> TieredWriter<K, V, S>
where
    K: Key + Clone,
    V: Value + Clone,
    S: HashBuilder,
{
    /// Create a writer that feeds `secondary`.
    pub fn new(secondary: Cache<K, V, S>, tiering: Tiering) -> Self {
        Self { secondary, tiering }
    }

    /// The secondary cache.
    pub fn secondary(&self) -> &Cache<K, V, S> {
        &self.secondary
    }

    /// The tiering mode.
    pub fn tiering(&self) -> Tiering {
        self.tiering
    }
}

impl<K, V, S> CacheWriter<K, V> for TieredWriter<K, V, S>
where
    K: Key + Clone,
    V: Value + Clone,
    S: HashBuilder,
{
    fn write(&self, key: &K, value: &V) -> Result<()> {
        match self.tiering {
            Tiering::Victim => self.secondary.remove(key).map(|_| ()),
            Tiering::Inclusive => self.secondary.insert(key.clone(), value.clone()).map(|_| ()),
        }
    }

    fn delete(&self, key: &K, value: Option<&V>, cause: RemovalCause) -> Result<()> {
        if !cause.was_evicted() {
            return self.secondary.remove(key).map(|_| ());
        }
        match (self.tiering, value) {
            (Tiering::Victim, Some(value)) => {
                tracing::trace!("[tiered]: demote victim, cause: {cause}");
                self.secondary.insert(key.clone(), value.clone()).map(|_| ())
            }
            _ => Ok(()),
        }
    }
}
