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

use std::sync::{Arc, LazyLock};

use crate::{error::Result, removal::RemovalCause};

/// Communicates the write or deletion of a value, based on a key, to an external resource.
///
/// The operations may be performed in either a *write-through* or a *write-behind* style: the difference is whether
/// the operation completes synchronously with the cache mutation that triggered it, or is handed off and completed
/// out-of-band.
///
/// Combined with a loader, a writer makes a tiered cache easy to build: the loader queries the secondary store on a
/// miss, and the writer keeps the secondary store up to date. The secondary store may be inclusive, or modeled as a
/// victim cache by only accepting deletes whose [`RemovalCause::was_evicted`] is `true`.
///
/// # Calling conventions
///
/// The cache engine invoking a writer must:
///
/// - call [`CacheWriter::write`] only for explicit insertions and updates, never for entries populated by a loader;
/// - call [`CacheWriter::delete`] exactly once for every entry leaving the cache, with the accurate cause;
/// - apply its own mutation before notifying, and treat an error returned from either method as a propagation
///   failure only. The cache mapping is never rolled back or altered because a writer failed.
///
/// Implementations must be safe to call concurrently from multiple threads, for different keys and for the same key.
pub trait CacheWriter<K, V>: Send + Sync + 'static {
    /// Writes the value corresponding to the `key` to the external resource.
    ///
    /// The cache communicates a write when an entry is inserted or updated explicitly. The implicit creation of an
    /// entry due to being loaded when absent is not communicated.
    ///
    /// An error means the propagation failed; the mapping in the cache is unchanged by it.
    fn write(&self, key: &K, value: &V) -> Result<()>;

    /// Deletes the value corresponding to the `key` from the external resource.
    ///
    /// The cache communicates a delete when the entry is explicitly removed or evicted. `value` is `None` if the
    /// value was no longer retrievable when the removal was observed.
    ///
    /// An error means the propagation failed; the entry is still removed from the cache.
    fn delete(&self, key: &K, value: Option<&V>, cause: RemovalCause) -> Result<()>;
}

impl<K, V, W> CacheWriter<K, V> for Arc<W>
where
    W: CacheWriter<K, V> + ?Sized,
{
    fn write(&self, key: &K, value: &V) -> Result<()> {
        self.as_ref().write(key, value)
    }

    fn delete(&self, key: &K, value: Option<&V>, cause: RemovalCause) -> Result<()> {
        self.as_ref().delete(key, value, cause)
    }
}

/// A writer that performs no operations.
///
/// Prefer [`disabled_writer`] over constructing it, so every cache shares the same instance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DisabledWriter;

impl<K, V> CacheWriter<K, V> for DisabledWriter {
    fn write(&self, _: &K, _: &V) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _: &K, _: Option<&V>, _: RemovalCause) -> Result<()> {
        Ok(())
    }
}

static DISABLED_WRITER: LazyLock<Arc<DisabledWriter>> = LazyLock::new(|| Arc::new(DisabledWriter));

/// Returns a writer that does nothing.
///
/// All calls return the same shared instance, whatever key and value types it is used with:
///
/// ```rust
/// # use std::sync::Arc;
/// # use scrivener_common::writer::{disabled_writer, CacheWriter};
/// let a: Arc<dyn CacheWriter<u64, String>> = disabled_writer();
/// let b: Arc<dyn CacheWriter<String, Vec<u8>>> = disabled_writer();
/// assert_eq!(Arc::as_ptr(&a) as *const (), Arc::as_ptr(&b) as *const ());
/// ```
pub fn disabled_writer() -> Arc<DisabledWriter> {
    DISABLED_WRITER.clone()
}

#[cfg(test)]
mod tests {
    use std::thread;

    use itertools::Itertools;

    use super::*;
    use crate::error::{Error, ErrorKind};

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<DisabledWriter>();
        is_send_sync_static::<Arc<dyn CacheWriter<u64, u64>>>();
    }

    #[test]
    fn test_disabled_writer_write() {
        let writer = disabled_writer();
        for i in 0..64u64 {
            CacheWriter::<u64, String>::write(&writer, &i, &i.to_string()).unwrap();
        }
        CacheWriter::<String, Vec<u8>>::write(&writer, &String::new(), &vec![]).unwrap();
    }

    #[test]
    fn test_disabled_writer_delete() {
        let writer = disabled_writer();
        for cause in RemovalCause::ALL {
            CacheWriter::<u64, u64>::delete(&writer, &1, Some(&1), cause).unwrap();
            CacheWriter::<u64, u64>::delete(&writer, &1, None, cause).unwrap();
        }
    }

    #[test]
    fn test_disabled_writer_is_shared() {
        let ptrs = (0..8).map(|_| Arc::as_ptr(&disabled_writer())).collect_vec();
        assert!(ptrs.iter().all_equal());

        let a: Arc<dyn CacheWriter<u64, u64>> = disabled_writer();
        let b: Arc<dyn CacheWriter<String, Vec<u8>>> = disabled_writer();
        let c: Arc<dyn CacheWriter<(u32, u32), ()>> = disabled_writer();
        assert_eq!(Arc::as_ptr(&a) as *const (), Arc::as_ptr(&b) as *const ());
        assert_eq!(Arc::as_ptr(&b) as *const (), Arc::as_ptr(&c) as *const ());
    }

    #[test]
    fn test_disabled_writer_concurrent() {
        let handles = (0..8u64)
            .map(|t| {
                thread::spawn(move || {
                    let writer: Arc<dyn CacheWriter<u64, u64>> = disabled_writer();
                    for i in 0..1000 {
                        writer.write(&(t * 1000 + i), &i).unwrap();
                        writer.delete(&(t * 1000 + i), None, RemovalCause::Collected).unwrap();
                    }
                    Arc::as_ptr(&writer) as *const () as usize
                })
            })
            .collect_vec();
        let ptrs = handles.into_iter().map(|h| h.join().unwrap()).collect_vec();
        assert!(ptrs.iter().all_equal());
    }

    struct Rejecting;

    impl CacheWriter<u64, u64> for Rejecting {
        fn write(&self, key: &u64, _: &u64) -> Result<()> {
            Err(Error::propagation("rejected").with_context("key", key))
        }

        fn delete(&self, key: &u64, _: Option<&u64>, cause: RemovalCause) -> Result<()> {
            Err(Error::propagation("rejected")
                .with_context("key", key)
                .with_context("cause", cause))
        }
    }

    #[test]
    fn test_arc_writer_forwards() {
        let writer: Arc<dyn CacheWriter<u64, u64>> = Arc::new(Rejecting);
        let shared = Arc::new(writer);

        let err = shared.write(&7u64, &7u64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Propagation);
        assert_eq!(err.context_value("key"), Some("7"));

        let err = shared.delete(&7u64, None, RemovalCause::Expired).unwrap_err();
        assert_eq!(err.context_value("cause"), Some("expired"));
    }
}
