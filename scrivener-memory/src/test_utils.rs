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

//! Writers for testing code that drives a [`CacheWriter`].

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use scrivener_common::{
    error::{Error, Result},
    removal::RemovalCause,
    writer::CacheWriter,
};

/// A notification observed by a [`RecordingWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification<K, V> {
    /// A propagated write.
    Write {
        /// Written key.
        key: K,
        /// Written value.
        value: V,
    },
    /// A propagated delete.
    Delete {
        /// Deleted key.
        key: K,
        /// Deleted value, if it was still retrievable.
        value: Option<V>,
        /// Why the entry left the cache.
        cause: RemovalCause,
    },
}

/// A writer that records every notification in arrival order.
#[derive(Debug)]
pub struct RecordingWriter<K, V> {
    notifications: Mutex<Vec<Notification<K, V>>>,
}

impl<K, V> Default for RecordingWriter<K, V> {
    fn default() -> Self {
        Self {
            notifications: Mutex::new(vec![]),
        }
    }
}

impl<K, V> RecordingWriter<K, V>
where
    K: Clone,
    V: Clone,
{
    /// All notifications so far.
    pub fn notifications(&self) -> Vec<Notification<K, V>> {
        self.notifications.lock().clone()
    }

    /// All writes so far.
    pub fn writes(&self) -> Vec<(K, V)> {
        self.notifications
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Write { key, value } => Some((key.clone(), value.clone())),
                Notification::Delete { .. } => None,
            })
            .collect()
    }

    /// All deletes so far.
    pub fn deletes(&self) -> Vec<(K, Option<V>, RemovalCause)> {
        self.notifications
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::Delete { key, value, cause } => Some((key.clone(), value.clone(), *cause)),
                Notification::Write { .. } => None,
            })
            .collect()
    }

    /// Forget the recorded notifications.
    pub fn clear(&self) {
        self.notifications.lock().clear();
    }

    /// Count of the recorded notifications.
    pub fn len(&self) -> usize {
        self.notifications.lock().len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> CacheWriter<K, V> for RecordingWriter<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn write(&self, key: &K, value: &V) -> Result<()> {
        self.notifications.lock().push(Notification::Write {
            key: key.clone(),
            value: value.clone(),
        });
        Ok(())
    }

    fn delete(&self, key: &K, value: Option<&V>, cause: RemovalCause) -> Result<()> {
        self.notifications.lock().push(Notification::Delete {
            key: key.clone(),
            value: value.cloned(),
            cause,
        });
        Ok(())
    }
}

/// A writer whose every call fails with a propagation error.
#[derive(Debug, Default)]
pub struct FailingWriter {
    calls: AtomicUsize,
}

impl FailingWriter {
    /// Count of the calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

impl<K, V> CacheWriter<K, V> for FailingWriter {
    fn write(&self, _: &K, _: &V) -> Result<()> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        Err(Error::propagation("injected write failure").with_context("op", "write"))
    }

    fn delete(&self, _: &K, _: Option<&V>, cause: RemovalCause) -> Result<()> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        Err(Error::propagation("injected delete failure")
            .with_context("op", "delete")
            .with_context("cause", cause))
    }
}

#[cfg(test)]
mod tests {
    use scrivener_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_recording_writer() {
        let writer = RecordingWriter::<&'static str, u64>::default();
        writer.write(&"a", &1).unwrap();
        writer.delete(&"a", None, RemovalCause::Collected).unwrap();

        assert_eq!(writer.len(), 2);
        assert_eq!(writer.writes(), vec![("a", 1)]);
        assert_eq!(writer.deletes(), vec![("a", None, RemovalCause::Collected)]);

        writer.clear();
        assert!(writer.is_empty());
    }

    #[test]
    fn test_failing_writer() {
        let writer = FailingWriter::default();
        let err = CacheWriter::<u64, u64>::write(&writer, &1, &1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Propagation);
        let err = CacheWriter::<u64, u64>::delete(&writer, &1, None, RemovalCause::Size).unwrap_err();
        assert_eq!(err.context_value("cause"), Some("size"));
        assert_eq!(writer.calls(), 2);
    }
}
