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

//! Asynchronous propagation of cache notifications.

use std::{
    borrow::Cow,
    fmt::Debug,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use scrivener_common::{
    code::{Key, Value},
    error::{Error, ErrorKind, Result},
    metrics::{model::Metrics, registry::noop::NoopMetricsRegistry, BoxedRegistry},
    removal::RemovalCause,
    spawn::{SpawnHandle, Spawner},
    writer::CacheWriter,
};
use tokio::sync::oneshot;

/// What to do when a notification arrives while the write-behind queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullPolicy {
    /// Block the notifying thread until the worker makes room.
    #[default]
    Block,
    /// Fail the notification with a propagation error.
    Reject,
}

enum Submission<K, V> {
    Write { key: K, value: V },
    Delete { key: K, value: Option<V>, cause: RemovalCause },
    Flush { tx: oneshot::Sender<()> },
}

impl<K, V> Debug for Submission<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Write { .. } => f.debug_struct("Write").finish(),
            Self::Delete { value, cause, .. } => f
                .debug_struct("Delete")
                .field("present", &value.is_some())
                .field("cause", cause)
                .finish(),
            Self::Flush { .. } => f.debug_struct("Flush").finish(),
        }
    }
}

/// Builder of [`WriteBehind`].
pub struct WriteBehindBuilder<K, V, W>
where
    K: Key + Clone,
    V: Value + Clone,
    W: CacheWriter<K, V>,
{
    name: Cow<'static, str>,
    inner: W,
    buffer_capacity: usize,
    full_policy: FullPolicy,
    spawner: Option<Spawner>,
    registry: BoxedRegistry,
    _marker: std::marker::PhantomData<fn(K, V)>,
}

impl<K, V, W> WriteBehindBuilder<K, V, W>
where
    K: Key + Clone,
    V: Value + Clone,
    W: CacheWriter<K, V>,
{
    /// Create a builder of a write-behind propagator that forwards notifications to `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            name: "scrivener".into(),
            inner,
            buffer_capacity: 4096,
            full_policy: FullPolicy::default(),
            spawner: None,
            registry: Box::new(NoopMetricsRegistry),
            _marker: std::marker::PhantomData,
        }
    }

    /// Set the name used as the metrics label.
    ///
    /// Default: `scrivener`.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Set how many notifications may wait for the worker. `0` means unbounded.
    ///
    /// Default: 4096.
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    /// Set what happens when the queue is full.
    ///
    /// Default: [`FullPolicy::Block`].
    pub fn with_full_policy(mut self, full_policy: FullPolicy) -> Self {
        self.full_policy = full_policy;
        self
    }

    /// Set the spawner that runs the worker.
    ///
    /// Default: the runtime the builder is built in.
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Set the metrics registry.
    ///
    /// Default: [`NoopMetricsRegistry`].
    pub fn with_metrics_registry(mut self, registry: BoxedRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Start the worker and build the write-behind propagator.
    ///
    /// Fails with [`ErrorKind::Config`] if no spawner is set and the builder is used outside of a tokio runtime.
    pub fn build(self) -> Result<WriteBehind<K, V>> {
        let spawner = match self.spawner.or_else(Spawner::try_current) {
            Some(spawner) => spawner,
            None => {
                return Err(
                    Error::new(ErrorKind::Config, "write-behind requires a spawner outside of a tokio runtime")
                        .with_context("name", &self.name),
                )
            }
        };

        let (tx, rx) = match self.buffer_capacity {
            0 => flume::unbounded(),
            capacity => flume::bounded(capacity),
        };

        let metrics = Arc::new(Metrics::new(self.name.clone(), self.registry.as_ref()));
        let pending = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        let worker = Worker {
            rx,
            inner: self.inner,
            pending: pending.clone(),
            failures: failures.clone(),
            metrics: metrics.clone(),
        };
        let handle = spawner.spawn_blocking(move || worker.run());

        tracing::debug!(
            "[write behind]: started, name: {}, buffer capacity: {}, full policy: {:?}",
            self.name,
            self.buffer_capacity,
            self.full_policy
        );

        Ok(WriteBehind {
            inner: Arc::new(WriteBehindInner {
                name: self.name,
                tx: RwLock::new(Some(tx)),
                handle: Mutex::new(Some(handle)),
                full_policy: self.full_policy,
                pending,
                failures,
                metrics,
            }),
        })
    }
}

struct WriteBehindInner<K, V> {
    name: Cow<'static, str>,
    tx: RwLock<Option<flume::Sender<Submission<K, V>>>>,
    handle: Mutex<Option<SpawnHandle<()>>>,
    full_policy: FullPolicy,
    pending: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
    metrics: Arc<Metrics>,
}

/// A [`CacheWriter`] that queues owned copies of the notifications and returns immediately.
///
/// A single worker forwards the queued notifications to the inner writer in enqueue order. Failures of the inner
/// writer are logged and counted by the worker, they never reach the cache operation that raised the notification.
///
/// Cloning shares the queue and the worker.
pub struct WriteBehind<K, V> {
    inner: Arc<WriteBehindInner<K, V>>,
}

impl<K, V> Debug for WriteBehind<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBehind")
            .field("name", &self.inner.name)
            .field("full_policy", &self.inner.full_policy)
            .field("pending", &self.inner.pending.load(Ordering::Relaxed))
            .field("failures", &self.inner.failures.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K, V> Clone for WriteBehind<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> WriteBehind<K, V>
where
    K: Key + Clone,
    V: Value + Clone,
{
    /// Create a builder of a write-behind propagator that forwards notifications to `inner`.
    pub fn builder<W>(inner: W) -> WriteBehindBuilder<K, V, W>
    where
        W: CacheWriter<K, V>,
    {
        WriteBehindBuilder::new(inner)
    }

    fn submit(&self, submission: Submission<K, V>) -> Result<()> {
        let guard = self.inner.tx.read();
        let Some(tx) = guard.as_ref() else {
            return Err(Error::new(ErrorKind::ChannelClosed, "write-behind is closed").with_context("name", &self.inner.name));
        };

        // Count before sending so the worker never observes a notification it has not been told about.
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        self.inner.metrics.write_behind_queue.increase(1);

        let res = match self.inner.full_policy {
            FullPolicy::Block => tx.send(submission).map_err(|_| {
                Error::new(ErrorKind::ChannelClosed, "write-behind worker is gone").with_context("name", &self.inner.name)
            }),
            FullPolicy::Reject => tx.try_send(submission).map_err(|e| match e {
                flume::TrySendError::Full(_) => Error::propagation("write-behind queue is full")
                    .with_context("name", &self.inner.name)
                    .with_context("capacity", tx.capacity().unwrap_or_default()),
                flume::TrySendError::Disconnected(_) => Error::new(ErrorKind::ChannelClosed, "write-behind worker is gone")
                    .with_context("name", &self.inner.name),
            }),
        };

        if res.is_err() {
            self.inner.pending.fetch_sub(1, Ordering::AcqRel);
            self.inner.metrics.write_behind_queue.decrease(1);
        }
        res
    }

    /// Wait until every notification queued before the call has been handed to the inner writer.
    ///
    /// Returns immediately if the write-behind propagator is closed, as closing drains the queue.
    #[cfg_attr(feature = "tracing", fastrace::trace(name = "scrivener::write_behind::flush"))]
    pub async fn flush(&self) -> Result<()> {
        let tx = match self.inner.tx.read().as_ref() {
            Some(tx) => tx.clone(),
            None => return Ok(()),
        };

        let (notify_tx, notify_rx) = oneshot::channel();
        // The flush marker always waits for room, whatever the full policy is.
        if tx.send_async(Submission::Flush { tx: notify_tx }).await.is_err() {
            return Err(
                Error::new(ErrorKind::ChannelClosed, "write-behind worker is gone").with_context("name", &self.inner.name)
            );
        }
        drop(tx);

        notify_rx.await.map_err(|e| {
            Error::new(ErrorKind::ChannelClosed, "write-behind worker is gone")
                .with_context("name", &self.inner.name)
                .with_source(e)
        })
    }

    /// Stop accepting notifications, drain the queue and join the worker.
    ///
    /// Notifications raised after closing fail with [`ErrorKind::ChannelClosed`]. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        // Dropping the last sender lets the worker exit once the queue is drained.
        let tx = self.inner.tx.write().take();
        drop(tx);

        let handle = self.inner.handle.lock().take();
        if let Some(handle) = handle {
            handle.await?;
            tracing::debug!(
                "[write behind]: closed, name: {}, failures: {}",
                self.inner.name,
                self.failures()
            );
        }
        Ok(())
    }

    /// Returns `true` if the write-behind propagator no longer accepts notifications.
    pub fn is_closed(&self) -> bool {
        self.inner.tx.read().is_none()
    }

    /// Count of the notifications that have not been handed to the inner writer yet.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Count of the notifications the inner writer failed to propagate.
    pub fn failures(&self) -> usize {
        self.inner.failures.load(Ordering::Acquire)
    }
}

impl<K, V> CacheWriter<K, V> for WriteBehind<K, V>
where
    K: Key + Clone,
    V: Value + Clone,
{
    fn write(&self, key: &K, value: &V) -> Result<()> {
        self.submit(Submission::Write {
            key: key.clone(),
            value: value.clone(),
        })
    }

    fn delete(&self, key: &K, value: Option<&V>, cause: RemovalCause) -> Result<()> {
        self.submit(Submission::Delete {
            key: key.clone(),
            value: value.cloned(),
            cause,
        })
    }
}

struct Worker<K, V, W> {
    rx: flume::Receiver<Submission<K, V>>,
    inner: W,
    pending: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
    metrics: Arc<Metrics>,
}

impl<K, V, W> Worker<K, V, W>
where
    K: Key,
    V: Value,
    W: CacheWriter<K, V>,
{
    fn run(self) {
        while let Ok(submission) = self.rx.recv() {
            tracing::trace!("[write behind]: handle submission: {submission:?}");
            let res = match submission {
                Submission::Write { key, value } => self.inner.write(&key, &value),
                Submission::Delete { key, value, cause } => self.inner.delete(&key, value.as_ref(), cause),
                Submission::Flush { tx } => {
                    let _ = tx.send(());
                    continue;
                }
            };

            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.metrics.write_behind_queue.decrease(1);

            if let Err(e) = res {
                self.failures.fetch_add(1, Ordering::AcqRel);
                self.metrics.propagation_failure.increase(1);
                tracing::warn!("[write behind]: inner writer failed, error: {e}");
            }
        }
        tracing::trace!("[write behind]: worker exits");
    }
}
