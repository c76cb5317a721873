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
    future::Future,
    mem::ManuallyDrop,
    ops::Deref,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::{
    runtime::{Handle, Runtime},
    task::JoinHandle,
};

use crate::error::{Error, ErrorKind, Result};

/// A [`Runtime`] that is shut down in the background when dropped.
///
/// Dropping a runtime from within another runtime panics, which happens easily when a write-behind worker owns a
/// dedicated runtime and the cache is dropped inside an async context.
pub struct BackgroundShutdownRuntime(ManuallyDrop<Runtime>);

impl Debug for BackgroundShutdownRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackgroundShutdownRuntime").finish()
    }
}

impl Drop for BackgroundShutdownRuntime {
    fn drop(&mut self) {
        // Safety: the runtime is only taken once, here.
        let runtime = unsafe { ManuallyDrop::take(&mut self.0) };
        runtime.shutdown_background();
    }
}

impl Deref for BackgroundShutdownRuntime {
    type Target = Runtime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Runtime> for BackgroundShutdownRuntime {
    fn from(runtime: Runtime) -> Self {
        Self(ManuallyDrop::new(runtime))
    }
}

/// A [`JoinHandle`] whose join failure is reported as an [`ErrorKind::Join`] error.
#[derive(Debug)]
pub struct SpawnHandle<T> {
    inner: JoinHandle<T>,
}

impl<T> SpawnHandle<T> {
    /// Returns `true` if the task has finished.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for SpawnHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx).map(|res| {
            res.map_err(|e| {
                let kind = if e.is_cancelled() {
                    ErrorKind::TaskCancelled
                } else {
                    ErrorKind::Join
                };
                Error::new(kind, "tokio join error").with_source(e)
            })
        })
    }
}

/// Where background work of scrivener runs: a dedicated runtime or a handle to an existing one.
#[derive(Debug, Clone)]
pub enum Spawner {
    /// A dedicated runtime.
    Runtime(Arc<BackgroundShutdownRuntime>),
    /// A handle to a runtime owned by someone else.
    Handle(Handle),
}

impl From<Runtime> for Spawner {
    fn from(runtime: Runtime) -> Self {
        Self::Runtime(Arc::new(runtime.into()))
    }
}

impl From<Handle> for Spawner {
    fn from(handle: Handle) -> Self {
        Self::Handle(handle)
    }
}

impl Spawner {
    /// Wrapper for [`Runtime::spawn`] or [`Handle::spawn`].
    pub fn spawn<F>(&self, future: F) -> SpawnHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let inner = match self {
            Spawner::Runtime(rt) => rt.spawn(future),
            Spawner::Handle(h) => h.spawn(future),
        };
        SpawnHandle { inner }
    }

    /// Wrapper for [`Runtime::spawn_blocking`] or [`Handle::spawn_blocking`].
    pub fn spawn_blocking<F, R>(&self, func: F) -> SpawnHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let inner = match self {
            Spawner::Runtime(rt) => rt.spawn_blocking(func),
            Spawner::Handle(h) => h.spawn_blocking(func),
        };
        SpawnHandle { inner }
    }

    /// The spawner of the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn current() -> Self {
        Spawner::Handle(Handle::current())
    }

    /// The spawner of the current runtime, or `None` outside of a tokio runtime.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Spawner::Handle)
    }

    /// Build a spawner with a dedicated multi-thread runtime.
    pub fn dedicated(name: &str, worker_threads: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name(name)
            .worker_threads(worker_threads.max(1))
            .enable_all()
            .build()
            .map_err(|e| {
                Error::new(ErrorKind::Config, "build dedicated runtime failed")
                    .with_context("name", name)
                    .with_source(e)
            })?;
        Ok(runtime.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_on_current() {
        let spawner = Spawner::current();
        assert_eq!(spawner.spawn(async { 42 }).await.unwrap(), 42);
        assert_eq!(spawner.spawn_blocking(|| 7).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_join_error() {
        let spawner = Spawner::current();
        let err = spawner.spawn(async { panic!("boom") }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Join);
    }

    #[test]
    fn test_dedicated_runtime() {
        assert!(Spawner::try_current().is_none());
        let spawner = Spawner::dedicated("scrivener-test", 1).unwrap();
        let handle = spawner.spawn_blocking(|| "done");
        let res = match &spawner {
            Spawner::Runtime(rt) => rt.block_on(handle).unwrap(),
            Spawner::Handle(_) => unreachable!(),
        };
        assert_eq!(res, "done");
    }
}
