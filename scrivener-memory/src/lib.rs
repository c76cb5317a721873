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

//! In-memory cache for scrivener.
//!
//! Every explicit write and every removal of a [`Cache`] is propagated to a
//! [`CacheWriter`](scrivener_common::writer::CacheWriter) while the owning shard is still locked, so the external
//! resource observes the mutations of one key in the same order as the cache applied them.

mod cache;
mod eviction;
mod indexer;
mod raw;
mod record;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

mod prelude;
pub use prelude::*;
