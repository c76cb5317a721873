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

//! Shared components for scrivener.
//!
//! The most important item here is [`writer::CacheWriter`], the contract a cache uses to propagate writes and
//! deletions of its entries to an external resource.

/// Key and value bounds.
pub mod code;
/// The error type shared by all scrivener crates.
pub mod error;
/// Metrics model and registries.
pub mod metrics;
/// Reasons for an entry leaving a cache.
pub mod removal;
/// A FIFO queue with random lazy removal.
pub mod removable_queue;
/// Tokio runtime and handle wrappers.
pub mod spawn;
/// The write propagation contract.
pub mod writer;
