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

//! scrivener - write propagation for in-memory caches.
//!
//! A [`Cache`] reports every explicit write and every removal of its entries to a [`CacheWriter`], which keeps an
//! external resource in step with the cache. A writer failure never changes what the cache holds.
//!
//! ```rust
//! # use scrivener::{Cache, CacheBuilder, CacheWriter, RemovalCause, Result};
//! #[derive(Debug, Default)]
//! struct Stdout;
//!
//! impl CacheWriter<u64, String> for Stdout {
//!     fn write(&self, key: &u64, value: &String) -> Result<()> {
//!         println!("write {key} => {value}");
//!         Ok(())
//!     }
//!
//!     fn delete(&self, key: &u64, value: Option<&String>, cause: RemovalCause) -> Result<()> {
//!         println!("delete {key} => {value:?}, cause: {cause}");
//!         Ok(())
//!     }
//! }
//!
//! let cache: Cache<u64, String> = CacheBuilder::new(16).with_writer(Stdout).build();
//! cache.insert(1, "one".to_string()).unwrap();
//! cache.remove(&1).unwrap();
//! ```

pub use scrivener_common as common;
pub use scrivener_memory as memory;

mod tiered;
mod write_behind;

mod prelude;
pub use prelude::*;
