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

#[cfg(feature = "prometheus")]
pub use crate::common::metrics::registry::prometheus::PrometheusMetricsRegistry;
pub use crate::{
    common::{
        code::{HashBuilder, Key, Value},
        error::{Error, ErrorKind, Result},
        metrics::{registry::noop::NoopMetricsRegistry, BoxedRegistry, RegistryOps},
        removal::RemovalCause,
        spawn::Spawner,
        writer::{disabled_writer, CacheWriter, DisabledWriter},
    },
    memory::{Cache, CacheBuilder, CacheEntry, EvictionConfig, FifoConfig, LruConfig, Weighter},
    tiered::{TieredWriter, Tiering},
    write_behind::{FullPolicy, WriteBehind, WriteBehindBuilder},
};
