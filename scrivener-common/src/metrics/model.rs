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

use std::borrow::Cow;

use super::{registry::noop::NoopMetricsRegistry, BoxedCounter, BoxedGauge, RegistryOps};

/// Metrics of a single cache, labeled with the cache name.
#[derive(Debug)]
pub struct Metrics {
    /* cache operations */
    /// Explicit insertions of a new key.
    pub cache_insert: BoxedCounter,
    /// Explicit insertions that replaced an existing value.
    pub cache_replace: BoxedCounter,
    /// Lookups that found a live entry.
    pub cache_hit: BoxedCounter,
    /// Lookups that found nothing or an expired entry.
    pub cache_miss: BoxedCounter,
    /// Explicit removals.
    pub cache_remove: BoxedCounter,
    /// Entries evicted for capacity.
    pub cache_evict: BoxedCounter,
    /// Entries dropped after their time-to-live.
    pub cache_expire: BoxedCounter,
    /// Entries populated by a loader.
    pub cache_load: BoxedCounter,

    /// Total weight of the cached entries.
    pub cache_usage: BoxedGauge,

    /* writer propagation */
    /// Write notifications handed to the writer.
    pub propagation_write: BoxedCounter,
    /// Delete notifications handed to the writer.
    pub propagation_delete: BoxedCounter,
    /// Notifications the writer failed to propagate.
    pub propagation_failure: BoxedCounter,

    /// Notifications buffered by a write-behind writer and not yet propagated.
    pub write_behind_queue: BoxedGauge,
}

impl Metrics {
    /// Create metrics of the cache `name` within `registry`.
    pub fn new<R>(name: impl Into<Cow<'static, str>>, registry: &R) -> Self
    where
        R: RegistryOps + ?Sized,
    {
        let name = name.into();

        let scrivener_cache_op_total = registry.register_counter_vec(
            "scrivener_cache_op_total".into(),
            "scrivener cache operations".into(),
            &["name", "op"],
        );
        let scrivener_cache_usage =
            registry.register_gauge_vec("scrivener_cache_usage".into(), "scrivener cache usage".into(), &["name"]);
        let scrivener_propagation_total = registry.register_counter_vec(
            "scrivener_propagation_total".into(),
            "scrivener writer propagations".into(),
            &["name", "op"],
        );
        let scrivener_write_behind_queue = registry.register_gauge_vec(
            "scrivener_write_behind_queue".into(),
            "scrivener write-behind buffered notifications".into(),
            &["name"],
        );

        let op = |op: &'static str| scrivener_cache_op_total.counter(&[name.clone(), op.into()]);
        let propagation = |op: &'static str| scrivener_propagation_total.counter(&[name.clone(), op.into()]);

        Self {
            cache_insert: op("insert"),
            cache_replace: op("replace"),
            cache_hit: op("hit"),
            cache_miss: op("miss"),
            cache_remove: op("remove"),
            cache_evict: op("evict"),
            cache_expire: op("expire"),
            cache_load: op("load"),
            cache_usage: scrivener_cache_usage.gauge(&[name.clone()]),
            propagation_write: propagation("write"),
            propagation_delete: propagation("delete"),
            propagation_failure: propagation("failure"),
            write_behind_queue: scrivener_write_behind_queue.gauge(&[name.clone()]),
        }
    }

    /// Create metrics that record nothing.
    pub fn noop() -> Self {
        Self::new("noop", &NoopMetricsRegistry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BoxedRegistry;

    fn case(registry: &(impl RegistryOps + ?Sized)) {
        let metrics = Metrics::new("test", registry);
        metrics.cache_insert.increase(1);
        metrics.cache_usage.increase(8);
        metrics.cache_usage.decrease(3);
        metrics.propagation_failure.increase(1);
        metrics.write_behind_queue.absolute(0);
    }

    #[test]
    fn test_metrics_noop() {
        case(&NoopMetricsRegistry);
        let boxed: BoxedRegistry = Box::new(NoopMetricsRegistry);
        case(boxed.as_ref());
        let _ = Metrics::noop();
    }

    #[cfg(feature = "prometheus")]
    #[test]
    fn test_metrics_prometheus() {
        use crate::metrics::registry::prometheus::PrometheusMetricsRegistry;

        let registry = PrometheusMetricsRegistry::new(prometheus::Registry::new());
        case(&registry);
        // Two caches sharing one registry.
        let other = Metrics::new("other", &registry);
        other.cache_hit.increase(2);

        assert_eq!(registry.registry().gather().len(), 4);
    }
}
