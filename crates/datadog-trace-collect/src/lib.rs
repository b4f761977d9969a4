// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffers spans in a size-bounded cache until they are grown into complete
//! traces or evicted for other reasons.
//!
//! Producers push batches of spans through [`Cache::add`]. The cache groups
//! them by trace ID in a recency-ordered list and emits an [`EvictedTrace`]
//! on the bounded eviction channel in two cases:
//!
//! - **root eviction**: a span completing its trace was received (no
//!   parent, or the client flagged it as root);
//! - **space eviction**: the size budget was exceeded and the least
//!   recently touched trace has to go.
//!
//! An [`EvictionConsumer`] task drains the channel, counts evictions in
//! statsd and forwards each trace downstream. When a statsd client is
//! configured, a monitor task periodically reports age-distribution and
//! size gauges over the same structure.

pub mod cache;
pub mod consumer;
pub mod error;
mod monitor;
mod recency;
pub mod span;
pub mod statsd;
pub mod test_utils;

pub use cache::{
    Cache, CacheSettings, EvictedTrace, EvictionReason, DEFAULT_MAX_SIZE,
    EVICTION_CHANNEL_CAPACITY,
};
pub use consumer::EvictionConsumer;
pub use error::CacheError;
pub use recency::TraceEntry;
pub use span::{Span, Trace};
pub use statsd::{MetricsClient, UdpStatsdClient};
