// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic statsd reporting on the cache contents.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{Cache, Cursor};
use crate::statsd::MetricsClient;

/// How often the monitor reports cache gauges.
const MONITOR_INTERVAL: Duration = Duration::from_secs(120);

const ONE_MINUTE: Duration = Duration::from_secs(60);
const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
const TEN_MINUTES: Duration = Duration::from_secs(10 * 60);

static STATSD_TAGS: &[&str] = &["version:v1"];

/// Entry counts per age bracket, where age is the time since the last span
/// was added to the entry.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct AgeBuckets {
    pub under_1m: u64,
    pub from_1m_to_5m: u64,
    pub from_5m_to_10m: u64,
    pub over_10m: u64,
}

/// Runs a loop sending occasional statsd gauges, until cancelled.
pub(crate) async fn run(
    cache: Arc<Cache>,
    client: Arc<dyn MetricsClient>,
    cancel: CancellationToken,
) {
    let mut tick = interval(MONITOR_INTERVAL);
    tick.tick().await; // discard first tick, which is instantaneous
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Cache monitor stopped");
                return;
            }
            _ = tick.tick() => send_stats(&cache, client.as_ref()),
        }
    }
}

fn send_stats(cache: &Cache, client: &dyn MetricsClient) {
    let (buckets, count, bytes) = {
        let mut iter = cache.iter_rev();
        let count = iter.len();
        let bytes = iter.bytes();
        (age_buckets(&mut iter, Instant::now()), count, bytes)
    };
    client.gauge(
        "cache.ages.under_1m",
        buckets.under_1m as f64,
        STATSD_TAGS,
        1.0,
    );
    client.gauge(
        "cache.ages.1m_to_5m",
        buckets.from_1m_to_5m as f64,
        STATSD_TAGS,
        1.0,
    );
    client.gauge(
        "cache.ages.5m_to_10m",
        buckets.from_5m_to_10m as f64,
        STATSD_TAGS,
        1.0,
    );
    client.gauge(
        "cache.ages.over_10m",
        buckets.over_10m as f64,
        STATSD_TAGS,
        1.0,
    );
    client.gauge("cache.count", count as f64, STATSD_TAGS, 1.0);
    client.gauge("cache.bytes", bytes as f64, STATSD_TAGS, 1.0);
}

/// Buckets entry ages walking from the oldest entry forward. Stops at the
/// first entry aged one minute or less: entries closer to the front cannot
/// be older, so the remainder all land in the under-a-minute bucket.
pub(crate) fn age_buckets(iter: &mut Cursor<'_>, now: Instant) -> AgeBuckets {
    let total = iter.len() as u64;
    let mut buckets = AgeBuckets::default();
    let mut older = 0;
    while let Some(entry) = iter.get_and_advance() {
        let age = now.saturating_duration_since(entry.lastmod());
        if age <= ONE_MINUTE {
            break;
        }
        older += 1;
        if age <= FIVE_MINUTES {
            buckets.from_1m_to_5m += 1;
        } else if age <= TEN_MINUTES {
            buckets.from_5m_to_10m += 1;
        } else {
            buckets.over_10m += 1;
        }
    }
    buckets.under_1m = total - older;
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSettings, EVICTION_CHANNEL_CAPACITY};
    use crate::test_utils::test_span;
    use tokio::sync::mpsc;

    /// Builds a cache whose entries have the given ages at the returned
    /// evaluation instant. Entries are inserted oldest first; trace IDs are
    /// assigned 1..=n in insertion order. Only additions of `Duration` to a
    /// base `Instant` are used, so ages never reach before process start.
    async fn cache_with_ages(
        ages: &[Duration],
    ) -> (
        Arc<Cache>,
        mpsc::Receiver<crate::cache::EvictedTrace>,
        Instant,
    ) {
        let (tx, rx) = mpsc::channel(EVICTION_CHANNEL_CAPACITY);
        let cache = Cache::new(CacheSettings {
            out: tx,
            max_size: 0,
            statsd: None,
        });
        let base = Instant::now();
        let horizon = ages.iter().max().copied().unwrap_or_default();
        let mut sorted: Vec<Duration> = ages.to_vec();
        sorted.sort();
        for (i, age) in sorted.iter().rev().enumerate() {
            let trace_id = i as u64 + 1;
            cache
                .add_with_time(vec![test_span(trace_id, 1, 9)], base + (horizon - *age))
                .await
                .unwrap();
        }
        (cache, rx, base + horizon)
    }

    #[tokio::test]
    async fn test_age_bucketing() {
        // entries aged 30s, 3m, 7m and 15m land in one bucket each.
        let ages = [
            Duration::from_secs(30),
            Duration::from_secs(3 * 60),
            Duration::from_secs(7 * 60),
            Duration::from_secs(15 * 60),
        ];
        let (cache, _rx, now) = cache_with_ages(&ages).await;

        let mut iter = cache.iter_rev();
        assert_eq!(iter.len(), 4);
        let buckets = age_buckets(&mut iter, now);
        assert_eq!(
            buckets,
            AgeBuckets {
                under_1m: 1,
                from_1m_to_5m: 1,
                from_5m_to_10m: 1,
                over_10m: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_age_bucketing_stops_early_at_fresh_entries() {
        // Every entry younger than a minute is bucketed without being
        // visited: the traversal ends at the first fresh entry.
        let ages = [
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(20),
            Duration::from_secs(2 * 60),
        ];
        let (cache, _rx, now) = cache_with_ages(&ages).await;

        let mut iter = cache.iter_rev();
        let buckets = age_buckets(&mut iter, now);
        assert_eq!(buckets.under_1m, 3);
        assert_eq!(buckets.from_1m_to_5m, 1);
        // the traversal consumed the 2m and 20s entries and stopped; the
        // two freshest entries were never visited
        assert_eq!(iter.get_and_advance().unwrap().key(), 3);
        assert_eq!(iter.get_and_advance().unwrap().key(), 4);
        assert!(iter.get_and_advance().is_none());
    }

    #[tokio::test]
    async fn test_age_bucketing_empty_cache() {
        let (tx, _rx) = mpsc::channel(1);
        let cache = Cache::new(CacheSettings {
            out: tx,
            max_size: 0,
            statsd: None,
        });
        let mut iter = cache.iter_rev();
        assert_eq!(age_buckets(&mut iter, Instant::now()), AgeBuckets::default());
    }
}
