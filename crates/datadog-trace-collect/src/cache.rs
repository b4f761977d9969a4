// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CacheError;
use crate::monitor;
use crate::recency::{EntryHandle, RecencyList, TraceEntry};
use crate::span::{Span, Trace};
use crate::statsd::MetricsClient;

/// Default maximum size allowed for the cache.
///
/// Span sizes are computed with [`Span::encoded_size`], an approximation of
/// the msgpack wire size rather than of resident memory. The space actually
/// used by the cache should be considered at worst double this value.
pub const DEFAULT_MAX_SIZE: usize = 200 * 1024 * 1024; // 200MB

/// Capacity of the bounded eviction channel. Sized to absorb short bursts;
/// once full, [`Cache::add`] waits for the consumer instead of dropping
/// completed traces.
pub const EVICTION_CHANNEL_CAPACITY: usize = 1000;

/// Why a trace left the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionReason {
    /// The root span of the trace was received.
    Root,
    /// The trace was evicted to free up memory space.
    Space,
}

impl EvictionReason {
    /// The statsd tag attached to `cache.evicted` counts.
    pub fn as_tag(&self) -> &'static str {
        match self {
            EvictionReason::Root => "reason:root",
            EvictionReason::Space => "reason:space",
        }
    }
}

/// A trace handed to the eviction sink.
#[derive(Debug)]
pub struct EvictedTrace {
    /// Why the trace was evicted.
    pub reason: EvictionReason,
    /// The root selected for this trace. Set iff the reason is
    /// [`EvictionReason::Root`].
    pub root: Option<Span>,
    /// The spans of the trace, in insertion order.
    pub trace: Trace,
    /// When the last span was added to this trace.
    pub lastmod: Instant,
}

/// Settings for [`Cache::new`].
pub struct CacheSettings {
    /// Receiving end of the eviction pipeline. Must be bounded; a full
    /// channel back-pressures `add`.
    pub out: mpsc::Sender<EvictedTrace>,
    /// Size budget in encoded bytes. Zero means [`DEFAULT_MAX_SIZE`].
    pub max_size: usize,
    /// Statsd client for the periodic monitor. `None` disables it.
    pub statsd: Option<Arc<dyn MetricsClient>>,
}

struct Inner {
    ll: RecencyList,
    index: HashMap<u64, EntryHandle>,
    size: usize,
}

/// Caches spans until they are considered complete based on the root rule,
/// or until they are evicted due to the memory budget.
///
/// A single readers-writer lock guards the recency list, the index and the
/// size counter; each [`Cache::add`] call is one write critical section, and
/// readers (iteration, [`Cache::len`], the monitor) share the lock freely.
/// Evicted traces are delivered to the bounded channel only after the lock
/// is released, so back-pressure never holds up readers.
pub struct Cache {
    max_size: usize,
    inner: RwLock<Inner>,
    out: Mutex<Option<mpsc::Sender<EvictedTrace>>>,
    cancel: CancellationToken,
}

impl Cache {
    /// Creates a new cache which delivers evicted traces to `settings.out`
    /// whenever a trace completes or the size budget is reached. When a
    /// statsd client is configured, a monitor task reporting cache gauges is
    /// spawned alongside.
    pub fn new(settings: CacheSettings) -> Arc<Cache> {
        let max_size = if settings.max_size == 0 {
            DEFAULT_MAX_SIZE
        } else {
            settings.max_size
        };
        let cache = Arc::new(Cache {
            max_size,
            inner: RwLock::new(Inner {
                ll: RecencyList::new(),
                index: HashMap::new(),
                size: 0,
            }),
            out: Mutex::new(Some(settings.out)),
            cancel: CancellationToken::new(),
        });
        if let Some(client) = settings.statsd {
            let token = cache.cancel.clone();
            tokio::spawn(monitor::run(Arc::clone(&cache), client, token));
        }
        cache
    }

    /// Adds a list of spans to the cache, evicting traces completed by the
    /// batch and then any traces that no longer fit the size budget.
    ///
    /// Root evictions are emitted after the whole batch is inserted, so
    /// sibling spans arriving together with their root are part of the
    /// evicted trace. Returns [`CacheError::SinkClosed`] once
    /// [`Cache::close`] has been called.
    pub async fn add(&self, spans: Vec<Span>) -> Result<(), CacheError> {
        self.add_with_time(spans, Instant::now()).await
    }

    pub(crate) async fn add_with_time(
        &self,
        spans: Vec<Span>,
        now: Instant,
    ) -> Result<(), CacheError> {
        let out = {
            let guard = self.out.lock().expect("cache sender lock poisoned");
            match guard.as_ref() {
                Some(tx) => tx.clone(),
                None => return Err(CacheError::SinkClosed),
            }
        };
        for evicted in self.insert(spans, now) {
            out.send(evicted).await.map_err(|_| CacheError::SinkClosed)?;
        }
        Ok(())
    }

    /// Runs the insertion algorithm under the write lock and returns the
    /// evictions it produced: root evictions in batch order first, then
    /// space evictions oldest first.
    fn insert(&self, spans: Vec<Span>, now: Instant) -> Vec<EvictedTrace> {
        if spans.is_empty() {
            return Vec::new();
        }
        let mut inner = self.inner.write().expect("cache lock poisoned");
        let mut roots: Vec<Span> = Vec::new();
        for span in spans {
            if span.is_root() {
                roots.push(span.clone());
            }
            inner.add_span(span, now);
        }
        let mut evicted = Vec::new();
        for root in roots {
            if let Some(trace) = inner.evict_reason_root(root) {
                evicted.push(trace);
            }
        }
        while inner.size > self.max_size {
            evicted.push(inner.evict_reason_space());
        }
        evicted
    }

    /// Number of traces currently held.
    pub fn len(&self) -> usize {
        self.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total encoded size of the cached spans, in bytes.
    pub fn bytes(&self) -> usize {
        self.read().size
    }

    /// Stops the monitor, drains every remaining trace as a space eviction
    /// (oldest first) and closes the sink. In-flight `add` calls complete;
    /// later ones fail with [`CacheError::SinkClosed`].
    pub async fn close(&self) {
        self.cancel.cancel();
        let out = {
            let mut guard = self.out.lock().expect("cache sender lock poisoned");
            match guard.take() {
                Some(tx) => tx,
                None => return,
            }
        };
        let drained = {
            let mut inner = self.inner.write().expect("cache lock poisoned");
            let mut drained = Vec::with_capacity(inner.index.len());
            while !inner.index.is_empty() {
                drained.push(inner.evict_reason_space());
            }
            drained
        };
        for evicted in drained {
            if out.send(evicted).await.is_err() {
                debug!("Eviction consumer gone during close, discarding remaining traces");
                return;
            }
        }
    }

    /// Cursor walking the traces from most to least recently touched.
    pub fn iter(&self) -> Cursor<'_> {
        let inner = self.read();
        let current = inner.ll.front();
        Cursor {
            inner,
            current,
            direction: Direction::Forward,
        }
    }

    /// Cursor walking the traces from least to most recently touched.
    pub fn iter_rev(&self) -> Cursor<'_> {
        let inner = self.read();
        let current = inner.ll.back();
        Cursor {
            inner,
            current,
            direction: Direction::Reverse,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("cache lock poisoned")
    }

    /// Checks every structural invariant of the cache. Test-only; a failure
    /// here is a bug in the insertion or eviction paths.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let inner = self.read();
        assert_eq!(inner.ll.len(), inner.index.len(), "list and index diverge");
        assert!(inner.size <= self.max_size, "cache left over budget");
        let mut total = 0;
        let mut newer: Option<Instant> = None;
        let mut cursor = inner.ll.front();
        while let Some(handle) = cursor {
            let entry = inner.ll.get(handle);
            assert_eq!(
                inner.index.get(&entry.key()),
                Some(&handle),
                "index entry missing or stale for trace {}",
                entry.key()
            );
            assert_eq!(
                entry.size(),
                entry.spans().iter().map(Span::encoded_size).sum::<usize>(),
                "entry size out of sync for trace {}",
                entry.key()
            );
            if let Some(newer) = newer {
                assert!(
                    newer >= entry.lastmod(),
                    "recency order does not match lastmod order"
                );
            }
            newer = Some(entry.lastmod());
            total += entry.size();
            cursor = inner.ll.next(handle);
        }
        assert_eq!(inner.size, total, "size counter out of sync");
    }
}

impl Inner {
    fn add_span(&mut self, span: Span, now: Instant) {
        let key = span.trace_id;
        let handle = match self.index.get(&key) {
            Some(&handle) => {
                // trace already started
                self.ll.move_to_front(handle);
                handle
            }
            None => {
                // this is a new trace
                let handle = self.ll.push_front(TraceEntry::new(key, now));
                self.index.insert(key, handle);
                handle
            }
        };
        let size = span.encoded_size();
        let entry = self.ll.get_mut(handle);
        entry.spans.push(span);
        entry.lastmod = now;
        entry.size += size;
        self.size += size;
    }

    /// Evicts the trace the root belongs to, if it is still present. A root
    /// whose entry was just space-evicted is dropped silently.
    fn evict_reason_root(&mut self, root: Span) -> Option<EvictedTrace> {
        let handle = self.index.get(&root.trace_id).copied()?;
        let entry = self.remove(handle);
        Some(EvictedTrace {
            reason: EvictionReason::Root,
            root: Some(root),
            trace: entry.spans,
            lastmod: entry.lastmod,
        })
    }

    /// Evicts the least recently added-to trace.
    fn evict_reason_space(&mut self) -> EvictedTrace {
        let Some(back) = self.ll.back() else {
            panic!(
                "span cache holds {} bytes but has no entries left to evict; \
                 size accounting is out of sync",
                self.size
            );
        };
        let entry = self.remove(back);
        EvictedTrace {
            reason: EvictionReason::Space,
            root: None,
            trace: entry.spans,
            lastmod: entry.lastmod,
        }
    }

    fn remove(&mut self, handle: EntryHandle) -> TraceEntry {
        let entry = self.ll.remove(handle);
        self.size -= entry.size;
        self.index.remove(&entry.key);
        entry
    }
}

enum Direction {
    Forward,
    Reverse,
}

/// Read cursor over the trace entries. Holds the cache's read lock for its
/// whole lifetime, so writers wait until it is dropped and the recency
/// invariant holds across the traversal.
pub struct Cursor<'a> {
    inner: RwLockReadGuard<'a, Inner>,
    current: Option<EntryHandle>,
    direction: Direction,
}

impl Cursor<'_> {
    /// Total number of entries in the list, independent of cursor position.
    pub fn len(&self) -> usize {
        self.inner.ll.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total encoded size of the cached spans, in bytes.
    pub fn bytes(&self) -> usize {
        self.inner.size
    }

    /// Returns the current entry and advances the cursor, or `None` at the
    /// end of the list.
    pub fn get_and_advance(&mut self) -> Option<&TraceEntry> {
        let handle = self.current?;
        self.current = match self.direction {
            Direction::Forward => self.inner.ll.next(handle),
            Direction::Reverse => self.inner.ll.prev(handle),
        };
        Some(self.inner.ll.get(handle))
    }
}
