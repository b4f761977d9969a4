// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::EvictedTrace;
use crate::span::Trace;
use crate::statsd::MetricsClient;

/// Consumer side of the eviction channel.
///
/// Receives evicted traces in the order the cache produced them, counts each
/// eviction in statsd and forwards the trace to the downstream pipeline.
pub struct EvictionConsumer {
    rx: mpsc::Receiver<EvictedTrace>,
    downstream: mpsc::UnboundedSender<Trace>,
    statsd: Option<Arc<dyn MetricsClient>>,
}

impl EvictionConsumer {
    pub fn new(
        rx: mpsc::Receiver<EvictedTrace>,
        downstream: mpsc::UnboundedSender<Trace>,
        statsd: Option<Arc<dyn MetricsClient>>,
    ) -> Self {
        EvictionConsumer {
            rx,
            downstream,
            statsd,
        }
    }

    /// Dispatches evicted traces until the cache closes the channel.
    pub async fn run(mut self) {
        while let Some(evicted) = self.rx.recv().await {
            self.dispatch(evicted);
        }
        debug!("Eviction channel closed, consumer stopping");
    }

    fn dispatch(&self, evicted: EvictedTrace) {
        if let Some(client) = &self.statsd {
            // Tag with the service and operation of the most recently
            // inserted span. Traces are never evicted empty.
            if let Some(last) = evicted.trace.last() {
                let service = format!("service:{}", last.service);
                let name = format!("name:{}", last.name);
                client.count(
                    "cache.evicted",
                    1,
                    &["version:v1", evicted.reason.as_tag(), &service, &name],
                    1.0,
                );
            }
        }
        if self.downstream.send(evicted.trace).is_err() {
            debug!("Downstream trace sink closed, dropping trace");
        }
    }
}
