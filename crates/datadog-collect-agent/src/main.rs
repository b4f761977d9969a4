// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use datadog_collect_agent::{
    config::Config, receiver::CollectAgent, span_processor::CollectorSpanProcessor,
};
use datadog_trace_collect::{
    Cache, CacheSettings, EvictionConsumer, MetricsClient, UdpStatsdClient,
    EVICTION_CHANNEL_CAPACITY,
};

const STATSD_NAMESPACE: &str = "trace_agent";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("DD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = Arc::new(Config::from_env());

    let statsd: Option<Arc<dyn MetricsClient>> = match &config.statsd_addr {
        Some(addr) => match UdpStatsdClient::new(addr, STATSD_NAMESPACE) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                error!("Error creating statsd client for {addr}: {e}");
                None
            }
        },
        None => {
            info!("No statsd endpoint configured, cache monitoring disabled");
            None
        }
    };

    let (evict_tx, evict_rx) = mpsc::channel(EVICTION_CHANNEL_CAPACITY);
    let (trace_tx, mut trace_rx) = mpsc::unbounded_channel();

    let cache = Cache::new(CacheSettings {
        out: evict_tx,
        max_size: config.max_cache_size,
        statsd: statsd.clone(),
    });

    let consumer = EvictionConsumer::new(evict_rx, trace_tx, statsd);
    tokio::spawn(consumer.run());

    // The next pipeline stage is not wired up here; drain completed traces
    // so the consumer never stalls.
    tokio::spawn(async move {
        while let Some(trace) = trace_rx.recv().await {
            debug!("Received complete trace with {} spans", trace.len());
        }
    });

    let shutdown = CancellationToken::new();
    let collect_agent = CollectAgent {
        config: Arc::clone(&config),
        span_processor: Arc::new(CollectorSpanProcessor::new(shutdown.clone())),
        cache: Arc::clone(&cache),
        shutdown,
    };

    if let Err(e) = collect_agent.start().await {
        error!("Error running collect agent: {e:?}");
    }
    cache.close().await;
}
