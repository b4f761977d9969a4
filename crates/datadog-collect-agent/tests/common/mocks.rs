// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock implementations of collect agent components for testing

use bytes::Bytes;
use http_body_util::Full;
use hyper::{body::Incoming, http, Request};
use std::sync::Arc;

use datadog_collect_agent::config::Config;
use datadog_collect_agent::http_utils::HttpResponse;
use datadog_collect_agent::span_processor::SpanProcessor;
use datadog_trace_collect::Cache;

/// Mock span processor that returns 200 OK without touching the cache
#[allow(dead_code)]
pub struct MockSpanProcessor;

#[async_trait::async_trait]
impl SpanProcessor for MockSpanProcessor {
    async fn process_spans(
        &self,
        _config: Arc<Config>,
        _req: Request<Incoming>,
        _cache: Arc<Cache>,
    ) -> http::Result<HttpResponse> {
        hyper::Response::builder()
            .status(200)
            .body(Full::new(Bytes::from("{}")))
    }
}
