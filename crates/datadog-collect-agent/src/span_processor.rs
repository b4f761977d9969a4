// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::{body::Incoming, http, Request, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use datadog_trace_collect::{Cache, CacheError, Span};

use crate::config::Config;
use crate::http_utils::{
    log_and_create_http_response, verify_request_content_length, HttpResponse,
};

#[async_trait]
pub trait SpanProcessor {
    /// Deserializes spans from a request body and adds them to the given
    /// cache.
    async fn process_spans(
        &self,
        config: Arc<Config>,
        req: Request<Incoming>,
        cache: Arc<Cache>,
    ) -> http::Result<HttpResponse>;
}

/// Decodes a msgpack-encoded list of spans.
pub(crate) fn decode_spans(body: &[u8]) -> Result<Vec<Span>, rmp_serde::decode::Error> {
    rmp_serde::from_slice(body)
}

#[derive(Clone)]
pub struct CollectorSpanProcessor {
    /// Cancelled when the cache refuses further spans, so the server stops
    /// accepting connections.
    shutdown: CancellationToken,
}

impl CollectorSpanProcessor {
    pub fn new(shutdown: CancellationToken) -> Self {
        CollectorSpanProcessor { shutdown }
    }
}

#[async_trait]
impl SpanProcessor for CollectorSpanProcessor {
    async fn process_spans(
        &self,
        config: Arc<Config>,
        req: Request<Incoming>,
        cache: Arc<Cache>,
    ) -> http::Result<HttpResponse> {
        debug!("Received spans to process");
        let (parts, body) = req.into_parts();

        if let Some(response) = verify_request_content_length(
            &parts.headers,
            config.max_request_content_length,
            "Error processing spans",
        ) {
            return response;
        }

        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading span request body: {e}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        // double check the body size in case transfer encoding was used
        if body_bytes.len() > config.max_request_content_length {
            return log_and_create_http_response(
                "Error processing spans: Payload too large",
                StatusCode::PAYLOAD_TOO_LARGE,
            );
        }

        let spans = match decode_spans(&body_bytes) {
            Ok(spans) => spans,
            Err(err) => {
                return log_and_create_http_response(
                    &format!("Error deserializing spans from request body: {err}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                );
            }
        };

        debug!("Adding {} spans to the cache", spans.len());
        match cache.add(spans).await {
            Ok(()) => log_and_create_http_response(
                "Successfully buffered spans to be collected.",
                StatusCode::OK,
            ),
            Err(err @ CacheError::SinkClosed) => {
                // the pipeline is gone; shut the receiver down with us
                error!("Span cache rejected spans: {err}");
                self.shutdown.cancel();
                log_and_create_http_response(
                    &format!("Error adding spans to the cache: {err}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        }
    }
}
