// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use datadog_trace_collect::Cache;

use crate::config::Config;
use crate::http_utils::{log_and_create_http_response, Body, HttpResponse};
use crate::span_processor::SpanProcessor;

const SPANS_ENDPOINT_PATH: &str = "/v1/spans";
const INFO_ENDPOINT_PATH: &str = "/info";

/// HTTP receiver in front of the span cache.
pub struct CollectAgent {
    pub config: Arc<Config>,
    pub span_processor: Arc<dyn SpanProcessor + Send + Sync>,
    pub cache: Arc<Cache>,
    /// Stops the accept loop when cancelled. Shared with the span processor
    /// so a closed cache sink takes the server down.
    pub shutdown: CancellationToken,
}

impl CollectAgent {
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error>> {
        let span_processor = self.span_processor.clone();
        let cache = self.cache.clone();
        let endpoint_config = self.config.clone();

        let service = service_fn(move |req| {
            // called for each http request
            let span_processor = span_processor.clone();
            let cache = cache.clone();
            let endpoint_config = endpoint_config.clone();
            CollectAgent::endpoint_handler(endpoint_config, req, span_processor, cache)
        });

        let addr = SocketAddr::from(([127, 0, 0, 1], self.config.receiver_port));
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        debug!(
            "Collect agent started: listening on port {}",
            self.config.receiver_port
        );
        self.serve_tcp(listener, service).await
    }

    async fn serve_tcp<S>(
        &self,
        listener: tokio::net::TcpListener,
        service: S,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        S: hyper::service::Service<Request<hyper::body::Incoming>, Response = Response<Body>>
            + Clone
            + Send
            + 'static,
        S::Future: Send,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        // Don't kill server on panic - log and continue
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
                _ = self.shutdown.cancelled() => {
                    debug!("Collect agent shutting down");
                    return Ok(());
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Connection error: {e}");
                }
            });
        }
    }

    async fn endpoint_handler(
        config: Arc<Config>,
        req: Request<hyper::body::Incoming>,
        span_processor: Arc<dyn SpanProcessor + Send + Sync>,
        cache: Arc<Cache>,
    ) -> http::Result<HttpResponse> {
        match (req.method(), req.uri().path()) {
            (&Method::PUT | &Method::POST, SPANS_ENDPOINT_PATH) => {
                match span_processor.process_spans(config, req, cache).await {
                    Ok(res) => Ok(res),
                    Err(err) => log_and_create_http_response(
                        &format!("Error processing spans: {err}"),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    ),
                }
            }
            (_, INFO_ENDPOINT_PATH) => match Self::info_handler(&config) {
                Ok(res) => Ok(res),
                Err(err) => log_and_create_http_response(
                    &format!("Info endpoint error: {err}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ),
            },
            _ => {
                let mut not_found = Response::default();
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                Ok(not_found)
            }
        }
    }

    fn info_handler(config: &Config) -> http::Result<HttpResponse> {
        let response_json = json!(
            {
                "endpoints": [
                    SPANS_ENDPOINT_PATH,
                    INFO_ENDPOINT_PATH
                ],
                "config": {
                    "receiver_port": config.receiver_port,
                    "max_cache_size": config.max_cache_size,
                    "max_request_content_length": config.max_request_content_length,
                }
            }
        );
        Response::builder()
            .status(200)
            .body(Body::from(bytes::Bytes::from(response_json.to_string())))
    }
}
