// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::time::Duration;
use tokio::time::timeout;

use datadog_trace_collect::test_utils::test_span;

/// Create a msgpack payload holding one complete trace, root span last
pub fn create_test_span_payload() -> Vec<u8> {
    let spans = vec![test_span(11, 222, 11), test_span(11, 11, 0)];
    rmp_serde::to_vec_named(&spans).expect("Failed to serialize test spans")
}

/// Send an HTTP request over TCP and return the response
pub async fn send_tcp_request(
    port: u16,
    uri: &str,
    method: &str,
    body: Option<Vec<u8>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Content-Type", "application/msgpack");

    let response = if let Some(body_data) = body {
        let body_len = body_data.len();
        request_builder = request_builder.header("Content-Length", body_len.to_string());
        let request = request_builder.body(Full::new(Bytes::from(body_data)))?;
        timeout(Duration::from_secs(2), sender.send_request(request)).await??
    } else {
        let request = request_builder.body(Full::new(Bytes::new()))?;
        timeout(Duration::from_secs(2), sender.send_request(request)).await??
    };

    Ok(response)
}
