// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Narrow statsd client surface consumed by the cache.

use std::fmt::Write as _;
use std::io;
use std::net::UdpSocket;

use tracing::debug;

/// The statsd capabilities the cache and its consumer emit through.
///
/// Implementations must be shareable across tasks; the monitor and the
/// eviction consumer hold the same client.
pub trait MetricsClient: Send + Sync {
    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64);
    fn count(&self, name: &str, delta: i64, tags: &[&str], rate: f64);
    fn histogram(&self, name: &str, value: f64, tags: &[&str], rate: f64);
}

/// Best-effort dogstatsd client over a connected UDP socket.
///
/// Datagrams use the dogstatsd line format, e.g.
/// `trace_agent.cache.count:4|g|#version:v1`. Send failures are logged at
/// debug and otherwise ignored; metrics are not worth stalling the span
/// pipeline over.
pub struct UdpStatsdClient {
    socket: UdpSocket,
    namespace: String,
}

impl UdpStatsdClient {
    /// Binds an ephemeral local socket connected to `addr`. `namespace`,
    /// when non-empty, prefixes every metric name.
    pub fn new(addr: &str, namespace: &str) -> io::Result<UdpStatsdClient> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        socket.set_nonblocking(true)?;
        Ok(UdpStatsdClient {
            socket,
            namespace: namespace.to_string(),
        })
    }

    fn send(&self, name: &str, value: &str, kind: &str, tags: &[&str], rate: f64) {
        let mut line = String::with_capacity(64);
        if !self.namespace.is_empty() {
            line.push_str(&self.namespace);
            line.push('.');
        }
        line.push_str(name);
        line.push(':');
        line.push_str(value);
        line.push('|');
        line.push_str(kind);
        if rate < 1.0 {
            let _ = write!(line, "|@{rate}");
        }
        if !tags.is_empty() {
            line.push_str("|#");
            line.push_str(&tags.join(","));
        }
        if let Err(err) = self.socket.send(line.as_bytes()) {
            debug!("Failed to send statsd datagram: {err}");
        }
    }
}

impl MetricsClient for UdpStatsdClient {
    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) {
        self.send(name, &value.to_string(), "g", tags, rate);
    }

    fn count(&self, name: &str, delta: i64, tags: &[&str], rate: f64) {
        self.send(name, &delta.to_string(), "c", tags, rate);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[&str], rate: f64) {
        self.send(name, &value.to_string(), "h", tags, rate);
    }
}
