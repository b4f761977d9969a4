// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by unit and integration tests.

use std::sync::Mutex;

use crate::span::{Span, TAG_ROOT_SPAN};
use crate::statsd::MetricsClient;

/// Builds a span with fixed metadata, so every test span has the same
/// encoded size and size-budget tests can reason in whole spans.
pub fn test_span(trace_id: u64, span_id: u64, parent_id: u64) -> Span {
    Span {
        service: "test-service".to_string(),
        name: "test-op".to_string(),
        resource: "/".to_string(),
        trace_id,
        span_id,
        parent_id,
        start: 1_700_000_000_000_000_000,
        duration: 1_000_000_000,
        ..Default::default()
    }
}

/// A [`test_span`] carrying the client-declared root metric. Note that the
/// metric changes the encoded size relative to `test_span`.
pub fn test_root_span(trace_id: u64, span_id: u64, parent_id: u64) -> Span {
    let mut span = test_span(trace_id, span_id, parent_id);
    span.metrics.insert(TAG_ROOT_SPAN.to_string(), 1.0);
    span
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Count,
    Histogram,
}

/// One metric emission recorded by [`RecordingMetricsClient`].
#[derive(Clone, Debug, PartialEq)]
pub struct MetricEvent {
    pub kind: MetricKind,
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
    pub rate: f64,
}

/// [`MetricsClient`] stub recording every emission for assertions.
#[derive(Default)]
pub struct RecordingMetricsClient {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingMetricsClient {
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, kind: MetricKind, name: &str, value: f64, tags: &[&str], rate: f64) {
        self.events.lock().unwrap().push(MetricEvent {
            kind,
            name: name.to_string(),
            value,
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            rate,
        });
    }
}

impl MetricsClient for RecordingMetricsClient {
    fn gauge(&self, name: &str, value: f64, tags: &[&str], rate: f64) {
        self.record(MetricKind::Gauge, name, value, tags, rate);
    }

    fn count(&self, name: &str, delta: i64, tags: &[&str], rate: f64) {
        self.record(MetricKind::Count, name, delta as f64, tags, rate);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[&str], rate: f64) {
        self.record(MetricKind::Histogram, name, value, tags, rate);
    }
}
