// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metric key set by tracing clients to explicitly flag a span as the root
/// of its trace, even when it carries a non-zero parent ID.
pub const TAG_ROOT_SPAN: &str = "_root_span";

// Worst-case msgpack element widths used by [`Span::encoded_size`].
const MAP_HEADER_SIZE: usize = 5;
const STR_HEADER_SIZE: usize = 5;
const UINT64_SIZE: usize = 9;
const INT64_SIZE: usize = 9;
const FLOAT64_SIZE: usize = 9;
const INT32_SIZE: usize = 5;

fn is_default<T: Default + PartialEq>(t: &T) -> bool {
    t == &T::default()
}

/// A single timed operation reported by a tracing client.
///
/// Field names match the msgpack wire format produced by the tracers, so the
/// struct deserializes directly from request payloads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    pub trace_id: u64,
    pub span_id: u64,
    /// Identifier of the parent span. Zero means the span has no parent.
    #[serde(default, skip_serializing_if = "is_default")]
    pub parent_id: u64,
    /// Start of the span, in nanoseconds since epoch.
    #[serde(default)]
    pub start: i64,
    /// Duration of the span, in nanoseconds.
    #[serde(default)]
    pub duration: i64,
    #[serde(default, skip_serializing_if = "is_default")]
    pub error: i32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
    /// Numeric tags. A payload without a metrics map deserializes to an
    /// empty one.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metrics: HashMap<String, f64>,
}

/// An ordered list of spans sharing a trace ID.
pub type Trace = Vec<Span>;

impl Span {
    /// Approximate msgpack-encoded size of the span, in bytes.
    ///
    /// Uses worst-case element widths (5-byte map and str headers, 9-byte
    /// u64/i64/f64, 5-byte i32) plus the raw string bytes, so the result is
    /// deterministic for a given span and stable across calls. This is the
    /// number the cache budget is accounted in; it is not a measure of heap
    /// usage.
    pub fn encoded_size(&self) -> usize {
        let mut size = MAP_HEADER_SIZE;
        size += STR_HEADER_SIZE + "service".len() + STR_HEADER_SIZE + self.service.len();
        size += STR_HEADER_SIZE + "name".len() + STR_HEADER_SIZE + self.name.len();
        size += STR_HEADER_SIZE + "resource".len() + STR_HEADER_SIZE + self.resource.len();
        size += STR_HEADER_SIZE + "type".len() + STR_HEADER_SIZE + self.r#type.len();
        size += STR_HEADER_SIZE + "trace_id".len() + UINT64_SIZE;
        size += STR_HEADER_SIZE + "span_id".len() + UINT64_SIZE;
        size += STR_HEADER_SIZE + "parent_id".len() + UINT64_SIZE;
        size += STR_HEADER_SIZE + "start".len() + INT64_SIZE;
        size += STR_HEADER_SIZE + "duration".len() + INT64_SIZE;
        size += STR_HEADER_SIZE + "error".len() + INT32_SIZE;
        size += STR_HEADER_SIZE + "meta".len() + MAP_HEADER_SIZE;
        for (key, value) in &self.meta {
            size += STR_HEADER_SIZE + key.len() + STR_HEADER_SIZE + value.len();
        }
        size += STR_HEADER_SIZE + "metrics".len() + MAP_HEADER_SIZE;
        for key in self.metrics.keys() {
            size += STR_HEADER_SIZE + key.len() + FLOAT64_SIZE;
        }
        size
    }

    /// Returns true if the span is considered to be the last in its trace:
    /// either it has no parent, or the client flagged it with the
    /// [`TAG_ROOT_SPAN`] metric.
    pub fn is_root(&self) -> bool {
        self.parent_id == 0 || self.metrics.get(TAG_ROOT_SPAN) == Some(&1.0)
    }
}
