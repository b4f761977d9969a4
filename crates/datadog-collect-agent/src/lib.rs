// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP collector in front of the span cache: decodes msgpack span
//! payloads pushed by tracing clients and feeds them to
//! [`datadog_trace_collect::Cache`].

pub mod config;
pub mod http_utils;
pub mod receiver;
pub mod span_processor;
