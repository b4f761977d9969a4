// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors surfaced at the cache boundary.
///
/// Invariant violations (size accounting out of sync, list and index
/// desynchronised) are not represented here: they indicate a bug and panic
/// instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The eviction sink was closed by [`Cache::close`](crate::Cache::close);
    /// the caller must stop pushing spans.
    #[error("span cache eviction sink is closed")]
    SinkClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CacheError::SinkClosed.to_string(),
            "span cache eviction sink is closed"
        );
    }
}
