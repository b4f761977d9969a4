// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;

use datadog_trace_collect::DEFAULT_MAX_SIZE;

const DEFAULT_RECEIVER_PORT: u16 = 8126;
const DEFAULT_STATSD_PORT: u16 = 8125;

/// Maximum size accepted for one span payload request body.
const MAX_REQUEST_CONTENT_LENGTH: usize = 10 * 1024 * 1024; // 10MB

#[derive(Debug)]
pub struct Config {
    pub receiver_port: u16,
    /// Size budget for the span cache, in encoded bytes.
    pub max_cache_size: usize,
    pub max_request_content_length: usize,
    /// `host:port` of the dogstatsd endpoint to report cache metrics to.
    /// `None` disables the cache monitor.
    pub statsd_addr: Option<String>,
}

impl Config {
    /// Reads the configuration from the environment. Unset or unparsable
    /// variables fall back to their defaults.
    pub fn from_env() -> Config {
        let receiver_port = env::var("DD_APM_RECEIVER_PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(DEFAULT_RECEIVER_PORT);

        let max_cache_size = env::var("DD_MAX_CACHE_SIZE")
            .ok()
            .and_then(|size| size.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_SIZE);

        // statsd reporting is opt-in: only a configured host enables it
        let statsd_addr = env::var("DD_STATSD_HOST").ok().map(|host| {
            let port = env::var("DD_STATSD_PORT")
                .ok()
                .and_then(|port| port.parse::<u16>().ok())
                .unwrap_or(DEFAULT_STATSD_PORT);
            format!("{host}:{port}")
        });

        Config {
            receiver_port,
            max_cache_size,
            max_request_content_length: MAX_REQUEST_CONTENT_LENGTH,
            statsd_addr,
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use std::env;

    use super::*;

    #[test]
    #[serial]
    fn test_defaults() {
        env::remove_var("DD_APM_RECEIVER_PORT");
        env::remove_var("DD_MAX_CACHE_SIZE");
        env::remove_var("DD_STATSD_HOST");
        env::remove_var("DD_STATSD_PORT");

        let config = Config::from_env();
        assert_eq!(config.receiver_port, 8126);
        assert_eq!(config.max_cache_size, DEFAULT_MAX_SIZE);
        assert_eq!(config.max_request_content_length, 10 * 1024 * 1024);
        assert_eq!(config.statsd_addr, None);
    }

    #[test]
    #[serial]
    fn test_custom_receiver_port() {
        env::set_var("DD_APM_RECEIVER_PORT", "9126");
        let config = Config::from_env();
        assert_eq!(config.receiver_port, 9126);
        env::remove_var("DD_APM_RECEIVER_PORT");
    }

    #[test]
    #[serial]
    fn test_invalid_receiver_port_falls_back() {
        env::set_var("DD_APM_RECEIVER_PORT", "not_a_port");
        let config = Config::from_env();
        assert_eq!(config.receiver_port, 8126);
        env::remove_var("DD_APM_RECEIVER_PORT");
    }

    #[test]
    #[serial]
    fn test_custom_cache_size() {
        env::set_var("DD_MAX_CACHE_SIZE", "1048576");
        let config = Config::from_env();
        assert_eq!(config.max_cache_size, 1024 * 1024);
        env::remove_var("DD_MAX_CACHE_SIZE");
    }

    #[test]
    #[serial]
    fn test_statsd_addr_with_default_port() {
        env::set_var("DD_STATSD_HOST", "127.0.0.1");
        env::remove_var("DD_STATSD_PORT");
        let config = Config::from_env();
        assert_eq!(config.statsd_addr.as_deref(), Some("127.0.0.1:8125"));
        env::remove_var("DD_STATSD_HOST");
    }

    #[test]
    #[serial]
    fn test_statsd_addr_with_custom_port() {
        env::set_var("DD_STATSD_HOST", "statsd.local");
        env::set_var("DD_STATSD_PORT", "18125");
        let config = Config::from_env();
        assert_eq!(config.statsd_addr.as_deref(), Some("statsd.local:18125"));
        env::remove_var("DD_STATSD_HOST");
        env::remove_var("DD_STATSD_PORT");
    }

    #[test]
    #[serial]
    fn test_statsd_port_alone_does_not_enable_statsd() {
        env::remove_var("DD_STATSD_HOST");
        env::set_var("DD_STATSD_PORT", "18125");
        let config = Config::from_env();
        assert_eq!(config.statsd_addr, None);
        env::remove_var("DD_STATSD_PORT");
    }
}
