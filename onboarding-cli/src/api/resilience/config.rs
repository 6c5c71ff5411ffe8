//! Resilience configuration with builder pattern
//!
//! Provides a unified configuration for per-call-kind retry policies and
//! request monitoring with sane defaults.

use super::retry::RetryConfig;
use crate::api::operations::CallKind;
use std::collections::HashMap;

/// Global resilience configuration for backend calls
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Policy used for call kinds without an override
    pub retry: RetryConfig,
    /// Per call kind overrides
    pub overrides: HashMap<CallKind, RetryConfig>,
    pub monitoring: MonitoringConfig,
}

/// Monitoring and logging configuration
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Send an `X-Correlation-Id` header with every request
    pub correlation_ids: bool,
    /// Log every request and its status at debug level
    pub request_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            correlation_ids: true,
            request_logging: true,
        }
    }
}

impl Default for ResilienceConfig {
    /// Retries idempotent calls; creates, bulk inserts and uploads run exactly once
    /// so a timeout after the backend committed the write can never duplicate records.
    fn default() -> Self {
        let overrides = CallKind::all()
            .iter()
            .filter(|kind| !kind.is_idempotent())
            .map(|kind| (*kind, RetryConfig::single_attempt()))
            .collect();

        Self {
            retry: RetryConfig::default(),
            overrides,
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl ResilienceConfig {
    /// Create a new builder for ResilienceConfig
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Retry policy for the given call kind
    pub fn retry_for(&self, kind: CallKind) -> &RetryConfig {
        self.overrides.get(&kind).unwrap_or(&self.retry)
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    /// Configure the default retry behavior
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Override the retry behavior of one call kind
    pub fn retry_for(mut self, kind: CallKind, retry: RetryConfig) -> Self {
        self.config.overrides.insert(kind, retry);
        self
    }

    /// Enable/disable correlation IDs
    pub fn correlation_ids(mut self, enabled: bool) -> Self {
        self.config.monitoring.correlation_ids = enabled;
        self
    }

    /// Enable/disable request logging
    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.config.monitoring.request_logging = enabled;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

#[cfg(test)]
impl ResilienceConfig {
    /// Every call is attempted exactly once
    pub fn disabled() -> Self {
        Self {
            retry: RetryConfig {
                max_attempts: 1,
                base_delay: std::time::Duration::from_millis(0),
                max_delay: std::time::Duration::from_millis(0),
                backoff_multiplier: 1.0,
                jitter: false,
            },
            overrides: HashMap::new(),
            monitoring: MonitoringConfig {
                correlation_ids: false,
                request_logging: false,
            },
        }
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
