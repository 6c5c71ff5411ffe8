//! Production resilience features
//!
//! Provides bounded retry with backoff, configurable per call kind, and
//! request monitoring settings for the onboarding backend client.

pub mod config;
pub mod retry;

pub use config::ResilienceConfig;
pub use retry::{RetryConfig, RetryPolicy, RetryableError};
