//! Configuration loading
//!
//! Reads `<config_dir>/onboarding-cli/config.toml` (or an explicit `--config`
//! path), then applies `ONBOARDING_BASE_URL` / `ONBOARDING_ACTOR` overrides.

pub mod models;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::operations::CallKind;
use crate::api::resilience::ResilienceConfig;
use crate::onboarding::settings::{Collections, OnboardingSettings};
pub use models::{
    AuditConfig, BackendConfig, MonitoringSettings, NormalizerConfig, RetryOverride, RetrySettings,
};

pub const ENV_BASE_URL: &str = "ONBOARDING_BASE_URL";
pub const ENV_ACTOR: &str = "ONBOARDING_ACTOR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub collections: Collections,
    pub audit: AuditConfig,
    pub normalizer: NormalizerConfig,
    pub retry: RetrySettings,
    pub monitoring: MonitoringSettings,
}

impl Config {
    /// `~/.config/onboarding-cli/config.toml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("onboarding-cli").join("config.toml"))
    }

    /// Load from `path`, or from the default location when it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(default) => Self::from_file(&default)?,
                None => {
                    log::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        log::debug!("Loading config from {}", path.display());
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Apply environment overrides looked up through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            log::debug!("Backend URL overridden by {}", ENV_BASE_URL);
            self.backend.base_url = url;
        }
        if let Some(actor) = lookup(ENV_ACTOR).filter(|v| !v.trim().is_empty()) {
            self.audit.actor = actor;
        }
    }

    pub fn onboarding_settings(&self) -> OnboardingSettings {
        OnboardingSettings {
            collections: self.collections.clone(),
            actor: self.audit.actor.clone(),
            array_policy: self.normalizer.array_policy,
        }
    }

    pub fn resilience(&self) -> ResilienceConfig {
        let base = self.retry.base();
        let mut builder = ResilienceConfig::builder()
            .retry_config(base.clone())
            .correlation_ids(self.monitoring.correlation_ids)
            .request_logging(self.monitoring.request_logging);

        let overrides = [
            (CallKind::Create, &self.retry.create),
            (CallKind::Update, &self.retry.update),
            (CallKind::Delete, &self.retry.delete),
            (CallKind::List, &self.retry.list),
            (CallKind::BulkCreate, &self.retry.bulk_create),
            (CallKind::Upload, &self.retry.upload),
        ];
        for (kind, table) in overrides {
            if let Some(table) = table {
                builder = builder.retry_for(kind, table.apply(&base));
            }
        }
        builder.build()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    /// Bearer token from the configured environment variable
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.backend.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::snapshot::ArrayFieldPolicy;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.collections.notes, "lead_notes");
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_sections_are_parsed() {
        let config = Config::from_toml_str(
            r#"
            [backend]
            base_url = "https://crm.example.test/api"
            timeout_secs = 10

            [collections]
            leads = "opportunities"

            [audit]
            actor = "sales-ops"

            [normalizer]
            array_policy = "lenient"

            [retry]
            max_attempts = 4

            [retry.create]
            max_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.base_url, "https://crm.example.test/api");
        assert_eq!(config.collections.leads, "opportunities");
        assert_eq!(config.collections.businesses, "businesses");

        let settings = config.onboarding_settings();
        assert_eq!(settings.actor, "sales-ops");
        assert_eq!(settings.array_policy, ArrayFieldPolicy::Lenient);

        let resilience = config.resilience();
        assert_eq!(resilience.retry_for(CallKind::Update).max_attempts, 4);
        assert_eq!(resilience.retry_for(CallKind::Create).max_attempts, 2);
        assert_eq!(resilience.retry_for(CallKind::BulkCreate).max_attempts, 1);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            ENV_BASE_URL => Some("http://override.test".to_string()),
            ENV_ACTOR => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.backend.base_url, "http://override.test");
        assert_eq!(config.audit.actor, "onboarding-cli");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::from_toml_str("[backend\nbase_url =").is_err());
    }
}
