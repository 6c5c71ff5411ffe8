//! Subcommands and the helpers they share

pub mod diff;
pub mod edit;
pub mod submit;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::api::BackendClient;
use crate::config::Config;
use crate::onboarding::types::OnboardingSubmission;
use crate::onboarding::wizard::{Msg, Wizard, WizardStep};

/// Read a `.toml` or `.json` file into `T`
pub(crate) fn read_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))
    }
}

/// Feed every draft into the wizard and move it to the documents step.
/// Each step is gated exactly as it would be interactively.
pub(crate) fn fill_wizard(wizard: &mut Wizard, drafts: OnboardingSubmission) -> Result<()> {
    let OnboardingSubmission {
        parent,
        dependent,
        documents,
    } = drafts;

    wizard.update(Msg::UpdateParent(parent))?;
    wizard.update(Msg::Next)?;
    wizard.update(Msg::UpdateDependent(dependent))?;
    wizard.update(Msg::Next)?;
    wizard.update(Msg::UpdateDocuments(documents))?;

    debug_assert_eq!(wizard.step(), WizardStep::Documents);
    Ok(())
}

/// Backend client built from the loaded configuration
pub(crate) fn backend_client(config: &Config, correlation_id: &str) -> Result<BackendClient> {
    let token = config.token();
    if token.is_none() {
        log::warn!(
            "{} is not set, requests are sent without authorization",
            config.backend.token_env
        );
    }

    let client = BackendClient::new(
        config.backend.base_url.clone(),
        token,
        config.timeout(),
        config.resilience(),
    )
    .context("Failed to set up the backend client")?;

    Ok(client.with_correlation_id(correlation_id))
}
