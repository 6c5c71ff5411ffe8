//! Collection names and audit settings used by the onboarding core

use serde::{Deserialize, Serialize};

use super::snapshot::ArrayFieldPolicy;

/// Foreign key from contacts to their business
pub const BUSINESS_LINK: &str = "business_id";
/// Foreign key from lead-owned records to their lead
pub const LEAD_LINK: &str = "lead_id";
/// Contact reference in a lead-contact link record
pub const CONTACT_LINK: &str = "contact_id";
pub const CREATED_BY: &str = "created_by";
pub const UPDATED_BY: &str = "updated_by";
/// Set on the business once its leads were generated
pub const PARENT_FLAG: &str = "has_leads";

/// Backend collection names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collections {
    pub businesses: String,
    pub leads: String,
    pub contacts: String,
    pub lead_contacts: String,
    pub competitors: String,
    pub associates: String,
    pub notes: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            businesses: "businesses".to_string(),
            leads: "leads".to_string(),
            contacts: "contacts".to_string(),
            lead_contacts: "lead_contacts".to_string(),
            competitors: "competitors".to_string(),
            associates: "associates".to_string(),
            notes: "lead_notes".to_string(),
        }
    }
}

/// Runtime settings shared by the saga, the edit session and the wizard
#[derive(Debug, Clone, PartialEq)]
pub struct OnboardingSettings {
    pub collections: Collections,
    /// Recorded in `created_by` / `updated_by`
    pub actor: String,
    pub array_policy: ArrayFieldPolicy,
}

impl Default for OnboardingSettings {
    fn default() -> Self {
        Self {
            collections: Collections::default(),
            actor: "onboarding-cli".to_string(),
            array_policy: ArrayFieldPolicy::default(),
        }
    }
}
