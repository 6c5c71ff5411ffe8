//! State types for the onboarding wizard

use crate::onboarding::types::OnboardingSubmission;

/// Wizard steps in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WizardStep {
    #[default]
    Parent,
    Dependent,
    Documents,
}

impl WizardStep {
    pub fn number(&self) -> u8 {
        match self {
            Self::Parent => 1,
            Self::Dependent => 2,
            Self::Documents => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Parent => "Business & Contacts",
            Self::Dependent => "Lead Details",
            Self::Documents => "Documents",
        }
    }

    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Parent => Some(Self::Dependent),
            Self::Dependent => Some(Self::Documents),
            Self::Documents => None,
        }
    }

    pub fn prev(&self) -> Option<Self> {
        match self {
            Self::Parent => None,
            Self::Dependent => Some(Self::Parent),
            Self::Documents => Some(Self::Dependent),
        }
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Step {} ({})", self.number(), self.label())
    }
}

/// Whether the wizard creates new records or edits existing ones; fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardMode {
    Create,
    Edit { parent_id: String },
}

/// Main wizard state
#[derive(Debug, Clone, Default)]
pub struct State {
    /// Current step
    pub step: WizardStep,

    /// Drafts of all three steps
    pub drafts: OnboardingSubmission,

    /// Drafts the wizard started with; restored on confirmed cancel
    pub initial: OnboardingSubmission,

    /// Cancel confirmation dialog is open
    pub confirm_cancel: bool,

    /// Submit was triggered; the wizard no longer accepts edits
    pub locked: bool,
}

impl State {
    pub fn new(initial: OnboardingSubmission) -> Self {
        Self {
            step: WizardStep::Parent,
            drafts: initial.clone(),
            initial,
            confirm_cancel: false,
            locked: false,
        }
    }
}
