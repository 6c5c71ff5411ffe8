//! Message and effect types for the onboarding wizard

use super::state::WizardStep;
use crate::onboarding::types::{
    BranchMode, DependentDraft, DocumentsDraft, OnboardingSubmission, ParentDraft,
};

/// All messages the wizard accepts
#[derive(Debug, Clone)]
pub enum Msg {
    // === Navigation ===
    /// Proceed to the next step (only when the current step is valid)
    Next,
    /// Go back one step; drafts are kept
    Back,
    /// Submit from the documents step
    Submit,

    // === Cancellation ===
    /// Ask to discard everything
    Cancel,
    /// Confirm the pending cancel
    ConfirmCancel,
    /// Keep editing
    DismissCancel,

    // === Drafts ===
    SetMode(BranchMode),
    UpdateParent(ParentDraft),
    UpdateDependent(DependentDraft),
    UpdateDocuments(DocumentsDraft),
}

/// What the caller has to do after a message was handled
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    StepChanged(WizardStep),
    /// Show the cancel confirmation
    CancelRequested,
    /// Drafts were discarded and the wizard is back at the first step
    Reset,
    /// Create mode submit
    RunSaga(OnboardingSubmission),
    /// Edit mode submit
    ApplyEdit(OnboardingSubmission),
}
