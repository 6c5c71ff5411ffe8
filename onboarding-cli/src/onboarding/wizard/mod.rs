//! Onboarding wizard
//!
//! Finite-state controller for the three-step form:
//! 1. Business & contacts
//! 2. Lead details (categories, branch mode, competitors, ...)
//! 3. Documents
//!
//! The wizard never talks to the backend. A submit produces an [`Effect`] that
//! the caller turns into a saga run (create mode) or an edit (edit mode).

pub mod msg;
pub mod state;
pub mod validation;

pub use msg::{Effect, Msg};
pub use state::{State, WizardMode, WizardStep};

use std::path::Path;

use super::edit::{EditReport, EditSession};
use super::snapshot::MalformedFieldError;
use super::types::OnboardingSubmission;

/// Rejected wizard transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    /// The step's draft does not pass its gate
    Invalid { step: WizardStep, problems: Vec<String> },
    /// Next on the last step
    NoNextStep,
    /// Submit before reaching the documents step
    NotOnLastStep(WizardStep),
    /// Submit already happened
    Locked,
    /// Only ConfirmCancel / DismissCancel are accepted right now
    CancelPending,
    /// ConfirmCancel / DismissCancel without a pending cancel
    NoCancelPending,
    /// Branch mode only applies to creation
    EditMode,
}

impl std::fmt::Display for WizardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WizardError::Invalid { step, problems } => {
                write!(f, "{} is incomplete: {}", step, problems.join("; "))
            }
            WizardError::NoNextStep => write!(f, "Already on the last step"),
            WizardError::NotOnLastStep(step) => {
                write!(f, "Submit is only possible from the documents step (currently {})", step)
            }
            WizardError::Locked => write!(f, "The wizard was already submitted"),
            WizardError::CancelPending => write!(f, "Confirm or dismiss the cancel first"),
            WizardError::NoCancelPending => write!(f, "No cancel to confirm"),
            WizardError::EditMode => write!(f, "Branch mode cannot be changed while editing"),
        }
    }
}

impl std::error::Error for WizardError {}

/// Existence check used by the documents gate
pub type FileCheck = fn(&Path) -> bool;

fn file_exists(path: &Path) -> bool {
    path.is_file()
}

pub struct Wizard {
    state: State,
    mode: WizardMode,
    session: Option<EditSession>,
    file_check: FileCheck,
}

impl Wizard {
    /// Wizard for a new business with empty drafts
    pub fn create() -> Self {
        Self {
            state: State::new(OnboardingSubmission::default()),
            mode: WizardMode::Create,
            session: None,
            file_check: file_exists,
        }
    }

    /// Wizard prefilled from an edit session's baselines
    pub fn edit(session: EditSession) -> Result<Self, MalformedFieldError> {
        let drafts = session.drafts()?;
        Ok(Self {
            state: State::new(drafts),
            mode: WizardMode::Edit {
                parent_id: session.parent_id().to_string(),
            },
            session: Some(session),
            file_check: file_exists,
        })
    }

    pub fn step(&self) -> WizardStep {
        self.state.step
    }

    pub fn drafts(&self) -> &OnboardingSubmission {
        &self.state.drafts
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    fn creating(&self) -> bool {
        self.mode == WizardMode::Create
    }

    /// Problems blocking `step`; empty when the step is valid
    pub fn problems(&self, step: WizardStep) -> Vec<String> {
        let drafts = &self.state.drafts;
        match step {
            WizardStep::Parent => validation::validate_parent(&drafts.parent),
            WizardStep::Dependent => {
                validation::validate_dependent(&drafts.dependent, self.creating())
            }
            WizardStep::Documents => {
                validation::validate_documents(&drafts.documents, self.file_check)
            }
        }
    }

    fn gate(&self, step: WizardStep) -> Result<(), WizardError> {
        let problems = self.problems(step);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(WizardError::Invalid { step, problems })
        }
    }

    pub fn update(&mut self, msg: Msg) -> Result<Effect, WizardError> {
        if self.state.confirm_cancel {
            return match msg {
                Msg::ConfirmCancel => {
                    log::info!("Onboarding cancelled, drafts discarded");
                    self.state = State::new(self.state.initial.clone());
                    Ok(Effect::Reset)
                }
                Msg::DismissCancel => {
                    self.state.confirm_cancel = false;
                    Ok(Effect::None)
                }
                _ => Err(WizardError::CancelPending),
            };
        }

        if self.state.locked {
            return Err(WizardError::Locked);
        }

        match msg {
            Msg::Next => {
                let next = self.state.step.next().ok_or(WizardError::NoNextStep)?;
                self.gate(self.state.step)?;
                self.state.step = next;
                log::debug!("Wizard moved to {}", next);
                Ok(Effect::StepChanged(next))
            }
            Msg::Back => match self.state.step.prev() {
                Some(prev) => {
                    self.state.step = prev;
                    Ok(Effect::StepChanged(prev))
                }
                None => Ok(Effect::None),
            },
            Msg::Submit => {
                if self.state.step != WizardStep::Documents {
                    return Err(WizardError::NotOnLastStep(self.state.step));
                }
                self.gate(WizardStep::Parent)?;
                self.gate(WizardStep::Dependent)?;
                self.gate(WizardStep::Documents)?;

                self.state.locked = true;
                let submission = self.state.drafts.clone();
                Ok(match &self.mode {
                    WizardMode::Create => Effect::RunSaga(submission),
                    WizardMode::Edit { parent_id } => {
                        log::debug!("Submitting edit of business {}", parent_id);
                        Effect::ApplyEdit(submission)
                    }
                })
            }
            Msg::Cancel => {
                self.state.confirm_cancel = true;
                Ok(Effect::CancelRequested)
            }
            Msg::ConfirmCancel | Msg::DismissCancel => Err(WizardError::NoCancelPending),
            Msg::SetMode(mode) => {
                if !self.creating() {
                    return Err(WizardError::EditMode);
                }
                self.state.drafts.dependent.mode = mode;
                Ok(Effect::None)
            }
            Msg::UpdateParent(parent) => {
                self.state.drafts.parent = parent;
                Ok(Effect::None)
            }
            Msg::UpdateDependent(dependent) => {
                self.state.drafts.dependent = dependent;
                Ok(Effect::None)
            }
            Msg::UpdateDocuments(documents) => {
                self.state.drafts.documents = documents;
                Ok(Effect::None)
            }
        }
    }

    /// Record the result of an applied edit: baselines move forward for what
    /// persisted, created children get their ids, and the wizard unlocks.
    pub fn commit_edit(&mut self, report: &EditReport) -> Result<(), MalformedFieldError> {
        if let Some(session) = self.session.as_mut() {
            session.commit(report, &mut self.state.drafts)?;
            self.state.initial = self.state.drafts.clone();
            self.state.drafts.documents = Default::default();
        }
        self.state.locked = false;
        Ok(())
    }
}

#[cfg(test)]
impl Wizard {
    pub fn with_file_check(mut self, file_check: FileCheck) -> Self {
        self.file_check = file_check;
        self
    }

    pub fn mode(&self) -> &WizardMode {
        &self.mode
    }

    pub fn is_locked(&self) -> bool {
        self.state.locked
    }

    pub fn is_cancel_pending(&self) -> bool {
        self.state.confirm_cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::MemoryBackend;
    use crate::api::store::Collaborators;
    use crate::onboarding::settings::OnboardingSettings;
    use crate::onboarding::types::{
        BranchMode, Category, ContactBook, ContactPerson, DependentDraft, Document,
        DocumentsDraft, ParentDraft, Record,
    };
    use serde_json::json;

    fn valid_parent() -> ParentDraft {
        let mut parent = ParentDraft::default();
        parent.fields.insert("name".into(), json!("Acme"));
        parent.contacts = ContactBook::new(vec![ContactPerson {
            name: "Dana".into(),
            phone: "555".into(),
            ..ContactPerson::new_draft()
        }]);
        parent
    }

    fn valid_dependent() -> DependentDraft {
        DependentDraft {
            categories: vec![Category::new("HVAC")],
            ..DependentDraft::default()
        }
    }

    fn filled_wizard() -> Wizard {
        let mut wizard = Wizard::create().with_file_check(|_| true);
        wizard.update(Msg::UpdateParent(valid_parent())).unwrap();
        wizard.update(Msg::Next).unwrap();
        wizard.update(Msg::UpdateDependent(valid_dependent())).unwrap();
        wizard.update(Msg::Next).unwrap();
        wizard
    }

    #[test]
    fn test_next_requires_valid_step() {
        let mut wizard = Wizard::create();
        let err = wizard.update(Msg::Next).unwrap_err();
        assert!(matches!(err, WizardError::Invalid { step: WizardStep::Parent, .. }));
        assert_eq!(wizard.step(), WizardStep::Parent);

        wizard.update(Msg::UpdateParent(valid_parent())).unwrap();
        assert_eq!(
            wizard.update(Msg::Next).unwrap(),
            Effect::StepChanged(WizardStep::Dependent)
        );
    }

    #[test]
    fn test_back_keeps_drafts() {
        let mut wizard = filled_wizard();
        assert_eq!(wizard.step(), WizardStep::Documents);

        wizard.update(Msg::Back).unwrap();
        wizard.update(Msg::Back).unwrap();
        assert_eq!(wizard.update(Msg::Back).unwrap(), Effect::None);
        assert_eq!(wizard.step(), WizardStep::Parent);
        assert_eq!(wizard.drafts().parent.name(), "Acme");
        assert_eq!(wizard.drafts().dependent.categories.len(), 1);
    }

    #[test]
    fn test_submit_only_from_documents_step() {
        let mut wizard = Wizard::create().with_file_check(|_| true);
        wizard.update(Msg::UpdateParent(valid_parent())).unwrap();
        assert!(matches!(
            wizard.update(Msg::Submit),
            Err(WizardError::NotOnLastStep(WizardStep::Parent))
        ));

        let mut wizard = filled_wizard();
        wizard.update(Msg::SetMode(BranchMode::Unified)).unwrap();
        match wizard.update(Msg::Submit).unwrap() {
            Effect::RunSaga(submission) => {
                assert_eq!(submission.dependent.mode, BranchMode::Unified)
            }
            other => panic!("unexpected effect {:?}", other),
        }
        assert!(wizard.is_locked());
        assert_eq!(wizard.update(Msg::Cancel), Err(WizardError::Locked));
    }

    #[test]
    fn test_submit_checks_documents_exist() {
        let mut wizard = filled_wizard().with_file_check(|_| false);
        let mut documents = DocumentsDraft::default();
        documents.common.push(Document::new("/missing.pdf", ""));
        wizard.update(Msg::UpdateDocuments(documents)).unwrap();

        assert!(matches!(
            wizard.update(Msg::Submit),
            Err(WizardError::Invalid { step: WizardStep::Documents, .. })
        ));
        assert!(!wizard.is_locked());
    }

    #[test]
    fn test_cancel_requires_confirmation_and_resets() {
        let mut wizard = filled_wizard();

        assert_eq!(wizard.update(Msg::Cancel).unwrap(), Effect::CancelRequested);
        assert!(wizard.is_cancel_pending());
        assert_eq!(wizard.update(Msg::Next), Err(WizardError::CancelPending));

        assert_eq!(wizard.update(Msg::DismissCancel).unwrap(), Effect::None);
        assert!(!wizard.is_cancel_pending());
        assert_eq!(wizard.step(), WizardStep::Documents);

        wizard.update(Msg::Cancel).unwrap();
        assert_eq!(wizard.update(Msg::ConfirmCancel).unwrap(), Effect::Reset);
        assert_eq!(wizard.step(), WizardStep::Parent);
        assert_eq!(wizard.drafts(), &OnboardingSubmission::default());
        assert_eq!(wizard.update(Msg::ConfirmCancel), Err(WizardError::NoCancelPending));
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_edit_mode_submit_applies_edit_and_unlocks() {
        let backend = MemoryBackend::new();
        backend.seed("businesses", "b1", record(json!({"name": "Acme"})));
        let settings = OnboardingSettings::default();
        let session = EditSession::load(&backend, &settings, "b1", None).await.unwrap();

        let mut wizard = Wizard::edit(session).unwrap().with_file_check(|_| true);
        assert_eq!(
            wizard.mode(),
            &WizardMode::Edit {
                parent_id: "b1".to_string()
            }
        );
        assert_eq!(wizard.update(Msg::SetMode(BranchMode::Unified)), Err(WizardError::EditMode));

        let mut parent = wizard.drafts().parent.clone();
        parent.fields.insert("name".into(), json!("Acme Ltd"));
        wizard.update(Msg::UpdateParent(parent)).unwrap();
        wizard.update(Msg::Next).unwrap();
        wizard.update(Msg::Next).unwrap();

        let Effect::ApplyEdit(submission) = wizard.update(Msg::Submit).unwrap() else {
            panic!("expected an edit effect");
        };
        let report = wizard
            .session()
            .unwrap()
            .apply(Collaborators::from_backend(&backend), &settings, &submission)
            .await;
        wizard.commit_edit(&report).unwrap();
        assert!(!wizard.is_locked());

        let again = wizard
            .session()
            .unwrap()
            .apply(Collaborators::from_backend(&backend), &settings, wizard.drafts())
            .await;
        assert!(!again.has_changes());
    }
}
