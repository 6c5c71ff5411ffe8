//! Saga outcome types and the aggregated report

use serde::Serialize;

use crate::onboarding::types::Category;

/// Lifecycle of one branch; `Success` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    Pending,
    Success,
    Failed,
}

impl BranchStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BranchStatus::Pending)
    }
}

impl std::fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchStatus::Pending => write!(f, "pending"),
            BranchStatus::Success => write!(f, "success"),
            BranchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Secondary steps that never decide a branch's status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStep {
    /// Parent-level bulk insert of the business contacts
    Contacts,
    Documents,
    FollowUpNotes,
    Associates,
    ContactLinks,
    Competitors,
}

impl std::fmt::Display for SubStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubStep::Contacts => "contacts",
            SubStep::Documents => "documents",
            SubStep::FollowUpNotes => "follow-up notes",
            SubStep::Associates => "associates",
            SubStep::ContactLinks => "contact links",
            SubStep::Competitors => "competitors",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubStepOutcome {
    Completed { count: usize },
    Skipped { reason: String },
    Failed { reason: String },
}

impl SubStepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SubStepOutcome::Failed { .. })
    }
}

impl std::fmt::Display for SubStepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubStepOutcome::Completed { count } => write!(f, "{} created", count),
            SubStepOutcome::Skipped { reason } => write!(f, "skipped ({})", reason),
            SubStepOutcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubStepResult {
    pub step: SubStep,
    #[serde(flatten)]
    pub outcome: SubStepOutcome,
}

/// Classified saga failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SagaError {
    /// Parent creation failed; no branch was attempted
    HardFailure { reason: String },
    /// A branch's lead could not be created
    BranchFailure { branch: String, reason: String },
    /// A secondary step failed after its primary record existed
    SubStepFailure {
        branch: String,
        step: SubStep,
        reason: String,
    },
}

impl std::fmt::Display for SagaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaError::HardFailure { reason } => {
                write!(f, "Business creation failed: {}", reason)
            }
            SagaError::BranchFailure { branch, reason } => {
                write!(f, "Lead for {} failed: {}", branch, reason)
            }
            SagaError::SubStepFailure {
                branch,
                step,
                reason,
            } => write!(f, "{} of {} failed: {}", step, branch, reason),
        }
    }
}

impl std::error::Error for SagaError {}

/// Outcome of one branch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchResult {
    pub categories: Vec<Category>,
    pub status: BranchStatus,
    pub lead_id: Option<String>,
    pub error: Option<String>,
    pub sub_steps: Vec<SubStepResult>,
}

impl BranchResult {
    pub fn pending(categories: Vec<Category>) -> Self {
        Self {
            categories,
            status: BranchStatus::Pending,
            lead_id: None,
            error: None,
            sub_steps: Vec::new(),
        }
    }

    /// Human readable branch name ("HVAC", "HVAC + Electrical")
    pub fn label(&self) -> String {
        if self.categories.is_empty() {
            return "(no category)".to_string();
        }
        self.categories
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    }

    pub fn succeed(&mut self, lead_id: String) {
        if self.status.is_terminal() {
            log::warn!("Branch {} is already {}, ignoring success", self.label(), self.status);
            return;
        }
        self.status = BranchStatus::Success;
        self.lead_id = Some(lead_id);
    }

    pub fn fail(&mut self, reason: String) {
        if self.status.is_terminal() {
            log::warn!("Branch {} is already {}, ignoring failure", self.label(), self.status);
            return;
        }
        self.status = BranchStatus::Failed;
        self.error = Some(reason);
    }

    pub fn record(&mut self, step: SubStep, outcome: SubStepOutcome) {
        self.sub_steps.push(SubStepResult { step, outcome });
    }

    pub fn sub_failures(&self) -> impl Iterator<Item = &SubStepResult> {
        self.sub_steps.iter().filter(|s| s.outcome.is_failed())
    }
}

#[cfg(test)]
impl BranchResult {
    pub fn sub_step(&self, step: SubStep) -> Option<&SubStepOutcome> {
        self.sub_steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| &s.outcome)
    }
}

/// Aggregated result of one saga run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SagaReport {
    pub correlation_id: String,
    pub parent_id: Option<String>,
    pub hard_failure: Option<SagaError>,
    /// Parent-level contact creation, absent when the parent failed
    pub parent_contacts: Option<SubStepOutcome>,
    pub branches: Vec<BranchResult>,
    /// Whether the single post-branch flag update on the parent went through
    pub parent_flagged: bool,
}

impl SagaReport {
    pub fn succeeded(&self) -> usize {
        self.branches
            .iter()
            .filter(|b| b.status == BranchStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.branches
            .iter()
            .filter(|b| b.status == BranchStatus::Failed)
            .count()
    }

    pub fn is_hard_failure(&self) -> bool {
        self.hard_failure.is_some()
    }

    /// Every failure, in the order it happened
    pub fn errors(&self) -> Vec<SagaError> {
        if let Some(hard) = &self.hard_failure {
            return vec![hard.clone()];
        }

        let mut errors = Vec::new();
        if let Some(SubStepOutcome::Failed { reason }) = &self.parent_contacts {
            errors.push(SagaError::SubStepFailure {
                branch: "business".to_string(),
                step: SubStep::Contacts,
                reason: reason.clone(),
            });
        }

        for branch in &self.branches {
            if let Some(reason) = &branch.error {
                errors.push(SagaError::BranchFailure {
                    branch: branch.label(),
                    reason: reason.clone(),
                });
            }
            for sub in branch.sub_failures() {
                if let SubStepOutcome::Failed { reason } = &sub.outcome {
                    errors.push(SagaError::SubStepFailure {
                        branch: branch.label(),
                        step: sub.step,
                        reason: reason.clone(),
                    });
                }
            }
        }
        errors
    }

    /// Multi-line summary for the terminal
    pub fn summary(&self) -> String {
        if let Some(hard) = &self.hard_failure {
            return format!("{}. No leads were created.", hard);
        }

        let mut lines = vec![format!(
            "{} of {} lead(s) created, {} failed",
            self.succeeded(),
            self.branches.len(),
            self.failed()
        )];

        for branch in &self.branches {
            match branch.status {
                BranchStatus::Success => lines.push(format!(
                    "  {}: success (lead {})",
                    branch.label(),
                    branch.lead_id.as_deref().unwrap_or("?")
                )),
                _ => lines.push(format!(
                    "  {}: {} ({})",
                    branch.label(),
                    branch.status,
                    branch.error.as_deref().unwrap_or("no reason recorded")
                )),
            }
            for sub in branch.sub_failures() {
                lines.push(format!("    {} {}", sub.step, sub.outcome));
            }
        }

        if let Some(outcome @ SubStepOutcome::Failed { .. }) = &self.parent_contacts {
            lines.push(format!("  business contacts {}", outcome));
        }
        if !self.parent_flagged {
            lines.push("  business could not be flagged as having leads".to_string());
        }
        lines.join("\n")
    }
}
