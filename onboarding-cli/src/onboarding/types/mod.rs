//! Domain types of the onboarding workflow

pub mod contact;
pub mod entity;
pub mod lead;
pub mod submission;

pub use contact::{ContactBook, ContactPerson};
pub use entity::{EntityKind, Identity, Record};
pub use lead::{BranchMode, Category, Competitor, Document};
pub use submission::{DependentDraft, DocumentsDraft, OnboardingSubmission, ParentDraft};
