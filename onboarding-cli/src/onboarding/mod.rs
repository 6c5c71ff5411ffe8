//! Onboarding core
//!
//! Creation of a business with one or more leads (the saga) and minimal-diff
//! editing of existing records. Built bottom-up:
//! - `snapshot`: canonical, comparison-ready copies of records
//! - `diff`: minimal patches between two snapshots
//! - `reconcile`: create/update/delete plans for child collections
//! - `saga`: fan-out creation with per-branch failure isolation
//! - `edit`: baselines and minimal updates of existing records
//! - `wizard`: the three-step form controller driving the above

pub mod diff;
pub mod edit;
pub mod reconcile;
pub mod saga;
pub mod settings;
pub mod snapshot;
pub mod types;
pub mod wizard;
