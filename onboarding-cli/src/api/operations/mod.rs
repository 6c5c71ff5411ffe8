//! Onboarding backend operations
//!
//! Describes the remote calls the onboarding core issues, so they can be
//! journaled, logged and matched against retry policies.

pub mod operation;

pub use operation::{CallKind, Operation, OperationResult};
