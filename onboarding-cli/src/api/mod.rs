//! Onboarding backend API module
//!
//! Defines the collaborator contracts the onboarding core depends on, an HTTP
//! client implementing them against the REST backend, and an in-memory backend
//! used for dry runs and tests.

pub mod client;
pub mod memory;
pub mod operations;
pub mod resilience;
pub mod store;

pub use client::BackendClient;
pub use memory::MemoryBackend;
pub use operations::CallKind;
pub use store::Collaborators;
