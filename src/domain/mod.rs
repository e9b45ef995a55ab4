//! Domain layer - core business rules
//!
//! This layer contains:
//! - Entities and value objects (routing rules, forward plans, transfer logs)
//! - Pure domain services (rule matching, number normalization)
//! - Repository interfaces: ports implemented in the infrastructure layer

pub mod call;
pub mod forwarding;
pub mod phone;
pub mod routing;
pub mod shared;
pub mod transfer;

// Re-export commonly used types
pub use shared::{DomainError, Result};
