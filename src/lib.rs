//! Ringline - multi-tenant inbound call routing
//!
//! Decides what happens to every inbound call for a tenant business:
//! connect to an AI voice agent, ring human forwarding numbers, or take a
//! voicemail - and drives the forwarding state machine across stateless
//! telephony webhooks.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
