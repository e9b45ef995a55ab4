//! Infrastructure layer - technical implementations
//!
//! This layer contains:
//! - Store implementations (Postgres, in-memory)
//! - Call-control document rendering
//! - External collaborator clients (telephony provider, voice agent)

pub mod callcontrol;
pub mod persistence;
pub mod telephony;
