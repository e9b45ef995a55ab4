//! Call-control documents
//!
//! The markup responses returned to the telephony provider, instructing it
//! what to do next with a call (speak, gather digits, record, dial, connect
//! media, hang up). Builders are pure: every input is an already-resolved
//! value, no store or network access happens here.

pub mod builder;
pub mod document;

pub use document::{DialNumber, Document, Verb};
