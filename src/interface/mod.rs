//! Interface layer - External interfaces (webhooks, management API)

pub mod api;
