//! Application services

pub mod orchestrator;
pub mod resolver;

pub use orchestrator::{
    CallbackUrls, DialOutcome, TransferContext, TransferOrchestrator, WarmTransferAccepted,
};
pub use resolver::{decide_action, Resolution, RoutingResolver, TenantResolution};
