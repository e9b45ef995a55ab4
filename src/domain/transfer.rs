//! Transfer log - the persisted forwarding state machine
//!
//! One log per (tenant, provider call id), created on the first dial attempt
//! and mutated by every subsequent webhook for that call. All continuity
//! between stateless webhook invocations lives here: each transition is
//! computed from the persisted state read at the start of the invocation.
//! Logs are never deleted; terminal rows remain as the audit trail.

use crate::domain::forwarding::{FallbackPolicy, ForwardTarget, RingStrategy};
use crate::domain::shared::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a forwarding attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// A target is (or is about to be) ringing
    Dialing,
    /// A human answered; terminal
    Connected,
    /// Dialing exhausted, fallback is being resolved
    Fallback,
    /// Caller left a DTMF callback number; terminal
    CallbackCaptured,
    /// Out-of-band warm transfer accepted, redirect in flight
    WarmTransferRequested,
    /// Fallback connected the caller to an AI agent; terminal
    FallbackAgent,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Dialing => "dialing",
            TransferStatus::Connected => "connected",
            TransferStatus::Fallback => "fallback",
            TransferStatus::CallbackCaptured => "callback_captured",
            TransferStatus::WarmTransferRequested => "warm_transfer_requested",
            TransferStatus::FallbackAgent => "fallback_agent",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "connected" => TransferStatus::Connected,
            "fallback" => TransferStatus::Fallback,
            "callback_captured" => TransferStatus::CallbackCaptured,
            "warm_transfer_requested" => TransferStatus::WarmTransferRequested,
            "fallback_agent" => TransferStatus::FallbackAgent,
            _ => TransferStatus::Dialing,
        }
    }

    /// Terminal states accept no further dial-outcome transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Connected
                | TransferStatus::CallbackCaptured
                | TransferStatus::FallbackAgent
        )
    }
}

/// Forwarding state for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferLog {
    pub tenant_id: String,
    /// Provider call id of the inbound (parent) call
    pub call_id: String,
    pub status: TransferStatus,
    /// Snapshot of the dial order taken when forwarding started
    pub targets: Vec<ForwardTarget>,
    pub ring_strategy: RingStrategy,
    pub timeout_seconds: u32,
    pub fallback: Option<FallbackPolicy>,
    /// Index into `targets` of the leg currently ringing
    pub current_index: u32,
    /// Short context spoken to the human before bridging
    pub summary: Option<String>,
    pub reason: Option<String>,
    /// Agent key used if the fallback connects an AI agent
    pub agent_key: Option<String>,
    /// DTMF callback number captured by the ai_callback fallback
    pub callback_number: Option<String>,
    /// Recording produced by the voicemail fallback
    pub recording_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferLog {
    pub fn new(
        tenant_id: &str,
        call_id: &str,
        status: TransferStatus,
        targets: Vec<ForwardTarget>,
        ring_strategy: RingStrategy,
        timeout_seconds: u32,
        fallback: Option<FallbackPolicy>,
    ) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.to_string(),
            call_id: call_id.to_string(),
            status,
            targets,
            ring_strategy,
            timeout_seconds,
            fallback,
            current_index: 0,
            summary: None,
            reason: None,
            agent_key: None,
            callback_number: None,
            recording_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_context(
        mut self,
        summary: Option<String>,
        reason: Option<String>,
        agent_key: Option<String>,
    ) -> Self {
        self.summary = summary;
        self.reason = reason;
        self.agent_key = agent_key;
        self
    }

    /// Merge a patch into this log: unset fields keep their value.
    pub fn apply(&mut self, patch: TransferLogPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(current_index) = patch.current_index {
            self.current_index = current_index;
        }
        if let Some(summary) = patch.summary {
            self.summary = Some(summary);
        }
        if let Some(reason) = patch.reason {
            self.reason = Some(reason);
        }
        if let Some(agent_key) = patch.agent_key {
            self.agent_key = Some(agent_key);
        }
        if let Some(callback_number) = patch.callback_number {
            self.callback_number = Some(callback_number);
        }
        if let Some(recording_url) = patch.recording_url {
            self.recording_url = Some(recording_url);
        }
        self.updated_at = Utc::now();
    }

    /// Target currently (or next to be) rung.
    pub fn current_target(&self) -> Option<&ForwardTarget> {
        self.targets.get(self.current_index as usize)
    }

    /// Whether a sequential cycle has another target after the current one.
    pub fn has_next_target(&self) -> bool {
        (self.current_index as usize + 1) < self.targets.len()
    }
}

/// Partial update; unset fields are preserved (idempotent merge).
#[derive(Debug, Clone, Default)]
pub struct TransferLogPatch {
    pub status: Option<TransferStatus>,
    pub current_index: Option<u32>,
    pub summary: Option<String>,
    pub reason: Option<String>,
    pub agent_key: Option<String>,
    pub callback_number: Option<String>,
    pub recording_url: Option<String>,
}

/// Transfer log store, tenant-partitioned, plus a cross-tenant lookup by
/// provider call id for webhooks that carry no tenant context. Durable
/// implementations maintain a call-id -> tenant secondary index written
/// alongside the primary row so the lookup is not a partition scan.
#[async_trait]
pub trait TransferLogStore: Send + Sync {
    async fn get(&self, tenant_id: &str, call_id: &str) -> Result<Option<TransferLog>>;

    /// Create or overwrite the full log (start of a forwarding cycle).
    async fn put(&self, log: &TransferLog) -> Result<()>;

    /// Merge-on-existing update; returns the stored row after the merge.
    async fn update(
        &self,
        tenant_id: &str,
        call_id: &str,
        patch: TransferLogPatch,
    ) -> Result<TransferLog>;

    async fn find_by_call_id(&self, call_id: &str) -> Result<Option<TransferLog>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_targets(n: usize) -> TransferLog {
        let targets = (0..n)
            .map(|i| ForwardTarget {
                to: format!("+1415555010{}", i),
                label: None,
                priority: i as u32,
            })
            .collect();
        TransferLog::new(
            "t1",
            "CA100",
            TransferStatus::Dialing,
            targets,
            RingStrategy::Sequential,
            20,
            Some(FallbackPolicy::Voicemail),
        )
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            TransferStatus::Dialing,
            TransferStatus::Connected,
            TransferStatus::Fallback,
            TransferStatus::CallbackCaptured,
            TransferStatus::WarmTransferRequested,
            TransferStatus::FallbackAgent,
        ] {
            assert_eq!(TransferStatus::parse(status.as_str()), status);
        }
        // Unknown stored values decode to the non-terminal start state
        assert_eq!(TransferStatus::parse("garbage"), TransferStatus::Dialing);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransferStatus::Connected.is_terminal());
        assert!(TransferStatus::CallbackCaptured.is_terminal());
        assert!(TransferStatus::FallbackAgent.is_terminal());
        assert!(!TransferStatus::Dialing.is_terminal());
        assert!(!TransferStatus::Fallback.is_terminal());
        assert!(!TransferStatus::WarmTransferRequested.is_terminal());
    }

    #[test]
    fn test_current_and_next_target() {
        let mut log = log_with_targets(3);
        assert_eq!(log.current_target().unwrap().to, "+14155550100");
        assert!(log.has_next_target());

        log.current_index = 2;
        assert_eq!(log.current_target().unwrap().to, "+14155550102");
        assert!(!log.has_next_target());

        log.current_index = 3;
        assert!(log.current_target().is_none());
    }
}
