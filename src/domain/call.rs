//! Call records
//!
//! One row per telephony call, created on the first inbound webhook or on
//! voice-agent session start, updated through status transitions reported by
//! later webhooks. Append-only: rows are never deleted.

use crate::domain::shared::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ringing,
    InProgress,
    Forwarding,
    Completed,
    Failed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in_progress",
            CallStatus::Forwarding => "forwarding",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "in_progress" => CallStatus::InProgress,
            "forwarding" => CallStatus::Forwarding,
            "completed" => CallStatus::Completed,
            "failed" => CallStatus::Failed,
            _ => CallStatus::Ringing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub tenant_id: String,
    /// Provider call id; unique across the platform
    pub provider_call_id: String,
    pub voice_agent_session_id: Option<String>,
    /// The tenant inbound number that was dialed
    pub ai_phone_number: Option<String>,
    pub caller_number: Option<String>,
    pub selected_agent_key: Option<String>,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Call {
    pub fn inbound(
        tenant_id: &str,
        provider_call_id: &str,
        caller_number: &str,
        dialed_number: &str,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            provider_call_id: provider_call_id.to_string(),
            voice_agent_session_id: None,
            ai_phone_number: Some(dialed_number.to_string()),
            caller_number: Some(caller_number.to_string()),
            selected_agent_key: None,
            status: CallStatus::Ringing,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Merge a patch into this call: unset fields keep their value.
    pub fn apply(&mut self, patch: CallPatch) {
        if let Some(session_id) = patch.voice_agent_session_id {
            self.voice_agent_session_id = Some(session_id);
        }
        if let Some(number) = patch.ai_phone_number {
            self.ai_phone_number = Some(number);
        }
        if let Some(caller) = patch.caller_number {
            self.caller_number = Some(caller);
        }
        if let Some(agent_key) = patch.selected_agent_key {
            self.selected_agent_key = Some(agent_key);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ended_at) = patch.ended_at {
            self.ended_at = Some(ended_at);
        }
    }
}

/// Partial update; unset fields are preserved.
#[derive(Debug, Clone, Default)]
pub struct CallPatch {
    pub voice_agent_session_id: Option<String>,
    pub ai_phone_number: Option<String>,
    pub caller_number: Option<String>,
    pub selected_agent_key: Option<String>,
    pub status: Option<CallStatus>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Call store, tenant-partitioned, with a cross-tenant lookup by provider
/// call id for out-of-band requests (warm transfer) that carry only the id.
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn get(&self, tenant_id: &str, provider_call_id: &str) -> Result<Option<Call>>;

    /// Insert the row if absent, otherwise merge the patchable fields of
    /// `call` into the existing row (idempotent for duplicate webhooks).
    async fn upsert(&self, call: &Call) -> Result<()>;

    /// Merge-on-existing update; no-op if the row is absent.
    async fn update(
        &self,
        tenant_id: &str,
        provider_call_id: &str,
        patch: CallPatch,
    ) -> Result<()>;

    async fn find_by_call_id(&self, provider_call_id: &str) -> Result<Option<Call>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            CallStatus::Ringing,
            CallStatus::InProgress,
            CallStatus::Forwarding,
            CallStatus::Completed,
            CallStatus::Failed,
        ] {
            assert_eq!(CallStatus::parse(status.as_str()), status);
        }
        assert_eq!(CallStatus::parse("nonsense"), CallStatus::Ringing);
    }

    #[test]
    fn test_inbound_call_defaults() {
        let call = Call::inbound("t1", "CA123", "+14155550111", "+14155550000");
        assert_eq!(call.status, CallStatus::Ringing);
        assert_eq!(call.ai_phone_number.as_deref(), Some("+14155550000"));
        assert_eq!(call.caller_number.as_deref(), Some("+14155550111"));
        assert!(call.ended_at.is_none());
        assert!(call.voice_agent_session_id.is_none());
    }
}
