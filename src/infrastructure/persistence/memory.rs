//! In-memory store implementations
//!
//! Reliability fallback for environments without durable storage
//! configured, and the backend the test suites run on. Each table is a
//! single mutex-guarded map; this is deliberately coarse since the memory
//! backend is not a performance path. Keys are always
//! (tenant id, natural key), matching the durable backend's partitioning.

use crate::domain::call::{Call, CallPatch, CallStore};
use crate::domain::forwarding::{ForwardPlan, ForwardPlanPatch, ForwardStore};
use crate::domain::routing::{
    NumberAssignment, NumberStore, RoutingConfig, RoutingConfigPatch, RoutingStore,
};
use crate::domain::shared::{DomainError, Result};
use crate::domain::transfer::{TransferLog, TransferLogPatch, TransferLogStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

type TenantKey = (String, String);

#[derive(Default)]
pub struct MemoryRoutingStore {
    rows: Mutex<HashMap<TenantKey, RoutingConfig>>,
}

impl MemoryRoutingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoutingStore for MemoryRoutingStore {
    async fn get(&self, tenant_id: &str, phone_number: &str) -> Result<Option<RoutingConfig>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&(tenant_id.to_string(), phone_number.to_string()))
            .cloned())
    }

    async fn upsert(
        &self,
        tenant_id: &str,
        phone_number: &str,
        patch: RoutingConfigPatch,
    ) -> Result<RoutingConfig> {
        let mut rows = self.rows.lock().unwrap();
        let config = rows
            .entry((tenant_id.to_string(), phone_number.to_string()))
            .or_insert_with(|| RoutingConfig::new(tenant_id, phone_number));
        config.apply(patch);
        Ok(config.clone())
    }
}

#[derive(Default)]
pub struct MemoryForwardStore {
    rows: Mutex<HashMap<TenantKey, ForwardPlan>>,
}

impl MemoryForwardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ForwardStore for MemoryForwardStore {
    async fn get(&self, tenant_id: &str, phone_number: &str) -> Result<Option<ForwardPlan>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&(tenant_id.to_string(), phone_number.to_string()))
            .cloned())
    }

    async fn upsert(
        &self,
        tenant_id: &str,
        phone_number: &str,
        patch: ForwardPlanPatch,
    ) -> Result<ForwardPlan> {
        let mut rows = self.rows.lock().unwrap();
        let plan = rows
            .entry((tenant_id.to_string(), phone_number.to_string()))
            .or_insert_with(|| ForwardPlan::new(tenant_id, phone_number));
        plan.apply(patch);
        Ok(plan.clone())
    }
}

#[derive(Default)]
pub struct MemoryTransferLogStore {
    rows: Mutex<HashMap<TenantKey, TransferLog>>,
}

impl MemoryTransferLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransferLogStore for MemoryTransferLogStore {
    async fn get(&self, tenant_id: &str, call_id: &str) -> Result<Option<TransferLog>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&(tenant_id.to_string(), call_id.to_string()))
            .cloned())
    }

    async fn put(&self, log: &TransferLog) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        rows.insert((log.tenant_id.clone(), log.call_id.clone()), log.clone());
        Ok(())
    }

    async fn update(
        &self,
        tenant_id: &str,
        call_id: &str,
        patch: TransferLogPatch,
    ) -> Result<TransferLog> {
        let mut rows = self.rows.lock().unwrap();
        let log = rows
            .get_mut(&(tenant_id.to_string(), call_id.to_string()))
            .ok_or_else(|| {
                DomainError::NotFound(format!("transfer log for call {}", call_id))
            })?;
        log.apply(patch);
        Ok(log.clone())
    }

    async fn find_by_call_id(&self, call_id: &str) -> Result<Option<TransferLog>> {
        // Cross-tenant scan; acceptable for the fallback backend
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .find(|log| log.call_id == call_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryCallStore {
    rows: Mutex<HashMap<TenantKey, Call>>,
}

impl MemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallStore for MemoryCallStore {
    async fn get(&self, tenant_id: &str, provider_call_id: &str) -> Result<Option<Call>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&(tenant_id.to_string(), provider_call_id.to_string()))
            .cloned())
    }

    async fn upsert(&self, call: &Call) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let key = (call.tenant_id.clone(), call.provider_call_id.clone());
        match rows.get_mut(&key) {
            Some(existing) => existing.apply(CallPatch {
                voice_agent_session_id: call.voice_agent_session_id.clone(),
                ai_phone_number: call.ai_phone_number.clone(),
                caller_number: call.caller_number.clone(),
                selected_agent_key: call.selected_agent_key.clone(),
                status: Some(call.status),
                ended_at: call.ended_at,
            }),
            None => {
                rows.insert(key, call.clone());
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        tenant_id: &str,
        provider_call_id: &str,
        patch: CallPatch,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(call) = rows.get_mut(&(tenant_id.to_string(), provider_call_id.to_string())) {
            call.apply(patch);
        }
        Ok(())
    }

    async fn find_by_call_id(&self, provider_call_id: &str) -> Result<Option<Call>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .find(|call| call.provider_call_id == provider_call_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryNumberStore {
    rows: Mutex<HashMap<String, NumberAssignment>>,
}

impl MemoryNumberStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NumberStore for MemoryNumberStore {
    async fn get(&self, phone_number: &str) -> Result<Option<NumberAssignment>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.get(phone_number).cloned())
    }

    async fn assign(&self, assignment: &NumberAssignment) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        rows.insert(assignment.phone_number.clone(), assignment.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forwarding::{FallbackPolicy, ForwardTarget, RingStrategy};
    use crate::domain::transfer::TransferStatus;

    #[tokio::test]
    async fn test_routing_upsert_merges() {
        let store = MemoryRoutingStore::new();

        store
            .upsert(
                "t1",
                "+14155550000",
                RoutingConfigPatch {
                    timezone: Some("America/New_York".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Second patch touches a different field; timezone must survive
        let merged = store
            .upsert(
                "t1",
                "+14155550000",
                RoutingConfigPatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(merged.timezone, "America/New_York");
        assert!(!merged.enabled);
    }

    #[tokio::test]
    async fn test_stores_are_tenant_partitioned() {
        let store = MemoryForwardStore::new();
        store
            .upsert(
                "tenant-a",
                "+14155550000",
                ForwardPlanPatch {
                    targets: Some(vec![ForwardTarget {
                        to: "+14155550100".to_string(),
                        label: None,
                        priority: 1,
                    }]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Same number under another tenant is a different row
        assert!(store
            .get("tenant-b", "+14155550000")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get("tenant-a", "+14155550000")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_forward_upsert_drops_unusable_targets() {
        let store = MemoryForwardStore::new();
        let plan = store
            .upsert(
                "t1",
                "+14155550000",
                ForwardPlanPatch {
                    targets: Some(vec![
                        ForwardTarget {
                            to: "+14155550100".to_string(),
                            label: None,
                            priority: 1,
                        },
                        ForwardTarget {
                            to: "reception desk".to_string(),
                            label: None,
                            priority: 2,
                        },
                    ]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(plan.targets.len(), 1);
        assert_eq!(plan.targets[0].to, "+14155550100");
    }

    #[tokio::test]
    async fn test_transfer_log_find_by_call_id_across_tenants() {
        let store = MemoryTransferLogStore::new();
        let log = TransferLog::new(
            "tenant-b",
            "CA777",
            TransferStatus::Dialing,
            vec![],
            RingStrategy::Sequential,
            20,
            Some(FallbackPolicy::Voicemail),
        );
        store.put(&log).await.unwrap();

        let found = store.find_by_call_id("CA777").await.unwrap().unwrap();
        assert_eq!(found.tenant_id, "tenant-b");
        assert!(store.find_by_call_id("CA000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transfer_update_is_a_merge() {
        let store = MemoryTransferLogStore::new();
        let log = TransferLog::new(
            "t1",
            "CA1",
            TransferStatus::Dialing,
            vec![],
            RingStrategy::Sequential,
            20,
            Some(FallbackPolicy::Voicemail),
        )
        .with_context(Some("caller asked for billing".to_string()), None, None);
        store.put(&log).await.unwrap();

        let updated = store
            .update(
                "t1",
                "CA1",
                TransferLogPatch {
                    status: Some(TransferStatus::Fallback),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, TransferStatus::Fallback);
        // Untouched fields are preserved, not clobbered
        assert_eq!(updated.summary.as_deref(), Some("caller asked for billing"));
    }

    #[tokio::test]
    async fn test_call_upsert_merges_on_existing() {
        let store = MemoryCallStore::new();
        let call = Call::inbound("t1", "CA1", "+14155550111", "+14155550000");
        store.upsert(&call).await.unwrap();

        // A second upsert for the same call id must not lose fields
        let mut dup = Call::inbound("t1", "CA1", "+14155550111", "+14155550000");
        dup.voice_agent_session_id = Some("sess-1".to_string());
        store.upsert(&dup).await.unwrap();

        let stored = store.get("t1", "CA1").await.unwrap().unwrap();
        assert_eq!(stored.voice_agent_session_id.as_deref(), Some("sess-1"));
        assert_eq!(stored.caller_number.as_deref(), Some("+14155550111"));
    }
}
