//! Forwarding targets and ring behavior
//!
//! A forward plan describes which human numbers ring for an inbound number,
//! in what order, and what happens when nobody answers. Targets are
//! normalized to E.164 before persistence; entries without a usable number
//! are dropped at normalization time and never stored.

use crate::domain::phone::normalize_e164;
use crate::domain::shared::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How forwarding targets are rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RingStrategy {
    /// One target at a time, in priority order. Least disruptive.
    #[default]
    Sequential,
    /// All targets at once; the first non-answer outcome ends the cycle.
    Simultaneous,
}

impl RingStrategy {
    /// Lenient parse for values coming off the wire or out of a store row.
    /// Unknown values resolve to sequential, the safer default.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "simultaneous" => RingStrategy::Simultaneous,
            _ => RingStrategy::Sequential,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RingStrategy::Sequential => "sequential",
            RingStrategy::Simultaneous => "simultaneous",
        }
    }
}

/// Terminal action when every forwarding attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    Voicemail,
    AiCallback,
    Agent,
}

impl FallbackPolicy {
    /// Unknown values yield `None`; the orchestrator resolves that to a
    /// plain hangup rather than failing.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "voicemail" => Some(FallbackPolicy::Voicemail),
            "ai_callback" => Some(FallbackPolicy::AiCallback),
            "agent" => Some(FallbackPolicy::Agent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackPolicy::Voicemail => "voicemail",
            FallbackPolicy::AiCallback => "ai_callback",
            FallbackPolicy::Agent => "agent",
        }
    }
}

/// A single forwarding destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTarget {
    /// E.164 destination number
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Lower value rings earlier
    #[serde(default = "default_target_priority")]
    pub priority: u32,
}

fn default_target_priority() -> u32 {
    100
}

/// Forward plan for one (tenant, inbound number).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardPlan {
    pub tenant_id: String,
    pub phone_number: String,
    pub targets: Vec<ForwardTarget>,
    pub ring_strategy: RingStrategy,
    pub timeout_seconds: u32,
    /// `None` means unconfigured or unrecognized; resolves to hangup.
    pub fallback: Option<FallbackPolicy>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_RING_TIMEOUT_SECONDS: u32 = 20;

impl ForwardPlan {
    pub fn new(tenant_id: &str, phone_number: &str) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.to_string(),
            phone_number: phone_number.to_string(),
            targets: Vec::new(),
            ring_strategy: RingStrategy::Sequential,
            timeout_seconds: DEFAULT_RING_TIMEOUT_SECONDS,
            fallback: Some(FallbackPolicy::Voicemail),
            created_at: now,
            updated_at: now,
        }
    }

    /// Synthesized plan for a tenant that never configured one: a single
    /// target derived from the on-file contact number, voicemail fallback.
    pub fn default_for_contact(
        tenant_id: &str,
        phone_number: &str,
        contact_number: Option<&str>,
        country: &str,
    ) -> Self {
        let mut plan = Self::new(tenant_id, phone_number);
        if let Some(to) = contact_number.and_then(|n| normalize_e164(n, country)) {
            plan.targets.push(ForwardTarget {
                to,
                label: Some("primary contact".to_string()),
                priority: 1,
            });
        }
        plan
    }

    /// Merge a patch into this plan: unset fields keep their value.
    /// Incoming targets are kept only in valid international form; callers
    /// that accept national formats normalize with the tenant's country
    /// before building the patch, and anything still unusable is dropped
    /// here so it is never stored.
    pub fn apply(&mut self, patch: ForwardPlanPatch) {
        if let Some(targets) = patch.targets {
            self.targets = targets
                .into_iter()
                .filter_map(|t| {
                    normalize_e164(&t.to, "").map(|to| ForwardTarget { to, ..t })
                })
                .collect();
        }
        if let Some(ring_strategy) = patch.ring_strategy {
            self.ring_strategy = ring_strategy;
        }
        if let Some(timeout_seconds) = patch.timeout_seconds {
            self.timeout_seconds = timeout_seconds;
        }
        if let Some(fallback) = patch.fallback {
            self.fallback = fallback;
        }
        self.updated_at = Utc::now();
    }

    /// Normalize and order targets for dialing: unusable numbers are
    /// dropped, the rest sorted by priority ascending (stable, so equal
    /// priorities keep their configured order).
    pub fn dial_order(&self, country: &str) -> Vec<ForwardTarget> {
        let mut targets: Vec<ForwardTarget> = self
            .targets
            .iter()
            .filter_map(|t| {
                normalize_e164(&t.to, country).map(|to| ForwardTarget {
                    to,
                    label: t.label.clone(),
                    priority: t.priority,
                })
            })
            .collect();
        targets.sort_by_key(|t| t.priority);
        targets
    }
}

/// Partial update for a forward plan; unset fields are preserved.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardPlanPatch {
    pub targets: Option<Vec<ForwardTarget>>,
    pub ring_strategy: Option<RingStrategy>,
    pub timeout_seconds: Option<u32>,
    pub fallback: Option<Option<FallbackPolicy>>,
}

/// Forward plan store, tenant-partitioned.
///
/// Implementations normalize targets before persisting (see
/// [`ForwardPlan::dial_order`] for the normalization applied) so that
/// unusable entries never reach a stored row.
#[async_trait]
pub trait ForwardStore: Send + Sync {
    async fn get(&self, tenant_id: &str, phone_number: &str) -> Result<Option<ForwardPlan>>;

    /// Merge-on-existing upsert: unset patch fields keep their stored value.
    async fn upsert(
        &self,
        tenant_id: &str,
        phone_number: &str,
        patch: ForwardPlanPatch,
    ) -> Result<ForwardPlan>;
}
