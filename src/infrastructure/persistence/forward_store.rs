//! PostgreSQL implementation of ForwardStore

use crate::domain::forwarding::{
    FallbackPolicy, ForwardPlan, ForwardPlanPatch, ForwardStore, ForwardTarget, RingStrategy,
    DEFAULT_RING_TIMEOUT_SECONDS,
};
use crate::domain::phone::normalize_e164;
use crate::domain::shared::{DomainError, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error};

pub struct PgForwardStore {
    pool: PgPool,
}

impl PgForwardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ForwardStore for PgForwardStore {
    async fn get(&self, tenant_id: &str, phone_number: &str) -> Result<Option<ForwardPlan>> {
        let result = sqlx::query(
            r#"
            SELECT tenant_id, phone_number, targets, ring_strategy, timeout_seconds,
                   fallback, created_at, updated_at
            FROM forward_plans
            WHERE tenant_id = $1 AND phone_number = $2
            "#,
        )
        .bind(tenant_id)
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.map(row_to_plan)),
            Err(e) => {
                error!("Failed to get forward plan: {}", e);
                Err(DomainError::StoreUnavailable(format!("forward_plans: {}", e)))
            }
        }
    }

    async fn upsert(
        &self,
        tenant_id: &str,
        phone_number: &str,
        patch: ForwardPlanPatch,
    ) -> Result<ForwardPlan> {
        // Unusable target numbers are dropped here, never stored
        let targets_json = patch.targets.map(|targets| {
            let kept: Vec<ForwardTarget> = targets
                .into_iter()
                .filter_map(|t| normalize_e164(&t.to, "").map(|to| ForwardTarget { to, ..t }))
                .collect();
            serde_json::to_value(kept).unwrap_or(serde_json::json!([]))
        });
        let fallback_present = patch.fallback.is_some();
        let fallback_value: Option<String> = patch
            .fallback
            .flatten()
            .map(|f| f.as_str().to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO forward_plans
            (tenant_id, phone_number, targets, ring_strategy, timeout_seconds,
             fallback, created_at, updated_at)
            VALUES ($1, $2, COALESCE($3, '[]'::jsonb), COALESCE($4, 'sequential'),
                    COALESCE($5, $8), CASE WHEN $6 THEN $7 ELSE 'voicemail' END,
                    NOW(), NOW())
            ON CONFLICT (tenant_id, phone_number)
            DO UPDATE SET
                targets = COALESCE($3, forward_plans.targets),
                ring_strategy = COALESCE($4, forward_plans.ring_strategy),
                timeout_seconds = COALESCE($5, forward_plans.timeout_seconds),
                fallback = CASE WHEN $6 THEN $7 ELSE forward_plans.fallback END,
                updated_at = NOW()
            RETURNING tenant_id, phone_number, targets, ring_strategy, timeout_seconds,
                      fallback, created_at, updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(phone_number)
        .bind(targets_json)
        .bind(patch.ring_strategy.map(|s| s.as_str().to_string()))
        .bind(patch.timeout_seconds.map(|t| t as i32))
        .bind(fallback_present)
        .bind(fallback_value)
        .bind(DEFAULT_RING_TIMEOUT_SECONDS as i32)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => {
                debug!("Upserted forward plan for {}/{}", tenant_id, phone_number);
                Ok(row_to_plan(row))
            }
            Err(e) => {
                error!("Failed to upsert forward plan: {}", e);
                Err(DomainError::StoreUnavailable(format!("forward_plans: {}", e)))
            }
        }
    }
}

fn row_to_plan(row: sqlx::postgres::PgRow) -> ForwardPlan {
    let targets_json: serde_json::Value = row.get("targets");
    let targets: Vec<ForwardTarget> = serde_json::from_value(targets_json).unwrap_or_default();

    let strategy_str: String = row.get("ring_strategy");
    let fallback_str: Option<String> = row.get("fallback");

    ForwardPlan {
        tenant_id: row.get("tenant_id"),
        phone_number: row.get("phone_number"),
        targets,
        // Unknown stored values resolve to the conservative defaults
        ring_strategy: RingStrategy::parse(&strategy_str),
        timeout_seconds: row.get::<i32, _>("timeout_seconds") as u32,
        fallback: fallback_str.as_deref().and_then(FallbackPolicy::parse),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
