//! PostgreSQL implementation of TransferLogStore
//!
//! The primary table is keyed by (tenant_id, call_id). A small secondary
//! table maps provider call ids back to their tenant so webhooks that carry
//! no tenant context can find their row without a scan; both tables are
//! written in one transaction.

use crate::domain::forwarding::{FallbackPolicy, ForwardTarget, RingStrategy};
use crate::domain::shared::{DomainError, Result};
use crate::domain::transfer::{TransferLog, TransferLogPatch, TransferLogStore, TransferStatus};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error};

pub struct PgTransferLogStore {
    pool: PgPool,
}

impl PgTransferLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "tenant_id, call_id, status, targets, ring_strategy, \
     timeout_seconds, fallback, current_index, summary, reason, agent_key, \
     callback_number, recording_url, created_at, updated_at";

#[async_trait]
impl TransferLogStore for PgTransferLogStore {
    async fn get(&self, tenant_id: &str, call_id: &str) -> Result<Option<TransferLog>> {
        let result = sqlx::query(&format!(
            "SELECT {} FROM transfer_logs WHERE tenant_id = $1 AND call_id = $2",
            SELECT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.map(row_to_log)),
            Err(e) => {
                error!("Failed to get transfer log: {}", e);
                Err(DomainError::StoreUnavailable(format!("transfer_logs: {}", e)))
            }
        }
    }

    async fn put(&self, log: &TransferLog) -> Result<()> {
        let targets_json =
            serde_json::to_value(&log.targets).unwrap_or(serde_json::json!([]));

        let result = async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO transfer_logs
                (tenant_id, call_id, status, targets, ring_strategy, timeout_seconds,
                 fallback, current_index, summary, reason, agent_key,
                 callback_number, recording_url, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (tenant_id, call_id)
                DO UPDATE SET
                    status = $3,
                    targets = $4,
                    ring_strategy = $5,
                    timeout_seconds = $6,
                    fallback = $7,
                    current_index = $8,
                    summary = $9,
                    reason = $10,
                    agent_key = $11,
                    callback_number = $12,
                    recording_url = $13,
                    updated_at = $15
                "#,
            )
            .bind(&log.tenant_id)
            .bind(&log.call_id)
            .bind(log.status.as_str())
            .bind(&targets_json)
            .bind(log.ring_strategy.as_str())
            .bind(log.timeout_seconds as i32)
            .bind(log.fallback.map(|f| f.as_str()))
            .bind(log.current_index as i32)
            .bind(log.summary.as_ref())
            .bind(log.reason.as_ref())
            .bind(log.agent_key.as_ref())
            .bind(log.callback_number.as_ref())
            .bind(log.recording_url.as_ref())
            .bind(log.created_at)
            .bind(log.updated_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO transfer_call_index (call_id, tenant_id)
                VALUES ($1, $2)
                ON CONFLICT (call_id) DO UPDATE SET tenant_id = $2
                "#,
            )
            .bind(&log.call_id)
            .bind(&log.tenant_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await
        }
        .await;

        match result {
            Ok(_) => {
                debug!("Stored transfer log for call {}", log.call_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to store transfer log: {}", e);
                Err(DomainError::StoreUnavailable(format!("transfer_logs: {}", e)))
            }
        }
    }

    async fn update(
        &self,
        tenant_id: &str,
        call_id: &str,
        patch: TransferLogPatch,
    ) -> Result<TransferLog> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE transfer_logs SET
                status = COALESCE($3, status),
                current_index = COALESCE($4, current_index),
                summary = COALESCE($5, summary),
                reason = COALESCE($6, reason),
                agent_key = COALESCE($7, agent_key),
                callback_number = COALESCE($8, callback_number),
                recording_url = COALESCE($9, recording_url),
                updated_at = NOW()
            WHERE tenant_id = $1 AND call_id = $2
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(call_id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.current_index.map(|i| i as i32))
        .bind(patch.summary)
        .bind(patch.reason)
        .bind(patch.agent_key)
        .bind(patch.callback_number)
        .bind(patch.recording_url)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => Ok(row_to_log(row)),
            Ok(None) => Err(DomainError::NotFound(format!(
                "transfer log for call {}",
                call_id
            ))),
            Err(e) => {
                error!("Failed to update transfer log: {}", e);
                Err(DomainError::StoreUnavailable(format!("transfer_logs: {}", e)))
            }
        }
    }

    async fn find_by_call_id(&self, call_id: &str) -> Result<Option<TransferLog>> {
        let result = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM transfer_logs
            WHERE tenant_id = (SELECT tenant_id FROM transfer_call_index WHERE call_id = $1)
              AND call_id = $1
            "#,
            SELECT_COLUMNS
        ))
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.map(row_to_log)),
            Err(e) => {
                error!("Failed to find transfer log by call id: {}", e);
                Err(DomainError::StoreUnavailable(format!("transfer_logs: {}", e)))
            }
        }
    }
}

fn row_to_log(row: sqlx::postgres::PgRow) -> TransferLog {
    let targets_json: serde_json::Value = row.get("targets");
    let targets: Vec<ForwardTarget> = serde_json::from_value(targets_json).unwrap_or_default();

    let status_str: String = row.get("status");
    let strategy_str: String = row.get("ring_strategy");
    let fallback_str: Option<String> = row.get("fallback");

    TransferLog {
        tenant_id: row.get("tenant_id"),
        call_id: row.get("call_id"),
        status: TransferStatus::parse(&status_str),
        targets,
        ring_strategy: RingStrategy::parse(&strategy_str),
        timeout_seconds: row.get::<i32, _>("timeout_seconds") as u32,
        fallback: fallback_str.as_deref().and_then(FallbackPolicy::parse),
        current_index: row.get::<i32, _>("current_index") as u32,
        summary: row.get("summary"),
        reason: row.get("reason"),
        agent_key: row.get("agent_key"),
        callback_number: row.get("callback_number"),
        recording_url: row.get("recording_url"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
