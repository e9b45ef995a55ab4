//! PostgreSQL implementation of CallStore

use crate::domain::call::{Call, CallPatch, CallStatus, CallStore};
use crate::domain::shared::{DomainError, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error};

pub struct PgCallStore {
    pool: PgPool,
}

impl PgCallStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "tenant_id, provider_call_id, voice_agent_session_id, \
     ai_phone_number, caller_number, selected_agent_key, status, started_at, ended_at";

#[async_trait]
impl CallStore for PgCallStore {
    async fn get(&self, tenant_id: &str, provider_call_id: &str) -> Result<Option<Call>> {
        let result = sqlx::query(&format!(
            "SELECT {} FROM calls WHERE tenant_id = $1 AND provider_call_id = $2",
            SELECT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(provider_call_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.map(row_to_call)),
            Err(e) => {
                error!("Failed to get call: {}", e);
                Err(DomainError::StoreUnavailable(format!("calls: {}", e)))
            }
        }
    }

    async fn upsert(&self, call: &Call) -> Result<()> {
        // Duplicate webhooks land on the same row; merge instead of clobber
        let result = sqlx::query(
            r#"
            INSERT INTO calls
            (tenant_id, provider_call_id, voice_agent_session_id, ai_phone_number,
             caller_number, selected_agent_key, status, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tenant_id, provider_call_id)
            DO UPDATE SET
                voice_agent_session_id = COALESCE(EXCLUDED.voice_agent_session_id, calls.voice_agent_session_id),
                ai_phone_number = COALESCE(EXCLUDED.ai_phone_number, calls.ai_phone_number),
                caller_number = COALESCE(EXCLUDED.caller_number, calls.caller_number),
                selected_agent_key = COALESCE(EXCLUDED.selected_agent_key, calls.selected_agent_key),
                status = EXCLUDED.status,
                ended_at = COALESCE(EXCLUDED.ended_at, calls.ended_at)
            "#,
        )
        .bind(&call.tenant_id)
        .bind(&call.provider_call_id)
        .bind(call.voice_agent_session_id.as_ref())
        .bind(call.ai_phone_number.as_ref())
        .bind(call.caller_number.as_ref())
        .bind(call.selected_agent_key.as_ref())
        .bind(call.status.as_str())
        .bind(call.started_at)
        .bind(call.ended_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Upserted call {}", call.provider_call_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to upsert call: {}", e);
                Err(DomainError::StoreUnavailable(format!("calls: {}", e)))
            }
        }
    }

    async fn update(
        &self,
        tenant_id: &str,
        provider_call_id: &str,
        patch: CallPatch,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE calls SET
                voice_agent_session_id = COALESCE($3, voice_agent_session_id),
                ai_phone_number = COALESCE($4, ai_phone_number),
                caller_number = COALESCE($5, caller_number),
                selected_agent_key = COALESCE($6, selected_agent_key),
                status = COALESCE($7, status),
                ended_at = COALESCE($8, ended_at)
            WHERE tenant_id = $1 AND provider_call_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(provider_call_id)
        .bind(patch.voice_agent_session_id)
        .bind(patch.ai_phone_number)
        .bind(patch.caller_number)
        .bind(patch.selected_agent_key)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.ended_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to update call: {}", e);
                Err(DomainError::StoreUnavailable(format!("calls: {}", e)))
            }
        }
    }

    async fn find_by_call_id(&self, provider_call_id: &str) -> Result<Option<Call>> {
        let result = sqlx::query(&format!(
            "SELECT {} FROM calls WHERE provider_call_id = $1 LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(provider_call_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.map(row_to_call)),
            Err(e) => {
                error!("Failed to find call by provider id: {}", e);
                Err(DomainError::StoreUnavailable(format!("calls: {}", e)))
            }
        }
    }
}

fn row_to_call(row: sqlx::postgres::PgRow) -> Call {
    let status_str: String = row.get("status");

    Call {
        tenant_id: row.get("tenant_id"),
        provider_call_id: row.get("provider_call_id"),
        voice_agent_session_id: row.get("voice_agent_session_id"),
        ai_phone_number: row.get("ai_phone_number"),
        caller_number: row.get("caller_number"),
        selected_agent_key: row.get("selected_agent_key"),
        status: CallStatus::parse(&status_str),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
    }
}
