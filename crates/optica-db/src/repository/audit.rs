//! # Audit Log Repository
//!
//! Append-only storage for [`AuditEvent`]s. Written by
//! [`crate::audit::SqliteAuditSink`], read back for entity history views.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use optica_core::{AuditAction, AuditEvent, EntityType};

use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    actor_id: String,
    entity_type: EntityType,
    entity_id: String,
    action_type: AuditAction,
    before_state: Option<String>,
    after_state: Option<String>,
    timestamp: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEvent {
    type Error = DbError;

    fn try_from(row: AuditRow) -> DbResult<Self> {
        let decode = |column: &str, raw: Option<String>| -> DbResult<Option<serde_json::Value>> {
            raw.map(|text| {
                serde_json::from_str(&text).map_err(|e| DbError::Decode {
                    column: column.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
        };

        Ok(AuditEvent {
            before_state: decode("before_state", row.before_state)?,
            after_state: decode("after_state", row.after_state)?,
            id: row.id,
            actor_id: row.actor_id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            action_type: row.action_type,
            timestamp: row.timestamp,
        })
    }
}

/// Repository for the audit log.
#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: SqlitePool,
}

impl AuditLogRepository {
    /// Creates a new AuditLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditLogRepository { pool }
    }

    /// Appends one event.
    pub async fn insert(&self, event: &AuditEvent) -> DbResult<()> {
        let before = event.before_state.as_ref().map(|v| v.to_string());
        let after = event.after_state.as_ref().map(|v| v.to_string());

        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, actor_id, entity_type, entity_id, action_type,
                before_state, after_state, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&event.id)
        .bind(&event.actor_id)
        .bind(event.entity_type)
        .bind(&event.entity_id)
        .bind(event.action_type)
        .bind(before)
        .bind(after)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// History of one entity, oldest first.
    pub async fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> DbResult<Vec<AuditEvent>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, actor_id, entity_type, entity_id, action_type,
                   before_state, after_state, timestamp
            FROM audit_log
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY timestamp, rowid
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }
}
