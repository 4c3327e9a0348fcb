//! Audit log persistence — append-only.
//!
//! Every lifecycle transition and attribute change appends a row with
//! before/after snapshots. Rows are never updated or deleted. The append
//! is generic over the executor so callers can write inside the same
//! transaction as the change being recorded.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::DbResult;

/// A persisted audit entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Append an audit entry. Pass a transaction to make the append atomic
/// with the change it records.
pub async fn append<'e, E: PgExecutor<'e>>(
    executor: E,
    entity_id: Uuid,
    actor_id: Uuid,
    action: &str,
    before: serde_json::Value,
    after: serde_json::Value,
) -> DbResult<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO audit_logs (id, entity_id, actor_id, action, before, after, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(entity_id)
    .bind(actor_id)
    .bind(action)
    .bind(&before)
    .bind(&after)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(id)
}

/// Entries for one entity, oldest first. Used by export tooling; the
/// write path never reads the log.
pub async fn entries_for_entity(
    pool: &sqlx::PgPool,
    entity_id: Uuid,
) -> DbResult<Vec<AuditEntry>> {
    let entries = sqlx::query_as::<_, AuditEntry>(
        "SELECT id, entity_id, actor_id, action, before, after, created_at \
         FROM audit_logs WHERE entity_id = $1 ORDER BY created_at ASC",
    )
    .bind(entity_id)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}
