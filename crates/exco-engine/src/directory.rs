//! # External User-Directory and Email-Queue Interfaces
//!
//! Registration, credentials, and delivery live outside this system. The
//! dispatcher resolves recipients through [`UserDirectory`] and hands
//! finished messages to [`EmailQueue`]; no joins are assumed across
//! either boundary.
//!
//! Two adapters ship here: a Postgres-backed directory reading the
//! `users`/`user_territories` tables the external identity service
//! maintains, and a tracing-backed queue standing in for the external
//! email fabric (which owns retries and delivery).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use exco_core::{Role, UserId};

/// A directory user, as the external identity service describes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
}

/// One page of a role query.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub items: Vec<User>,
    pub total: i64,
}

/// Read-only view of the external user/territory service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up one user.
    async fn find_user_by_id(&self, id: UserId) -> anyhow::Result<Option<User>>;

    /// Users holding a role, paged. `page` is 1-based.
    async fn users_by_role(
        &self,
        role: Role,
        active_only: bool,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<UserPage>;

    /// Municipality codes assigned to a coordinator.
    async fn territories_of(&self, user: UserId) -> anyhow::Result<Vec<String>>;
}

/// Drain every page of a role query.
pub async fn all_users_by_role(
    directory: &Arc<dyn UserDirectory>,
    role: Role,
    active_only: bool,
) -> anyhow::Result<Vec<User>> {
    const PAGE_SIZE: u32 = 100;
    let mut users = Vec::new();
    let mut page = 1;
    loop {
        let batch = directory
            .users_by_role(role, active_only, page, PAGE_SIZE)
            .await?;
        let fetched = batch.items.len();
        users.extend(batch.items);
        if fetched < PAGE_SIZE as usize || users.len() as i64 >= batch.total {
            break;
        }
        page += 1;
    }
    Ok(users)
}

/// A message for the external email fabric.
#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub recipient_email: String,
    /// Template tag the renderer resolves (e.g. `"project_approved"`).
    pub template: String,
    /// Structured payload for the template.
    pub payload: serde_json::Value,
}

/// Hand-off to the external email queue. One attempt per enqueue; the
/// queue owns retries and delivery.
#[async_trait]
pub trait EmailQueue: Send + Sync {
    async fn enqueue(&self, message: EmailMessage) -> anyhow::Result<()>;
}

// ─── Postgres directory adapter ──────────────────────────────────────

/// Directory adapter over the identity service's `users` and
/// `user_territories` tables.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    full_name: String,
    role: String,
    is_active: bool,
}

impl UserRow {
    fn try_into_user(self) -> anyhow::Result<User> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| anyhow::anyhow!("user {} has unknown role {:?}", self.id, self.role))?;
        Ok(User {
            id: UserId::from(self.id),
            email: self.email,
            full_name: self.full_name,
            role,
            is_active: self.is_active,
        })
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, full_name, role, is_active FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::try_into_user).transpose()
    }

    async fn users_by_role(
        &self,
        role: Role,
        active_only: bool,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<UserPage> {
        let limit = i64::from(limit.clamp(1, 500));
        let offset = i64::from(page.max(1) - 1) * limit;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE role = $1 AND (NOT $2 OR is_active)",
        )
        .bind(role.as_str())
        .bind(active_only)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, full_name, role, is_active FROM users \
             WHERE role = $1 AND (NOT $2 OR is_active) \
             ORDER BY email LIMIT $3 OFFSET $4",
        )
        .bind(role.as_str())
        .bind(active_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(UserRow::try_into_user)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(UserPage { items, total })
    }

    async fn territories_of(&self, user: UserId) -> anyhow::Result<Vec<String>> {
        let codes = sqlx::query_scalar(
            "SELECT municipality_code FROM user_territories \
             WHERE user_id = $1 ORDER BY municipality_code",
        )
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }
}

// ─── Tracing email-queue adapter ─────────────────────────────────────

/// Stand-in for the external email fabric: logs every hand-off. Useful
/// for the operator CLI and for deployments where the real queue is
/// wired in at the transport layer.
#[derive(Debug, Default, Clone)]
pub struct TracingEmailQueue;

#[async_trait]
impl EmailQueue for TracingEmailQueue {
    async fn enqueue(&self, message: EmailMessage) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %message.recipient_email,
            template = %message.template,
            "enqueued notification"
        );
        Ok(())
    }
}
