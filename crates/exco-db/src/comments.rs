//! Project comment persistence.
//!
//! Comments are immutable once created. Content is trimmed and must be
//! non-empty and at most 1000 characters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use exco_core::{CommentId, Error, ProjectId, UserId};

use crate::{DbError, DbResult};

/// Maximum comment length, in characters.
pub const MAX_CONTENT_CHARS: usize = 1000;

/// A persisted project comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: CommentId,
    pub project_id: ProjectId,
    pub author_id: UserId,
    pub content: String,
    pub attachment_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert a comment after validating its content.
pub async fn add(
    pool: &PgPool,
    project_id: ProjectId,
    author_id: UserId,
    content: &str,
    attachment_url: Option<String>,
) -> DbResult<CommentRecord> {
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::invalid_input("content", "must not be empty").into());
    }
    let chars = content.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(Error::invalid_input(
            "content",
            format!("{chars} characters exceeds the {MAX_CONTENT_CHARS} limit"),
        )
        .into());
    }

    let record = CommentRecord {
        id: CommentId::new(),
        project_id,
        author_id,
        content: content.to_string(),
        attachment_url,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO project_comments (id, project_id, author_id, content, \
         attachment_url, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(record.id.as_uuid())
    .bind(record.project_id.as_uuid())
    .bind(record.author_id.as_uuid())
    .bind(&record.content)
    .bind(&record.attachment_url)
    .bind(record.created_at)
    .execute(pool)
    .await
    .map_err(DbError::from)?;

    Ok(record)
}

/// Comments for a project, oldest first.
pub async fn list_for_project(
    pool: &PgPool,
    project_id: ProjectId,
) -> DbResult<Vec<CommentRecord>> {
    let rows = sqlx::query_as::<_, CommentRow>(
        "SELECT id, project_id, author_id, content, attachment_url, created_at \
         FROM project_comments WHERE project_id = $1 ORDER BY created_at ASC",
    )
    .bind(project_id.as_uuid())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CommentRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    project_id: Uuid,
    author_id: Uuid,
    content: String,
    attachment_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl CommentRow {
    fn into_record(self) -> CommentRecord {
        CommentRecord {
            id: CommentId::from(self.id),
            project_id: ProjectId::from(self.project_id),
            author_id: UserId::from(self.author_id),
            content: self.content,
            attachment_url: self.attachment_url,
            created_at: self.created_at,
        }
    }
}
