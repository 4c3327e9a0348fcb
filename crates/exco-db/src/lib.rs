//! # exco-db — PostgreSQL/PostGIS Persistence
//!
//! Module-per-table persistence for the coordination core. All functions
//! take a `&PgPool` (or a transaction/executor where atomicity matters)
//! and operate on raw SQL with bound parameters. State-machine and
//! validity constraints are enforced at the application layer, inside the
//! same transaction as the write they guard.
//!
//! ## Spatial store contract
//!
//! Geometries are exchanged as GeoJSON in WGS84 and stored as PostGIS
//! `geometry(4326)`. Every metric predicate (`ST_DWithin`, `ST_Area`)
//! runs on a `::geography` cast so distances and areas are in meters.
//! This crate computes no geometry itself.
//!
//! ## Modules
//!
//! - [`projects`] — project rows, filtered listing, lifecycle transitions
//!   with in-transaction audit, derived-field mutators, spatial/temporal
//!   candidate queries.
//! - [`moratoriums`] — no-dig windows with the 5-year bound, violation
//!   and expiry queries, advisory project checks, statistics.
//! - [`audit`] — append-only before/after snapshots.
//! - [`comments`] — project discussion threads.
//! - [`municipalities`] — footprint membership, degrading to the empty
//!   set when the boundary table is not installed.

pub mod audit;
pub mod comments;
pub mod moratoriums;
pub mod municipalities;
pub mod projects;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

pub use audit::AuditEntry;
pub use comments::CommentRecord;
pub use moratoriums::{
    MoratoriumFilter, MoratoriumPatch, MoratoriumRecord, MoratoriumStatistics, NewMoratorium,
    OverlapValidation, ProjectViolationCheck,
};
pub use projects::{
    ContractorContact, DeleteOutcome, NewProject, ProjectFilter, ProjectPatch, ProjectRecord,
};

/// Persistence-layer error: either the database failed or a domain rule
/// was violated while validating inside the write path.
#[derive(Error, Debug)]
pub enum DbError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Domain rule violated (validation, state machine, duration bound).
    #[error(transparent)]
    Domain(#[from] exco_core::Error),
}

impl From<exco_state::TransitionError> for DbError {
    fn from(err: exco_state::TransitionError) -> Self {
        Self::Domain(err.into())
    }
}

/// Result alias for persistence operations.
pub type DbResult<T> = Result<T, DbError>;

/// One page of a filtered listing, with the unfiltered total.
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    /// Total rows matching the filter, ignoring pagination.
    pub total: i64,
    /// 1-based page number actually served.
    pub page: u32,
    /// Page size actually served.
    pub limit: u32,
    /// The page slice, ordered by creation time descending.
    pub items: Vec<T>,
}

/// Hard cap and default for page sizes.
pub const MAX_PAGE_LIMIT: u32 = 100;
/// Default page size when the caller does not specify one.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Clamp caller-supplied pagination to `(page, limit, offset)`.
pub(crate) fn clamp_page(page: Option<u32>, limit: Option<u32>) -> (u32, u32, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = i64::from(page - 1) * i64::from(limit);
    (page, limit, offset)
}

/// Initialize the connection pool and run embedded migrations.
///
/// Reads `DATABASE_URL`; the spatial store is not optional for this
/// system, so a missing URL is an error rather than a degraded mode.
pub async fn init_pool() -> Result<PgPool, DbError> {
    let url = std::env::var("DATABASE_URL").map_err(|_| {
        DbError::Domain(exco_core::Error::Internal(
            "DATABASE_URL is not set".to_string(),
        ))
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| DbError::Sqlx(sqlx::Error::Migrate(Box::new(e))))?;
    tracing::info!("database migrations applied");

    Ok(pool)
}
