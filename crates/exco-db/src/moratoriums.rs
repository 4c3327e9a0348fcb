//! Moratorium persistence operations.
//!
//! Moratoriums are advisory no-dig windows: time- and space-bounded
//! restrictions created by municipal coordinators. The statutory bound
//! (`valid_to` at most five years after `valid_from`, add-year
//! arithmetic) is enforced on every create and on any update that moves
//! either date. A moratorium in a project's area warns but never blocks:
//! [`check_project_violations`] always reports `can_proceed = true`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::Postgres;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use exco_core::{DateInterval, Error, Geometry, MoratoriumId, UserId};
use exco_state::validate_window;

use crate::{clamp_page, DbError, DbResult, PageResult};

/// A persisted moratorium.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoratoriumRecord {
    pub id: MoratoriumId,
    pub name: String,
    pub geometry: Geometry,
    /// Short reason code (e.g. `"fresh_surface"`).
    pub reason: String,
    /// Free-text elaboration of the reason.
    pub reason_detail: Option<String>,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    /// Free-text carve-outs (emergency repairs, utility connections, ...).
    pub exceptions: Option<String>,
    pub created_by: UserId,
    pub municipality_code: String,
    pub created_at: DateTime<Utc>,
}

impl MoratoriumRecord {
    /// The validity window as a closed interval.
    pub fn window(&self) -> DateInterval {
        DateInterval {
            start: self.valid_from,
            end: self.valid_to,
        }
    }

    /// Human-readable warning line for advisory checks: names the
    /// moratorium, its validity window, and any exceptions.
    pub fn warning_line(&self) -> String {
        let mut line = format!(
            "moratorium {:?} restricts digging from {} to {}",
            self.name, self.valid_from, self.valid_to
        );
        if let Some(exceptions) = &self.exceptions {
            line.push_str(&format!(" (exceptions: {exceptions})"));
        }
        line
    }
}

/// Input for creating a moratorium.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMoratorium {
    pub name: String,
    pub geometry: Geometry,
    pub reason: String,
    pub reason_detail: Option<String>,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub exceptions: Option<String>,
    pub municipality_code: String,
}

/// Partial update. Unknown keys in the incoming JSON are rejected at
/// deserialization, so a typo cannot silently drop a field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoratoriumPatch {
    pub name: Option<String>,
    pub geometry: Option<Geometry>,
    pub reason: Option<String>,
    pub reason_detail: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub exceptions: Option<String>,
    pub municipality_code: Option<String>,
}

impl MoratoriumPatch {
    /// Parse a JSON patch, rejecting unknown keys as invalid input.
    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value)
            .map_err(|e| Error::invalid_input("patch", e.to_string()))
    }
}

/// Filters for the paged moratorium listing. All filters are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct MoratoriumFilter {
    /// Single municipality code.
    pub municipality: Option<String>,
    /// Set of municipality codes (`municipality_code = ANY(..)`).
    pub municipalities_any: Option<Vec<String>>,
    /// Only windows containing this day.
    pub active_as_of: Option<NaiveDate>,
    /// Only windows overlapping this closed interval.
    pub date_overlap: Option<DateInterval>,
    pub created_by: Option<UserId>,
}

/// Result of the advisory pre-creation overlap check.
#[derive(Debug, Clone, Serialize)]
pub struct OverlapValidation {
    pub has_overlap: bool,
    pub overlapping: Vec<MoratoriumRecord>,
    pub warnings: Vec<String>,
}

/// Result of the advisory project check. Moratoriums never block:
/// `can_proceed` is always true.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectViolationCheck {
    pub violations: Vec<MoratoriumRecord>,
    pub warnings: Vec<String>,
    pub can_proceed: bool,
}

/// Counts and summed metric area for one municipality.
#[derive(Debug, Clone, Serialize)]
pub struct MoratoriumStatistics {
    pub total: i64,
    pub active: i64,
    pub expiring_soon: i64,
    /// Summed area of active moratoriums, in square meters.
    pub total_area_m2: f64,
}

/// Horizon used by [`statistics`] for the expiring-soon count.
const EXPIRING_SOON_DAYS: i64 = 30;

const SELECT_COLUMNS: &str = "id, name, ST_AsGeoJSON(geometry) AS geometry, reason, \
     reason_detail, valid_from, valid_to, exceptions, created_by, \
     municipality_code, created_at";

/// Insert a new moratorium, enforcing the five-year validity bound.
pub async fn create(
    pool: &PgPool,
    data: NewMoratorium,
    created_by: UserId,
) -> DbResult<MoratoriumRecord> {
    validate_window(data.valid_from, data.valid_to)?;
    let name = data.name.trim();
    if name.is_empty() {
        return Err(Error::invalid_input("name", "must not be empty").into());
    }

    let record = MoratoriumRecord {
        id: MoratoriumId::new(),
        name: name.to_string(),
        geometry: data.geometry,
        reason: data.reason,
        reason_detail: data.reason_detail,
        valid_from: data.valid_from,
        valid_to: data.valid_to,
        exceptions: data.exceptions,
        created_by,
        municipality_code: data.municipality_code,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO moratoriums (id, name, geometry, reason, reason_detail, \
         valid_from, valid_to, exceptions, created_by, municipality_code, created_at) \
         VALUES ($1, $2, ST_SetSRID(ST_GeomFromGeoJSON($3), 4326), $4, $5, $6, $7, \
         $8, $9, $10, $11)",
    )
    .bind(record.id.as_uuid())
    .bind(&record.name)
    .bind(record.geometry.to_json())
    .bind(&record.reason)
    .bind(&record.reason_detail)
    .bind(record.valid_from)
    .bind(record.valid_to)
    .bind(&record.exceptions)
    .bind(record.created_by.as_uuid())
    .bind(&record.municipality_code)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(record)
}

/// Fetch a moratorium by id.
pub async fn get_by_id(pool: &PgPool, id: MoratoriumId) -> DbResult<Option<MoratoriumRecord>> {
    let row = sqlx::query_as::<_, MoratoriumRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM moratoriums WHERE id = $1"
    ))
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await?;

    row.map(MoratoriumRow::try_into_record).transpose()
}

/// Partial update under a row lock. The validity bound is re-checked over
/// the merged window whenever either date moves. `Ok(None)` for missing.
pub async fn update(
    pool: &PgPool,
    id: MoratoriumId,
    patch: &MoratoriumPatch,
) -> DbResult<Option<MoratoriumRecord>> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, MoratoriumRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM moratoriums WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut *tx)
    .await?;
    let Some(current) = current else {
        return Ok(None);
    };
    let mut next = current.try_into_record()?;

    if let Some(name) = &patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("name", "must not be empty").into());
        }
        next.name = name.to_string();
    }
    if let Some(geometry) = &patch.geometry {
        next.geometry = geometry.clone();
    }
    if let Some(reason) = &patch.reason {
        next.reason = reason.clone();
    }
    if let Some(detail) = &patch.reason_detail {
        next.reason_detail = Some(detail.clone());
    }
    if let Some(exceptions) = &patch.exceptions {
        next.exceptions = Some(exceptions.clone());
    }
    if let Some(code) = &patch.municipality_code {
        next.municipality_code = code.clone();
    }
    if patch.valid_from.is_some() || patch.valid_to.is_some() {
        next.valid_from = patch.valid_from.unwrap_or(next.valid_from);
        next.valid_to = patch.valid_to.unwrap_or(next.valid_to);
        validate_window(next.valid_from, next.valid_to)?;
    }

    sqlx::query(
        "UPDATE moratoriums SET name = $2, \
         geometry = ST_SetSRID(ST_GeomFromGeoJSON($3), 4326), reason = $4, \
         reason_detail = $5, valid_from = $6, valid_to = $7, exceptions = $8, \
         municipality_code = $9 WHERE id = $1",
    )
    .bind(id.as_uuid())
    .bind(&next.name)
    .bind(next.geometry.to_json())
    .bind(&next.reason)
    .bind(&next.reason_detail)
    .bind(next.valid_from)
    .bind(next.valid_to)
    .bind(&next.exceptions)
    .bind(&next.municipality_code)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(next))
}

/// Paged, filtered listing ordered by creation time descending.
pub async fn list(
    pool: &PgPool,
    filter: &MoratoriumFilter,
    page: Option<u32>,
    limit: Option<u32>,
) -> DbResult<PageResult<MoratoriumRecord>> {
    let (page, limit, offset) = clamp_page(page, limit);

    let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM moratoriums WHERE 1=1");
    push_filters(&mut count_query, filter);
    let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

    let mut list_query =
        QueryBuilder::new(format!("SELECT {SELECT_COLUMNS} FROM moratoriums WHERE 1=1"));
    push_filters(&mut list_query, filter);
    list_query.push(" ORDER BY created_at DESC LIMIT ");
    list_query.push_bind(i64::from(limit));
    list_query.push(" OFFSET ");
    list_query.push_bind(offset);

    let rows: Vec<MoratoriumRow> = list_query.build_query_as().fetch_all(pool).await?;
    let items = rows
        .into_iter()
        .map(MoratoriumRow::try_into_record)
        .collect::<DbResult<Vec<_>>>()?;

    Ok(PageResult {
        total,
        page,
        limit,
        items,
    })
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &MoratoriumFilter) {
    if let Some(code) = &filter.municipality {
        query.push(" AND municipality_code = ");
        query.push_bind(code.clone());
    }
    if let Some(codes) = &filter.municipalities_any {
        query.push(" AND municipality_code = ANY(");
        query.push_bind(codes.clone());
        query.push(")");
    }
    if let Some(day) = filter.active_as_of {
        query.push(" AND valid_from <= ");
        query.push_bind(day);
        query.push(" AND valid_to >= ");
        query.push_bind(day);
    }
    if let Some(interval) = filter.date_overlap {
        query.push(" AND valid_from <= ");
        query.push_bind(interval.end);
        query.push(" AND valid_to >= ");
        query.push_bind(interval.start);
    }
    if let Some(creator) = filter.created_by {
        query.push(" AND created_by = ");
        query.push_bind(creator.as_uuid());
    }
}

/// Hard delete. Returns whether a row was removed.
pub async fn delete(pool: &PgPool, id: MoratoriumId) -> DbResult<bool> {
    let result = sqlx::query("DELETE FROM moratoriums WHERE id = $1")
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Moratoriums whose window contains `as_of` (default today) and whose
/// geometry intersects the input.
pub async fn find_active_intersecting(
    pool: &PgPool,
    geometry: &Geometry,
    as_of: Option<NaiveDate>,
) -> DbResult<Vec<MoratoriumRecord>> {
    let day = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let rows = sqlx::query_as::<_, MoratoriumRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM moratoriums \
         WHERE valid_from <= $1 AND valid_to >= $1 \
           AND ST_Intersects(geometry, ST_SetSRID(ST_GeomFromGeoJSON($2), 4326))",
    ))
    .bind(day)
    .bind(geometry.to_json())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(MoratoriumRow::try_into_record).collect()
}

/// Moratoriums violated by a work window over the given footprint:
/// canonical closed-interval overlap (`valid_from <= end AND start <=
/// valid_to`) combined with geometric intersection.
pub async fn check_violations(
    pool: &PgPool,
    geometry: &Geometry,
    start: NaiveDate,
    end: NaiveDate,
) -> DbResult<Vec<MoratoriumRecord>> {
    let rows = sqlx::query_as::<_, MoratoriumRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM moratoriums \
         WHERE valid_from <= $2 AND valid_to >= $1 \
           AND ST_Intersects(geometry, ST_SetSRID(ST_GeomFromGeoJSON($3), 4326))",
    ))
    .bind(start)
    .bind(end)
    .bind(geometry.to_json())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(MoratoriumRow::try_into_record).collect()
}

/// Advisory pre-creation check: would a new moratorium over this
/// geometry/window overlap existing ones in the same municipality?
pub async fn validate_moratorium_overlap(
    pool: &PgPool,
    geometry: &Geometry,
    valid_from: NaiveDate,
    valid_to: NaiveDate,
    municipality_code: &str,
    exclude: Option<MoratoriumId>,
) -> DbResult<OverlapValidation> {
    let rows = sqlx::query_as::<_, MoratoriumRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM moratoriums \
         WHERE municipality_code = $1 \
           AND valid_from <= $3 AND valid_to >= $2 \
           AND ($4::uuid IS NULL OR id <> $4) \
           AND ST_Intersects(geometry, ST_SetSRID(ST_GeomFromGeoJSON($5), 4326))",
    ))
    .bind(municipality_code)
    .bind(valid_from)
    .bind(valid_to)
    .bind(exclude.map(|id| id.as_uuid()))
    .bind(geometry.to_json())
    .fetch_all(pool)
    .await?;

    let overlapping = rows
        .into_iter()
        .map(MoratoriumRow::try_into_record)
        .collect::<DbResult<Vec<_>>>()?;
    let warnings = overlapping
        .iter()
        .map(|m| format!("overlaps existing {}", m.warning_line()))
        .collect();

    Ok(OverlapValidation {
        has_overlap: !overlapping.is_empty(),
        overlapping,
        warnings,
    })
}

/// Active moratoriums within `buffer_meters` of the input geometry: the
/// buffered-intersection query, expressed as a metric distance predicate
/// on the geography cast.
pub async fn get_active_in_area(
    pool: &PgPool,
    geometry: &Geometry,
    buffer_meters: f64,
    as_of: Option<NaiveDate>,
) -> DbResult<Vec<MoratoriumRecord>> {
    let day = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let rows = sqlx::query_as::<_, MoratoriumRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM moratoriums \
         WHERE valid_from <= $1 AND valid_to >= $1 \
           AND ST_DWithin(geometry::geography, \
                          ST_SetSRID(ST_GeomFromGeoJSON($2), 4326)::geography, $3)",
    ))
    .bind(day)
    .bind(geometry.to_json())
    .bind(buffer_meters)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(MoratoriumRow::try_into_record).collect()
}

/// Moratoriums whose `valid_to` falls within `[today, today + days]`,
/// optionally restricted to a municipality set.
pub async fn find_expiring_soon(
    pool: &PgPool,
    days: i64,
    municipality_codes: Option<&[String]>,
) -> DbResult<Vec<MoratoriumRecord>> {
    let today = Utc::now().date_naive();
    let horizon = today + chrono::Days::new(days.max(0) as u64);

    let mut query = QueryBuilder::new(format!(
        "SELECT {SELECT_COLUMNS} FROM moratoriums WHERE valid_to >= "
    ));
    query.push_bind(today);
    query.push(" AND valid_to <= ");
    query.push_bind(horizon);
    if let Some(codes) = municipality_codes {
        query.push(" AND municipality_code = ANY(");
        query.push_bind(codes.to_vec());
        query.push(")");
    }
    query.push(" ORDER BY valid_to");

    let rows: Vec<MoratoriumRow> = query.build_query_as().fetch_all(pool).await?;
    rows.into_iter().map(MoratoriumRow::try_into_record).collect()
}

/// Advisory project check: moratoriums overlapped by the proposed work,
/// rendered as warnings. Never blocks — `can_proceed` is always true.
pub async fn check_project_violations(
    pool: &PgPool,
    geometry: &Geometry,
    start: NaiveDate,
    end: NaiveDate,
    municipality_codes: Option<&[String]>,
) -> DbResult<ProjectViolationCheck> {
    let mut violations = check_violations(pool, geometry, start, end).await?;
    if let Some(codes) = municipality_codes {
        violations.retain(|m| codes.iter().any(|c| *c == m.municipality_code));
    }

    let warnings = violations.iter().map(MoratoriumRecord::warning_line).collect();
    Ok(ProjectViolationCheck {
        violations,
        warnings,
        can_proceed: true,
    })
}

/// Counts and summed active area for one municipality, in one scan.
pub async fn statistics(pool: &PgPool, municipality_code: &str) -> DbResult<MoratoriumStatistics> {
    let today = Utc::now().date_naive();
    let soon = today + chrono::Days::new(EXPIRING_SOON_DAYS as u64);

    let row: (i64, i64, i64, f64) = sqlx::query_as(
        "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE valid_from <= $2 AND valid_to >= $2), \
                COUNT(*) FILTER (WHERE valid_to >= $2 AND valid_to <= $3), \
                COALESCE(SUM(ST_Area(geometry::geography)) \
                         FILTER (WHERE valid_from <= $2 AND valid_to >= $2), 0) \
         FROM moratoriums WHERE municipality_code = $1",
    )
    .bind(municipality_code)
    .bind(today)
    .bind(soon)
    .fetch_one(pool)
    .await?;

    Ok(MoratoriumStatistics {
        total: row.0,
        active: row.1,
        expiring_soon: row.2,
        total_area_m2: row.3,
    })
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct MoratoriumRow {
    id: Uuid,
    name: String,
    geometry: String,
    reason: String,
    reason_detail: Option<String>,
    valid_from: NaiveDate,
    valid_to: NaiveDate,
    exceptions: Option<String>,
    created_by: Uuid,
    municipality_code: String,
    created_at: DateTime<Utc>,
}

impl MoratoriumRow {
    fn try_into_record(self) -> DbResult<MoratoriumRecord> {
        let geometry = Geometry::from_json(&self.geometry).map_err(|e| {
            DbError::Domain(Error::Internal(format!(
                "moratorium {} has unreadable geometry: {e}",
                self.id
            )))
        })?;

        Ok(MoratoriumRecord {
            id: MoratoriumId::from(self.id),
            name: self.name,
            geometry,
            reason: self.reason,
            reason_detail: self.reason_detail,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            exceptions: self.exceptions,
            created_by: UserId::from(self.created_by),
            municipality_code: self.municipality_code,
            created_at: self.created_at,
        })
    }
}
