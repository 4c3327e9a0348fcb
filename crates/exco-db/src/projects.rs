//! Project persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `projects` table.
//! Lifecycle transitions are validated at the application layer via
//! [`exco_state::validate_transition`], inside the same transaction that
//! writes the state and its audit entry. Derived columns (`has_conflict`,
//! `conflicting_project_ids`, `affected_municipalities`) are owned by the
//! conflict detector and written only through the mutators at the bottom
//! of this module, which never emit events.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::Postgres;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use exco_core::{DateInterval, Error, Geometry, ProjectId, UserId};
use exco_state::{validate_transition, ProjectState};

use crate::{audit, clamp_page, DbError, DbResult, PageResult};

/// Contact for the contracted excavation firm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorContact {
    /// Contact person.
    pub name: String,
    /// Phone number, free-form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A persisted excavation project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    pub applicant_id: UserId,
    pub contractor_organization: Option<String>,
    pub contractor_contact: Option<ContractorContact>,
    pub state: ProjectState,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub geometry: Geometry,
    pub work_type: String,
    pub work_category: String,
    pub description: Option<String>,
    pub has_conflict: bool,
    pub conflicting_project_ids: Vec<ProjectId>,
    pub affected_municipalities: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    /// The project's work window as a closed interval.
    pub fn interval(&self) -> DateInterval {
        DateInterval {
            start: self.start_date,
            end: self.end_date,
        }
    }
}

/// Input for creating a project.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub contractor_organization: Option<String>,
    pub contractor_contact: Option<ContractorContact>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub geometry: Geometry,
    pub work_type: String,
    pub work_category: String,
    pub description: Option<String>,
    /// Requested initial state; `draft` when absent. Direct submission as
    /// `pending_approval` is the only other permitted value.
    #[serde(default)]
    pub initial_state: Option<ProjectState>,
}

/// Partial update. `None` fields are left unchanged; a `state` entry is
/// validated against the lifecycle table and audited like a transition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub contractor_organization: Option<String>,
    pub contractor_contact: Option<ContractorContact>,
    pub state: Option<ProjectState>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub geometry: Option<Geometry>,
    pub work_type: Option<String>,
    pub work_category: Option<String>,
    pub description: Option<String>,
}

impl ProjectPatch {
    /// Whether the patch touches the footprint or the work window, the
    /// two attribute classes that invalidate prior conflict analysis.
    pub fn touches_geometry_or_dates(&self) -> bool {
        self.geometry.is_some() || self.start_date.is_some() || self.end_date.is_some()
    }
}

/// Filters for the paged project listing. All filters are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub state: Option<ProjectState>,
    /// Single municipality membership (`code = ANY(affected_municipalities)`).
    pub municipality: Option<String>,
    /// Work-window overlap with this closed interval.
    pub date_overlap: Option<DateInterval>,
    pub work_category: Option<String>,
    pub has_conflict: Option<bool>,
    pub applicant_id: Option<UserId>,
    /// Set intersection with `affected_municipalities`.
    pub municipalities_any: Option<Vec<String>>,
}

/// Outcome of the delete policy.
#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    /// The project was in `draft`; the row is gone.
    HardDeleted,
    /// The project was routed through the `cancelled` transition.
    Cancelled(ProjectRecord),
}

/// Column list shared by every SELECT; geometry leaves as GeoJSON text.
const SELECT_COLUMNS: &str = "id, name, applicant_id, contractor_organization, \
     contractor_contact, state, start_date, end_date, \
     ST_AsGeoJSON(geometry) AS geometry, work_type, work_category, \
     description, has_conflict, conflicting_project_ids, \
     affected_municipalities, created_at, updated_at";

/// Insert a new project. Derived fields start false/empty; timestamps are
/// set here so the returned record matches the row exactly.
pub async fn create(
    pool: &PgPool,
    data: NewProject,
    applicant_id: UserId,
) -> DbResult<ProjectRecord> {
    let state = match data.initial_state {
        None => ProjectState::Draft,
        Some(s @ (ProjectState::Draft | ProjectState::PendingApproval)) => s,
        Some(other) => {
            return Err(Error::invalid_input(
                "initial_state",
                format!("projects are created in draft or pending_approval, not {other}"),
            )
            .into())
        }
    };
    let interval = DateInterval::new(data.start_date, data.end_date)?;
    let name = data.name.trim();
    if name.is_empty() {
        return Err(Error::invalid_input("name", "must not be empty").into());
    }

    let now = Utc::now();
    let record = ProjectRecord {
        id: ProjectId::new(),
        name: name.to_string(),
        applicant_id,
        contractor_organization: data.contractor_organization,
        contractor_contact: data.contractor_contact,
        state,
        start_date: interval.start,
        end_date: interval.end,
        geometry: data.geometry,
        work_type: data.work_type,
        work_category: data.work_category,
        description: data.description,
        has_conflict: false,
        conflicting_project_ids: Vec::new(),
        affected_municipalities: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let contact_json = contact_to_json(&record.contractor_contact)?;
    sqlx::query(
        "INSERT INTO projects (id, name, applicant_id, contractor_organization, \
         contractor_contact, state, start_date, end_date, geometry, work_type, \
         work_category, description, has_conflict, conflicting_project_ids, \
         affected_municipalities, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, \
         ST_SetSRID(ST_GeomFromGeoJSON($9), 4326), $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(record.id.as_uuid())
    .bind(&record.name)
    .bind(record.applicant_id.as_uuid())
    .bind(&record.contractor_organization)
    .bind(&contact_json)
    .bind(record.state.as_str())
    .bind(record.start_date)
    .bind(record.end_date)
    .bind(record.geometry.to_json())
    .bind(&record.work_type)
    .bind(&record.work_category)
    .bind(&record.description)
    .bind(record.has_conflict)
    .bind(Vec::<String>::new())
    .bind(&record.affected_municipalities)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(record)
}

/// Fetch a project by id.
pub async fn get_by_id(pool: &PgPool, id: ProjectId) -> DbResult<Option<ProjectRecord>> {
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM projects WHERE id = $1"
    ))
    .bind(id.as_uuid())
    .fetch_optional(pool)
    .await?;

    row.map(ProjectRow::try_into_record).transpose()
}

/// Paged, filtered listing ordered by creation time descending.
/// Returns the total matching count alongside the page slice.
pub async fn list(
    pool: &PgPool,
    filter: &ProjectFilter,
    page: Option<u32>,
    limit: Option<u32>,
) -> DbResult<PageResult<ProjectRecord>> {
    let (page, limit, offset) = clamp_page(page, limit);

    let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM projects WHERE 1=1");
    push_filters(&mut count_query, filter);
    let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

    let mut list_query =
        QueryBuilder::new(format!("SELECT {SELECT_COLUMNS} FROM projects WHERE 1=1"));
    push_filters(&mut list_query, filter);
    list_query.push(" ORDER BY created_at DESC LIMIT ");
    list_query.push_bind(i64::from(limit));
    list_query.push(" OFFSET ");
    list_query.push_bind(offset);

    let rows: Vec<ProjectRow> = list_query.build_query_as().fetch_all(pool).await?;
    let items = rows
        .into_iter()
        .map(ProjectRow::try_into_record)
        .collect::<DbResult<Vec<_>>>()?;

    Ok(PageResult {
        total,
        page,
        limit,
        items,
    })
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &ProjectFilter) {
    if let Some(state) = filter.state {
        query.push(" AND state = ");
        query.push_bind(state.as_str());
    }
    if let Some(code) = &filter.municipality {
        query.push(" AND ");
        query.push_bind(code.clone());
        query.push(" = ANY(affected_municipalities)");
    }
    if let Some(interval) = filter.date_overlap {
        query.push(" AND start_date <= ");
        query.push_bind(interval.end);
        query.push(" AND end_date >= ");
        query.push_bind(interval.start);
    }
    if let Some(category) = &filter.work_category {
        query.push(" AND work_category = ");
        query.push_bind(category.clone());
    }
    if let Some(flag) = filter.has_conflict {
        query.push(" AND has_conflict = ");
        query.push_bind(flag);
    }
    if let Some(applicant) = filter.applicant_id {
        query.push(" AND applicant_id = ");
        query.push_bind(applicant.as_uuid());
    }
    if let Some(codes) = &filter.municipalities_any {
        query.push(" AND affected_municipalities && ");
        query.push_bind(codes.clone());
    }
}

/// Partial update. A `state` entry in the patch walks the lifecycle table
/// and is audited; attribute changes are audited with before/after
/// snapshots of the mutable columns. Returns `Ok(None)` for a missing id.
pub async fn update(
    pool: &PgPool,
    id: ProjectId,
    patch: &ProjectPatch,
    actor_id: UserId,
) -> DbResult<Option<ProjectRecord>> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM projects WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut *tx)
    .await?;
    let Some(current) = current else {
        return Ok(None);
    };
    let current = current.try_into_record()?;

    let mut next = current.clone();
    if let Some(name) = &patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("name", "must not be empty").into());
        }
        next.name = name.to_string();
    }
    if let Some(org) = &patch.contractor_organization {
        next.contractor_organization = Some(org.clone());
    }
    if let Some(contact) = &patch.contractor_contact {
        next.contractor_contact = Some(contact.clone());
    }
    if let Some(start) = patch.start_date {
        next.start_date = start;
    }
    if let Some(end) = patch.end_date {
        next.end_date = end;
    }
    // Re-check ordering over the merged window.
    DateInterval::new(next.start_date, next.end_date)?;
    if let Some(geometry) = &patch.geometry {
        next.geometry = geometry.clone();
    }
    if let Some(work_type) = &patch.work_type {
        next.work_type = work_type.clone();
    }
    if let Some(category) = &patch.work_category {
        next.work_category = category.clone();
    }
    if let Some(description) = &patch.description {
        next.description = Some(description.clone());
    }
    if let Some(state) = patch.state {
        validate_transition(current.state, state)?;
        next.state = state;
    }
    next.updated_at = Utc::now();

    let contact_json = contact_to_json(&next.contractor_contact)?;
    sqlx::query(
        "UPDATE projects SET name = $2, contractor_organization = $3, \
         contractor_contact = $4, state = $5, start_date = $6, end_date = $7, \
         geometry = ST_SetSRID(ST_GeomFromGeoJSON($8), 4326), work_type = $9, \
         work_category = $10, description = $11, updated_at = $12 WHERE id = $1",
    )
    .bind(id.as_uuid())
    .bind(&next.name)
    .bind(&next.contractor_organization)
    .bind(&contact_json)
    .bind(next.state.as_str())
    .bind(next.start_date)
    .bind(next.end_date)
    .bind(next.geometry.to_json())
    .bind(&next.work_type)
    .bind(&next.work_category)
    .bind(&next.description)
    .bind(next.updated_at)
    .execute(&mut *tx)
    .await?;

    let action = if patch.state.is_some() { "state_change" } else { "update" };
    audit::append(
        &mut *tx,
        id.as_uuid(),
        actor_id.as_uuid(),
        action,
        audit_snapshot(&current),
        audit_snapshot(&next),
    )
    .await?;

    tx.commit().await?;
    Ok(Some(next))
}

/// Atomic lifecycle transition: lock the row, validate against the state
/// machine, write the new state, and append the audit entry in the same
/// transaction. A crash between the two writes is not observable.
pub async fn change_state(
    pool: &PgPool,
    id: ProjectId,
    new_state: ProjectState,
    actor_id: UserId,
) -> DbResult<ProjectRecord> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM projects WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| DbError::Domain(Error::not_found("project", id)))?;
    let mut record = row.try_into_record()?;
    let old_state = record.state;

    validate_transition(old_state, new_state)?;

    record.state = new_state;
    record.updated_at = Utc::now();
    sqlx::query("UPDATE projects SET state = $2, updated_at = $3 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(new_state.as_str())
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

    audit::append(
        &mut *tx,
        id.as_uuid(),
        actor_id.as_uuid(),
        "state_change",
        serde_json::json!({ "state": old_state }),
        serde_json::json!({ "state": new_state }),
    )
    .await?;

    tx.commit().await?;
    Ok(record)
}

/// Delete policy: a `draft` row is removed outright; anything else is
/// routed through the `cancelled` transition, so the state machine
/// decides legality (legal from `approved`, rejected elsewhere).
pub async fn delete(pool: &PgPool, id: ProjectId, actor_id: UserId) -> DbResult<DeleteOutcome> {
    let record = get_by_id(pool, id)
        .await?
        .ok_or_else(|| DbError::Domain(Error::not_found("project", id)))?;

    if record.state == ProjectState::Draft {
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id.as_uuid())
            .execute(pool)
            .await?;
        return Ok(DeleteOutcome::HardDeleted);
    }

    let cancelled = change_state(pool, id, ProjectState::Cancelled, actor_id).await?;
    Ok(DeleteOutcome::Cancelled(cancelled))
}

/// Overwrite the conflict flag and peer set. Idempotent; self-references
/// and duplicates are dropped before the write. Never emits events.
pub async fn update_conflict_status(
    pool: &PgPool,
    id: ProjectId,
    has_conflict: bool,
    conflicting: &[ProjectId],
) -> DbResult<()> {
    let mut ids: Vec<String> = Vec::with_capacity(conflicting.len());
    for peer in conflicting {
        let text = peer.to_string();
        if *peer != id && !ids.contains(&text) {
            ids.push(text);
        }
    }

    sqlx::query(
        "UPDATE projects SET has_conflict = $2, conflicting_project_ids = $3, \
         updated_at = $4 WHERE id = $1",
    )
    .bind(id.as_uuid())
    .bind(has_conflict)
    .bind(&ids)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite the affected-municipality membership. Never emits events.
pub async fn update_affected_municipalities(
    pool: &PgPool,
    id: ProjectId,
    codes: &[String],
) -> DbResult<()> {
    sqlx::query(
        "UPDATE projects SET affected_municipalities = $2, updated_at = $3 WHERE id = $1",
    )
    .bind(id.as_uuid())
    .bind(codes)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Append `subject` to `peer`'s conflict set under a row lock, preserving
/// the bidirectional invariant under concurrent detectors. Returns whether
/// the peer row changed.
pub async fn merge_conflict_peer(
    pool: &PgPool,
    peer: ProjectId,
    subject: ProjectId,
) -> DbResult<bool> {
    if peer == subject {
        return Ok(false);
    }
    let mut tx = pool.begin().await?;

    let existing: Option<Vec<String>> = sqlx::query_scalar(
        "SELECT conflicting_project_ids FROM projects WHERE id = $1 FOR UPDATE",
    )
    .bind(peer.as_uuid())
    .fetch_optional(&mut *tx)
    .await?;
    let Some(mut ids) = existing else {
        // Peer vanished between detection and merge; nothing to maintain.
        return Ok(false);
    };

    let subject_text = subject.to_string();
    if ids.contains(&subject_text) {
        // Another detector already linked the pair; keep the flag fresh.
        sqlx::query("UPDATE projects SET has_conflict = true WHERE id = $1")
            .bind(peer.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Ok(false);
    }
    ids.push(subject_text);

    sqlx::query(
        "UPDATE projects SET has_conflict = true, conflicting_project_ids = $2, \
         updated_at = $3 WHERE id = $1",
    )
    .bind(peer.as_uuid())
    .bind(&ids)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

/// Projects in the given states whose geometry lies within `buffer_meters`
/// of the input geometry. Metric distance on the geography cast.
pub async fn find_spatially_intersecting(
    pool: &PgPool,
    geometry: &Geometry,
    buffer_meters: f64,
    states: &[ProjectState],
    exclude: Option<ProjectId>,
) -> DbResult<Vec<ProjectRecord>> {
    let state_names: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
    let rows = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM projects \
         WHERE state = ANY($1) \
           AND ($2::uuid IS NULL OR id <> $2) \
           AND ST_DWithin(geometry::geography, \
                          ST_SetSRID(ST_GeomFromGeoJSON($3), 4326)::geography, $4)",
    ))
    .bind(&state_names)
    .bind(exclude.map(|id| id.as_uuid()))
    .bind(geometry.to_json())
    .bind(buffer_meters)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ProjectRow::try_into_record).collect()
}

/// Projects whose work window overlaps the closed interval.
pub async fn find_temporally_overlapping(
    pool: &PgPool,
    interval: DateInterval,
    exclude: Option<ProjectId>,
) -> DbResult<Vec<ProjectRecord>> {
    let rows = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM projects \
         WHERE start_date <= $1 AND end_date >= $2 \
           AND ($3::uuid IS NULL OR id <> $3)",
    ))
    .bind(interval.end)
    .bind(interval.start)
    .bind(exclude.map(|id| id.as_uuid()))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ProjectRow::try_into_record).collect()
}

/// Projects in `state` with `start_date` exactly on the given day.
/// Deadline-sweep helper.
pub async fn find_in_state_with_start_on(
    pool: &PgPool,
    state: ProjectState,
    day: NaiveDate,
) -> DbResult<Vec<ProjectRecord>> {
    find_by_state_and_date(pool, state, "start_date = $2", day).await
}

/// Projects in `state` with `end_date` exactly on the given day.
pub async fn find_in_state_with_end_on(
    pool: &PgPool,
    state: ProjectState,
    day: NaiveDate,
) -> DbResult<Vec<ProjectRecord>> {
    find_by_state_and_date(pool, state, "end_date = $2", day).await
}

/// Projects in `state` whose `start_date` is strictly before the given day.
pub async fn find_in_state_with_start_before(
    pool: &PgPool,
    state: ProjectState,
    day: NaiveDate,
) -> DbResult<Vec<ProjectRecord>> {
    find_by_state_and_date(pool, state, "start_date < $2", day).await
}

/// Projects in `state` whose `end_date` is strictly before the given day.
pub async fn find_in_state_with_end_before(
    pool: &PgPool,
    state: ProjectState,
    day: NaiveDate,
) -> DbResult<Vec<ProjectRecord>> {
    find_by_state_and_date(pool, state, "end_date < $2", day).await
}

async fn find_by_state_and_date(
    pool: &PgPool,
    state: ProjectState,
    predicate: &str,
    day: NaiveDate,
) -> DbResult<Vec<ProjectRecord>> {
    let rows = sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM projects WHERE state = $1 AND {predicate}"
    ))
    .bind(state.as_str())
    .bind(day)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ProjectRow::try_into_record).collect()
}

fn contact_to_json(contact: &Option<ContractorContact>) -> DbResult<Option<serde_json::Value>> {
    contact
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| DbError::Domain(Error::Internal(format!("contact serialization: {e}"))))
}

/// Mutable-column snapshot for audit before/after entries.
fn audit_snapshot(record: &ProjectRecord) -> serde_json::Value {
    serde_json::json!({
        "name": record.name,
        "state": record.state,
        "start_date": record.start_date,
        "end_date": record.end_date,
        "geometry": record.geometry.as_value(),
        "work_type": record.work_type,
        "work_category": record.work_category,
        "description": record.description,
        "contractor_organization": record.contractor_organization,
    })
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    applicant_id: Uuid,
    contractor_organization: Option<String>,
    contractor_contact: Option<serde_json::Value>,
    state: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    geometry: String,
    work_type: String,
    work_category: String,
    description: Option<String>,
    has_conflict: bool,
    conflicting_project_ids: Vec<String>,
    affected_municipalities: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProjectRow {
    fn try_into_record(self) -> DbResult<ProjectRecord> {
        let state = ProjectState::parse(&self.state).ok_or_else(|| {
            DbError::Domain(Error::Internal(format!(
                "project {} has unknown state {:?}",
                self.id, self.state
            )))
        })?;

        let geometry = Geometry::from_json(&self.geometry).map_err(|e| {
            DbError::Domain(Error::Internal(format!(
                "project {} has unreadable geometry: {e}",
                self.id
            )))
        })?;

        let contractor_contact = self
            .contractor_contact
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| {
                DbError::Domain(Error::Internal(format!(
                    "project {} has unreadable contractor contact: {e}",
                    self.id
                )))
            })?;

        // Conflict peers are stored as text; entries that fail to parse are
        // logged and skipped rather than failing the whole row.
        let conflicting_project_ids = self
            .conflicting_project_ids
            .iter()
            .filter_map(|raw| match Uuid::parse_str(raw) {
                Ok(uuid) => Some(ProjectId::from(uuid)),
                Err(_) => {
                    tracing::warn!(
                        project = %self.id,
                        entry = %raw,
                        "skipping malformed conflict peer id"
                    );
                    None
                }
            })
            .collect();

        Ok(ProjectRecord {
            id: ProjectId::from(self.id),
            name: self.name,
            applicant_id: UserId::from(self.applicant_id),
            contractor_organization: self.contractor_organization,
            contractor_contact,
            state,
            start_date: self.start_date,
            end_date: self.end_date,
            geometry,
            work_type: self.work_type,
            work_category: self.work_category,
            description: self.description,
            has_conflict: self.has_conflict,
            conflicting_project_ids,
            affected_municipalities: self.affected_municipalities,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
