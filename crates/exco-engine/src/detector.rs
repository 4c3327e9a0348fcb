//! # Conflict Detector
//!
//! Classifies a footprint and work window against the existing corpus:
//! nearby projects in decision-relevant states and moratoriums whose
//! windows overlap the work. Owns no persistent state of its own — it
//! reads both repositories and writes only through the derived-field
//! mutators, which never emit further events (that is what breaks the
//! controller → event → detector cycle).
//!
//! ## Consistency
//!
//! Updates to the subject and to conflicting peers are single-row writes,
//! not a global transaction. Peer-set mutations go through a row-locked
//! read-modify-write with dedupe, so concurrent detectors on the same
//! pair converge instead of losing appends.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::task::JoinSet;

use exco_core::{DateInterval, Error, Geometry, ProjectId};
use exco_db::{moratoriums, municipalities, projects, MoratoriumRecord, ProjectRecord};
use exco_state::ProjectState;

use crate::events::{DomainEvent, EventBus};

/// Metric adjacency threshold: footprints within this distance are
/// spatial conflicts.
pub const ADJACENCY_BUFFER_METERS: f64 = 20.0;

/// Soft latency budget for one detection. Exceeding it logs a warning
/// but never fails the request.
const SOFT_BUDGET: Duration = Duration::from_secs(10);

/// Maximum concurrent detections in batch mode.
const BATCH_WAVE: usize = 5;

/// Project states that participate in conflict classification.
const CANDIDATE_STATES: [ProjectState; 3] = [
    ProjectState::Approved,
    ProjectState::InProgress,
    ProjectState::PendingApproval,
];

/// Result of classifying one footprint and work window.
///
/// `temporal_conflicts` is the time-overlapping subset of
/// `spatial_conflicts` — the same entities filtered further, not a
/// disjoint set.
#[derive(Debug, Clone)]
pub struct ConflictDetection {
    pub has_conflict: bool,
    pub spatial_conflicts: Vec<ProjectRecord>,
    pub temporal_conflicts: Vec<ProjectRecord>,
    pub moratorium_violations: Vec<MoratoriumRecord>,
}

/// The detector. Cheap to clone; clones share the pool and bus.
#[derive(Clone)]
pub struct ConflictDetector {
    pool: PgPool,
    bus: EventBus,
}

impl ConflictDetector {
    pub fn new(pool: PgPool, bus: EventBus) -> Self {
        Self { pool, bus }
    }

    /// Classify a geometry and work window against the corpus.
    ///
    /// The spatial-candidate query and the moratorium-violation query run
    /// concurrently and are joined.
    pub async fn detect(
        &self,
        geometry: &Geometry,
        interval: DateInterval,
        exclude: Option<ProjectId>,
    ) -> Result<ConflictDetection, Error> {
        let started = Instant::now();

        let spatial_query = projects::find_spatially_intersecting(
            &self.pool,
            geometry,
            ADJACENCY_BUFFER_METERS,
            &CANDIDATE_STATES,
            exclude,
        );
        let violation_query =
            moratoriums::check_violations(&self.pool, geometry, interval.start, interval.end);

        let (spatial_conflicts, moratorium_violations) =
            tokio::try_join!(spatial_query, violation_query)
                .map_err(|e| Error::ConflictDetection(e.to_string()))?;

        let temporal_conflicts = temporal_subset(&spatial_conflicts, interval);
        let has_conflict = !spatial_conflicts.is_empty() || !moratorium_violations.is_empty();

        let elapsed = started.elapsed();
        if elapsed > SOFT_BUDGET {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "conflict detection exceeded its soft latency budget"
            );
        }

        Ok(ConflictDetection {
            has_conflict,
            spatial_conflicts,
            temporal_conflicts,
            moratorium_violations,
        })
    }

    /// Run detection for a stored project and propagate derived state:
    /// the subject's conflict flag and peer set, the reverse edges on
    /// each peer, and the affected-municipality membership. Emits
    /// `ConflictsDetected` when a conflict exists.
    pub async fn run_for_project(&self, id: ProjectId) -> Result<ConflictDetection, Error> {
        let project = projects::get_by_id(&self.pool, id)
            .await
            .map_err(|e| Error::ConflictDetection(e.to_string()))?
            .ok_or_else(|| Error::not_found("project", id))?;

        let detection = self
            .detect(&project.geometry, project.interval(), Some(id))
            .await?;

        let peer_ids: Vec<ProjectId> =
            detection.spatial_conflicts.iter().map(|p| p.id).collect();

        projects::update_conflict_status(&self.pool, id, detection.has_conflict, &peer_ids)
            .await
            .map_err(|e| Error::ConflictDetection(e.to_string()))?;

        // Reverse edges. Each peer is its own row-locked write; a failure
        // on one peer leaves that edge stale but never poisons the rest.
        for peer in &peer_ids {
            if let Err(error) = projects::merge_conflict_peer(&self.pool, *peer, id).await {
                tracing::warn!(project = %id, peer = %peer, %error,
                    "failed to maintain reverse conflict edge");
            }
        }

        // Affected municipalities are best-effort: a failure leaves the
        // previous membership in place.
        match municipalities::codes_intersecting(&self.pool, &project.geometry).await {
            Ok(codes) => {
                if let Err(error) =
                    projects::update_affected_municipalities(&self.pool, id, &codes).await
                {
                    tracing::warn!(project = %id, %error,
                        "failed to write affected municipalities");
                }
            }
            Err(error) => {
                tracing::warn!(project = %id, %error,
                    "municipality detection failed; membership left stale");
            }
        }

        if detection.has_conflict {
            // Re-read the subject so the event carries fresh derived fields.
            let subject = projects::get_by_id(&self.pool, id)
                .await
                .ok()
                .flatten()
                .unwrap_or(project);
            self.bus.publish(DomainEvent::ConflictsDetected {
                project: subject,
                conflicts: unique_conflicts(&detection),
            });
        }

        Ok(detection)
    }

    /// Detect for many projects, at most [`BATCH_WAVE`] concurrently.
    /// Per-project failures are logged and omitted from the result map.
    pub async fn run_batch(
        &self,
        ids: &[ProjectId],
    ) -> HashMap<ProjectId, ConflictDetection> {
        let mut results = HashMap::with_capacity(ids.len());

        for wave in ids.chunks(BATCH_WAVE) {
            let mut join_set = JoinSet::new();
            for &id in wave {
                let detector = self.clone();
                join_set.spawn(async move { (id, detector.run_for_project(id).await) });
            }
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((id, Ok(detection))) => {
                        results.insert(id, detection);
                    }
                    Ok((id, Err(error))) => {
                        tracing::warn!(project = %id, %error, "batch detection entry failed");
                    }
                    Err(error) => {
                        tracing::warn!(%error, "batch detection task panicked");
                    }
                }
            }
        }

        results
    }
}

/// The subset of spatial candidates whose work window overlaps the
/// subject's. Closed-interval arithmetic, shared with the repositories.
fn temporal_subset(candidates: &[ProjectRecord], interval: DateInterval) -> Vec<ProjectRecord> {
    candidates
        .iter()
        .filter(|p| p.interval().overlaps(&interval))
        .cloned()
        .collect()
}

/// Spatial and temporal conflicts merged, deduplicated by id, order
/// preserved. Temporal conflicts are a subset of spatial ones, so this
/// is usually the spatial list — but clients must not rely on that.
fn unique_conflicts(detection: &ConflictDetection) -> Vec<ProjectRecord> {
    let mut seen = Vec::new();
    let mut merged = Vec::new();
    for record in detection
        .spatial_conflicts
        .iter()
        .chain(detection.temporal_conflicts.iter())
    {
        if !seen.contains(&record.id) {
            seen.push(record.id);
            merged.push(record.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use exco_core::UserId;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn project_between(start: &str, end: &str) -> ProjectRecord {
        ProjectRecord {
            id: ProjectId::new(),
            name: "test".to_string(),
            applicant_id: UserId::new(),
            contractor_organization: None,
            contractor_contact: None,
            state: ProjectState::Approved,
            start_date: d(start),
            end_date: d(end),
            geometry: Geometry::point(14.4378, 50.0755),
            work_type: "sewer".to_string(),
            work_category: "repair".to_string(),
            description: None,
            has_conflict: false,
            conflicting_project_ids: Vec::new(),
            affected_municipalities: Vec::new(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn temporal_subset_filters_by_overlap() {
        let overlapping = project_between("2024-02-01", "2024-02-20");
        let touching = project_between("2024-02-25", "2024-03-10");
        let disjoint = project_between("2024-05-01", "2024-05-10");
        let candidates = vec![overlapping.clone(), touching.clone(), disjoint];

        let interval = DateInterval::new(d("2024-02-10"), d("2024-02-25")).unwrap();
        let subset = temporal_subset(&candidates, interval);

        let ids: Vec<_> = subset.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![overlapping.id, touching.id]);
    }

    #[test]
    fn temporal_subset_is_a_subset_of_spatial() {
        let a = project_between("2024-02-01", "2024-02-20");
        let candidates = vec![a];
        let interval = DateInterval::new(d("2024-02-10"), d("2024-02-25")).unwrap();
        let subset = temporal_subset(&candidates, interval);
        for record in &subset {
            assert!(candidates_contains(&candidates, record.id));
        }
    }

    fn candidates_contains(candidates: &[ProjectRecord], id: ProjectId) -> bool {
        candidates.iter().any(|p| p.id == id)
    }

    #[test]
    fn unique_conflicts_dedupes_across_lists() {
        let shared = project_between("2024-02-01", "2024-02-20");
        let spatial_only = project_between("2024-06-01", "2024-06-10");
        let detection = ConflictDetection {
            has_conflict: true,
            spatial_conflicts: vec![shared.clone(), spatial_only.clone()],
            temporal_conflicts: vec![shared.clone()],
            moratorium_violations: Vec::new(),
        };

        let merged = unique_conflicts(&detection);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, shared.id);
        assert_eq!(merged[1].id, spatial_only.id);
    }
}
