//! # Notification Dispatcher
//!
//! Subscribes to the domain event stream and fans each event out to its
//! recipients: applicants, the coordinators whose territory intersects
//! the project's affected municipalities, and — for conflicts — the
//! applicants of each peer project. Recipients are deduplicated by user
//! id within one event; each message is handed to the external email
//! queue once, and the queue owns retries.
//!
//! Dispatch failures are logged and never reach the publisher: a broken
//! directory or queue degrades notifications, not writes.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use exco_core::{Role, UserId};
use exco_db::{projects, CommentRecord, MoratoriumRecord, ProjectFilter, ProjectRecord};
use exco_state::ProjectState;

use crate::detector::ConflictDetector;
use crate::directory::{all_users_by_role, EmailMessage, EmailQueue, User, UserDirectory};
use crate::events::{DeadlineKind, DomainEvent, EventSubscriber};

/// One planned notification before dedupe.
struct Outgoing {
    user: User,
    template: &'static str,
    payload: serde_json::Value,
}

/// The dispatcher. Holds the directory and queue boundaries plus a
/// detector handle for re-analysis of geometry/date changes.
pub struct NotificationDispatcher {
    pool: PgPool,
    directory: Arc<dyn UserDirectory>,
    queue: Arc<dyn EmailQueue>,
    detector: ConflictDetector,
}

impl NotificationDispatcher {
    pub fn new(
        pool: PgPool,
        directory: Arc<dyn UserDirectory>,
        queue: Arc<dyn EmailQueue>,
        detector: ConflictDetector,
    ) -> Self {
        Self {
            pool,
            directory,
            queue,
            detector,
        }
    }

    async fn dispatch(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let outgoing = match event {
            DomainEvent::ProjectCreated { project } => self.on_project_created(project).await?,
            DomainEvent::ProjectUpdated { old, new } => self.on_project_updated(old, new).await?,
            DomainEvent::ProjectStateChanged { project, old_state } => {
                self.on_state_changed(project, *old_state).await?
            }
            DomainEvent::CommentAdded { project, comment } => {
                self.on_comment_added(project, comment).await?
            }
            DomainEvent::ConflictsDetected { project, conflicts } => {
                self.on_conflicts_detected(project, conflicts).await?
            }
            DomainEvent::MoratoriumCreated { moratorium } => {
                self.on_moratorium_created(moratorium).await?
            }
            DomainEvent::UserRegistered { user } => self.on_user_registered(user).await?,
            DomainEvent::DeadlineApproaching {
                project,
                days_until,
                kind,
            } => self.on_deadline(project, *days_until, *kind).await?,
        };

        self.enqueue_all(event, outgoing).await;
        Ok(())
    }

    /// Dedupe by user id (first occurrence wins) and hand each message
    /// to the queue. Per-message failures are logged and skipped.
    async fn enqueue_all(&self, event: &DomainEvent, outgoing: Vec<Outgoing>) {
        let mut seen: Vec<UserId> = Vec::with_capacity(outgoing.len());
        for message in outgoing {
            if seen.contains(&message.user.id) {
                continue;
            }
            seen.push(message.user.id);

            let email = EmailMessage {
                recipient_email: message.user.email.clone(),
                template: message.template.to_string(),
                payload: message.payload,
            };
            if let Err(error) = self.queue.enqueue(email).await {
                tracing::warn!(
                    event = event.name(),
                    recipient = %message.user.email,
                    %error,
                    "failed to enqueue notification"
                );
            }
        }
    }

    // ── Per-event recipient resolution ───────────────────────────────

    async fn on_project_created(&self, project: &ProjectRecord) -> anyhow::Result<Vec<Outgoing>> {
        if project.state != ProjectState::PendingApproval {
            return Ok(Vec::new());
        }
        let coordinators = self.coordinators_for(&project.affected_municipalities).await?;
        Ok(coordinators
            .into_iter()
            .map(|user| Outgoing {
                user,
                template: "project_submitted",
                payload: project_payload(project),
            })
            .collect())
    }

    async fn on_project_updated(
        &self,
        old: &ProjectRecord,
        new: &ProjectRecord,
    ) -> anyhow::Result<Vec<Outgoing>> {
        if !geometry_or_dates_changed(old, new)
            || !matches!(new.state, ProjectState::Approved | ProjectState::InProgress)
        {
            return Ok(Vec::new());
        }

        // The footprint or window moved under an approved plan: prior
        // conflict analysis is stale, re-run it off this path.
        let detector = self.detector.clone();
        let id = new.id;
        tokio::spawn(async move {
            if let Err(error) = detector.run_for_project(id).await {
                tracing::warn!(project = %id, %error, "post-update conflict detection failed");
            }
        });

        let coordinators = self.coordinators_for(&new.affected_municipalities).await?;
        Ok(coordinators
            .into_iter()
            .map(|user| Outgoing {
                user,
                template: "project_updated",
                payload: serde_json::json!({
                    "project": project_payload(new),
                    "previous_start_date": old.start_date,
                    "previous_end_date": old.end_date,
                }),
            })
            .collect())
    }

    async fn on_state_changed(
        &self,
        project: &ProjectRecord,
        old_state: ProjectState,
    ) -> anyhow::Result<Vec<Outgoing>> {
        let (template, include_coordinators) = match project.state {
            ProjectState::Approved => ("project_approved", false),
            ProjectState::Rejected => ("project_rejected", false),
            ProjectState::InProgress | ProjectState::Completed => {
                ("project_state_changed", true)
            }
            _ => return Ok(Vec::new()),
        };

        let payload = serde_json::json!({
            "project": project_payload(project),
            "previous_state": old_state,
        });

        let mut outgoing = Vec::new();
        if let Some(applicant) = self.applicant_of(project).await? {
            outgoing.push(Outgoing {
                user: applicant,
                template,
                payload: payload.clone(),
            });
        }
        if include_coordinators {
            for user in self.coordinators_for(&project.affected_municipalities).await? {
                outgoing.push(Outgoing {
                    user,
                    template,
                    payload: payload.clone(),
                });
            }
        }
        Ok(outgoing)
    }

    async fn on_comment_added(
        &self,
        project: &ProjectRecord,
        comment: &CommentRecord,
    ) -> anyhow::Result<Vec<Outgoing>> {
        let payload = serde_json::json!({
            "project": project_payload(project),
            "comment": { "author_id": comment.author_id, "content": comment.content },
        });

        let mut outgoing = Vec::new();
        if let Some(applicant) = self.applicant_of(project).await? {
            outgoing.push(Outgoing {
                user: applicant,
                template: "comment_added",
                payload: payload.clone(),
            });
        }
        for user in self.coordinators_for(&project.affected_municipalities).await? {
            outgoing.push(Outgoing {
                user,
                template: "comment_added",
                payload: payload.clone(),
            });
        }
        // The author already knows.
        outgoing.retain(|o| o.user.id != comment.author_id);
        Ok(outgoing)
    }

    async fn on_conflicts_detected(
        &self,
        project: &ProjectRecord,
        conflicts: &[ProjectRecord],
    ) -> anyhow::Result<Vec<Outgoing>> {
        let subject_payload = serde_json::json!({
            "project": project_payload(project),
            "conflicts": conflicts.iter().map(project_payload).collect::<Vec<_>>(),
        });

        let mut outgoing = Vec::new();
        if let Some(applicant) = self.applicant_of(project).await? {
            outgoing.push(Outgoing {
                user: applicant,
                template: "conflict_detected",
                payload: subject_payload.clone(),
            });
        }
        for user in self.coordinators_for(&project.affected_municipalities).await? {
            outgoing.push(Outgoing {
                user,
                template: "conflict_detected",
                payload: subject_payload.clone(),
            });
        }

        // Each peer's applicant sees their own project as the subject and
        // the new project as the conflict.
        for peer in conflicts {
            if let Some(peer_applicant) = self.applicant_of(peer).await? {
                outgoing.push(Outgoing {
                    user: peer_applicant,
                    template: "conflict_detected",
                    payload: serde_json::json!({
                        "project": project_payload(peer),
                        "conflicts": [project_payload(project)],
                    }),
                });
            }
        }
        Ok(outgoing)
    }

    async fn on_moratorium_created(
        &self,
        moratorium: &MoratoriumRecord,
    ) -> anyhow::Result<Vec<Outgoing>> {
        let payload = serde_json::json!({
            "moratorium": {
                "id": moratorium.id,
                "name": moratorium.name,
                "municipality_code": moratorium.municipality_code,
                "valid_from": moratorium.valid_from,
                "valid_to": moratorium.valid_to,
                "reason": moratorium.reason,
            }
        });
        let code = std::slice::from_ref(&moratorium.municipality_code);

        let mut outgoing = Vec::new();
        for user in self.coordinators_for(code).await? {
            outgoing.push(Outgoing {
                user,
                template: "moratorium_created",
                payload: payload.clone(),
            });
        }
        for user in self.applicants_in_municipality(&moratorium.municipality_code).await? {
            outgoing.push(Outgoing {
                user,
                template: "moratorium_created",
                payload: payload.clone(),
            });
        }
        Ok(outgoing)
    }

    async fn on_user_registered(&self, user: &User) -> anyhow::Result<Vec<Outgoing>> {
        let admins =
            all_users_by_role(&self.directory, Role::RegionalAdmin, true).await?;
        let payload = serde_json::json!({
            "user": { "id": user.id, "email": user.email, "full_name": user.full_name,
                      "role": user.role },
        });
        Ok(admins
            .into_iter()
            .map(|admin| Outgoing {
                user: admin,
                template: "user_registered",
                payload: payload.clone(),
            })
            .collect())
    }

    async fn on_deadline(
        &self,
        project: &ProjectRecord,
        days_until: i64,
        kind: DeadlineKind,
    ) -> anyhow::Result<Vec<Outgoing>> {
        let payload = serde_json::json!({
            "project": project_payload(project),
            "days_until": days_until,
        });

        let mut outgoing = Vec::new();
        if let Some(applicant) = self.applicant_of(project).await? {
            outgoing.push(Outgoing {
                user: applicant,
                template: kind.template(),
                payload: payload.clone(),
            });
        }
        if project.state == ProjectState::Approved {
            for user in self.coordinators_for(&project.affected_municipalities).await? {
                outgoing.push(Outgoing {
                    user,
                    template: kind.template(),
                    payload: payload.clone(),
                });
            }
        }
        Ok(outgoing)
    }

    // ── Recipient helpers ────────────────────────────────────────────

    async fn applicant_of(&self, project: &ProjectRecord) -> anyhow::Result<Option<User>> {
        let user = self.directory.find_user_by_id(project.applicant_id).await?;
        if user.is_none() {
            tracing::warn!(project = %project.id, applicant = %project.applicant_id,
                "applicant not found in directory");
        }
        Ok(user.filter(|u| u.is_active))
    }

    /// Active municipal coordinators whose territory intersects the given
    /// municipality codes. Composed from role and territory queries — no
    /// joins are assumed across the directory boundary.
    async fn coordinators_for<S: AsRef<str>>(&self, codes: &[S]) -> anyhow::Result<Vec<User>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let coordinators =
            all_users_by_role(&self.directory, Role::MunicipalCoordinator, true).await?;

        let mut matching = Vec::new();
        for coordinator in coordinators {
            let territories = self.directory.territories_of(coordinator.id).await?;
            let intersects = codes
                .iter()
                .any(|c| territories.iter().any(|t| t == c.as_ref()));
            if intersects {
                matching.push(coordinator);
            }
        }
        Ok(matching)
    }

    /// Applicants with a live project touching the municipality. Drawn
    /// from the project corpus, since applicants carry no territory.
    async fn applicants_in_municipality(&self, code: &str) -> anyhow::Result<Vec<User>> {
        let filter = ProjectFilter {
            municipality: Some(code.to_string()),
            ..ProjectFilter::default()
        };
        let page = projects::list(&self.pool, &filter, Some(1), Some(100))
            .await
            .map_err(|e| anyhow::anyhow!("project lookup for moratorium fan-out: {e}"))?;
        if page.total > page.items.len() as i64 {
            tracing::warn!(
                municipality = code,
                total = page.total,
                notified = page.items.len(),
                "moratorium fan-out truncated to the first page of projects"
            );
        }

        let mut applicants = Vec::new();
        let mut seen = Vec::new();
        for project in &page.items {
            if project.state.is_terminal() || seen.contains(&project.applicant_id) {
                continue;
            }
            seen.push(project.applicant_id);
            if let Some(user) = self.applicant_of(project).await? {
                applicants.push(user);
            }
        }
        Ok(applicants)
    }
}

#[async_trait]
impl EventSubscriber for NotificationDispatcher {
    fn name(&self) -> &'static str {
        "notification-dispatcher"
    }

    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        self.dispatch(event).await
    }
}

/// Whether an update moved the footprint or the work window.
pub(crate) fn geometry_or_dates_changed(old: &ProjectRecord, new: &ProjectRecord) -> bool {
    old.geometry != new.geometry
        || old.start_date != new.start_date
        || old.end_date != new.end_date
}

/// Common project payload for templates.
fn project_payload(project: &ProjectRecord) -> serde_json::Value {
    serde_json::json!({
        "id": project.id,
        "name": project.name,
        "state": project.state,
        "start_date": project.start_date,
        "end_date": project.end_date,
        "municipalities": project.affected_municipalities,
        "has_conflict": project.has_conflict,
    })
}
