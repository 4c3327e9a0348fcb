//! # Lifecycle Controller
//!
//! Thin orchestration facade the transport layer calls. Each mutating
//! action: (a) validates pre-conditions (ownership, role, territory,
//! state-machine legality), (b) performs the repository write — which is
//! transactional with its audit entry, (c) returns the new entity,
//! (d) publishes a domain event without awaiting subscribers.
//!
//! The controller never performs derived-field writes itself; those
//! belong to the conflict detector, reached asynchronously through the
//! event fabric or a detached task.

use sqlx::PgPool;

use exco_core::{Actor, Error, MoratoriumId, ProjectId, Role};
use exco_db::{
    comments, moratoriums, projects, CommentRecord, DbResult, DeleteOutcome, MoratoriumPatch,
    MoratoriumRecord, NewMoratorium, NewProject, ProjectPatch, ProjectRecord,
};
use exco_state::ProjectState;

use crate::detector::ConflictDetector;
use crate::directory::User;
use crate::events::{DomainEvent, EventBus};

/// Orchestrates authorization, persistence, audit, and event emission.
#[derive(Clone)]
pub struct LifecycleController {
    pool: PgPool,
    bus: EventBus,
    detector: ConflictDetector,
}

impl LifecycleController {
    pub fn new(pool: PgPool, bus: EventBus, detector: ConflictDetector) -> Self {
        Self {
            pool,
            bus,
            detector,
        }
    }

    /// Create a project for the acting user. Conflict analysis runs as a
    /// detached task after the event is published; its derived-field
    /// writes never emit further events.
    pub async fn create_project(
        &self,
        data: NewProject,
        actor: &Actor,
    ) -> DbResult<ProjectRecord> {
        let record = projects::create(&self.pool, data, actor.id).await?;

        self.bus.publish(DomainEvent::ProjectCreated {
            project: record.clone(),
        });

        let detector = self.detector.clone();
        let id = record.id;
        tokio::spawn(async move {
            if let Err(error) = detector.run_for_project(id).await {
                tracing::warn!(project = %id, %error, "post-create conflict detection failed");
            }
        });

        Ok(record)
    }

    /// Partial attribute update. A `state` entry in the patch is treated
    /// as a transition and authorized as such.
    pub async fn update_project(
        &self,
        id: ProjectId,
        patch: ProjectPatch,
        actor: &Actor,
    ) -> DbResult<ProjectRecord> {
        let current = self.load_project(id).await?;

        if let Some(target) = patch.state {
            authorize_transition(actor, &current, target)?;
        } else {
            authorize_attribute_edit(actor, &current)?;
        }

        let updated = projects::update(&self.pool, id, &patch, actor.id)
            .await?
            .ok_or_else(|| Error::not_found("project", id))?;

        self.bus.publish(DomainEvent::ProjectUpdated {
            old: Box::new(current.clone()),
            new: Box::new(updated.clone()),
        });
        if updated.state != current.state {
            self.bus.publish(DomainEvent::ProjectStateChanged {
                project: updated.clone(),
                old_state: current.state,
            });
        }

        Ok(updated)
    }

    /// Drive a lifecycle transition.
    pub async fn change_project_state(
        &self,
        id: ProjectId,
        target: ProjectState,
        actor: &Actor,
    ) -> DbResult<ProjectRecord> {
        let current = self.load_project(id).await?;
        authorize_transition(actor, &current, target)?;

        let updated = projects::change_state(&self.pool, id, target, actor.id).await?;

        self.bus.publish(DomainEvent::ProjectStateChanged {
            project: updated.clone(),
            old_state: current.state,
        });

        Ok(updated)
    }

    /// Delete policy: drafts hard-delete; anything else routes through
    /// the `cancelled` transition (legal only from `approved`).
    pub async fn delete_project(&self, id: ProjectId, actor: &Actor) -> DbResult<DeleteOutcome> {
        let current = self.load_project(id).await?;
        authorize_delete(actor, &current)?;

        let outcome = projects::delete(&self.pool, id, actor.id).await?;

        if let DeleteOutcome::Cancelled(record) = &outcome {
            self.bus.publish(DomainEvent::ProjectStateChanged {
                project: record.clone(),
                old_state: current.state,
            });
        }

        Ok(outcome)
    }

    /// Attach a comment to a project.
    pub async fn add_comment(
        &self,
        project_id: ProjectId,
        actor: &Actor,
        content: &str,
        attachment_url: Option<String>,
    ) -> DbResult<CommentRecord> {
        let project = self.load_project(project_id).await?;
        authorize_participation(actor, &project)?;

        let comment =
            comments::add(&self.pool, project_id, actor.id, content, attachment_url).await?;

        self.bus.publish(DomainEvent::CommentAdded {
            project,
            comment: comment.clone(),
        });

        Ok(comment)
    }

    /// Comments for a project, oldest first.
    pub async fn comments(&self, project_id: ProjectId) -> DbResult<Vec<CommentRecord>> {
        comments::list_for_project(&self.pool, project_id).await
    }

    /// Create a moratorium. Coordinators are held to their territory;
    /// regional admins are unrestricted.
    pub async fn create_moratorium(
        &self,
        data: NewMoratorium,
        actor: &Actor,
    ) -> DbResult<MoratoriumRecord> {
        authorize_moratorium_admin(actor, &data.municipality_code)?;

        let record = moratoriums::create(&self.pool, data, actor.id).await?;

        self.bus.publish(DomainEvent::MoratoriumCreated {
            moratorium: record.clone(),
        });

        Ok(record)
    }

    /// Partial moratorium update under the same territory rules. Moving
    /// the moratorium into another municipality requires authority over
    /// both the current and the target code.
    pub async fn update_moratorium(
        &self,
        id: MoratoriumId,
        patch: MoratoriumPatch,
        actor: &Actor,
    ) -> DbResult<MoratoriumRecord> {
        let current = self.load_moratorium(id).await?;
        authorize_moratorium_admin(actor, &current.municipality_code)?;
        if let Some(target_code) = &patch.municipality_code {
            authorize_moratorium_admin(actor, target_code)?;
        }

        moratoriums::update(&self.pool, id, &patch)
            .await?
            .ok_or_else(|| Error::not_found("moratorium", id).into())
    }

    /// Hard-delete a moratorium.
    pub async fn delete_moratorium(&self, id: MoratoriumId, actor: &Actor) -> DbResult<bool> {
        let current = self.load_moratorium(id).await?;
        authorize_moratorium_admin(actor, &current.municipality_code)?;
        moratoriums::delete(&self.pool, id).await
    }

    /// Pass-through for the external registration flow: fan the new user
    /// out to regional admins.
    pub fn announce_user_registered(&self, user: User) {
        self.bus.publish(DomainEvent::UserRegistered { user });
    }

    async fn load_project(&self, id: ProjectId) -> DbResult<ProjectRecord> {
        projects::get_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| Error::not_found("project", id).into())
    }

    async fn load_moratorium(&self, id: MoratoriumId) -> DbResult<MoratoriumRecord> {
        moratoriums::get_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| Error::not_found("moratorium", id).into())
    }
}

/// May `actor` drive `project` into `target`?
///
/// Approve/reject is a coordinator decision. Territorial coordinators
/// must intersect the project's affected municipalities. Applicants act
/// only on their own projects.
pub(crate) fn authorize_transition(
    actor: &Actor,
    project: &ProjectRecord,
    target: ProjectState,
) -> Result<(), Error> {
    if target.requires_coordinator() && !actor.role.is_coordinating() {
        return Err(Error::Forbidden(format!(
            "only coordinators may move a project to {target}"
        )));
    }

    match actor.role {
        Role::RegionalAdmin => Ok(()),
        Role::MunicipalCoordinator => {
            if actor.territory_intersects(&project.affected_municipalities) {
                Ok(())
            } else {
                Err(Error::Forbidden(
                    "project lies outside the coordinator's territory".to_string(),
                ))
            }
        }
        Role::Applicant => {
            if project.applicant_id == actor.id {
                Ok(())
            } else {
                Err(Error::Forbidden(
                    "applicants may only act on their own projects".to_string(),
                ))
            }
        }
    }
}

/// May `actor` edit `project` attributes? Owners while the project is
/// editable; regional admins while it is not terminal.
pub(crate) fn authorize_attribute_edit(
    actor: &Actor,
    project: &ProjectRecord,
) -> Result<(), Error> {
    match actor.role {
        Role::RegionalAdmin => {
            if project.state.is_terminal() {
                Err(Error::Forbidden(format!(
                    "project in terminal state {} cannot be edited",
                    project.state
                )))
            } else {
                Ok(())
            }
        }
        _ if project.applicant_id == actor.id => {
            if project.state.is_editable() {
                Ok(())
            } else {
                Err(Error::Forbidden(format!(
                    "project in state {} is no longer editable",
                    project.state
                )))
            }
        }
        _ => Err(Error::Forbidden(
            "only the applicant or a regional admin may edit a project".to_string(),
        )),
    }
}

/// May `actor` delete (or cancel) `project`?
pub(crate) fn authorize_delete(actor: &Actor, project: &ProjectRecord) -> Result<(), Error> {
    match actor.role {
        Role::RegionalAdmin => Ok(()),
        Role::MunicipalCoordinator => {
            if actor.territory_intersects(&project.affected_municipalities) {
                Ok(())
            } else {
                Err(Error::Forbidden(
                    "project lies outside the coordinator's territory".to_string(),
                ))
            }
        }
        Role::Applicant => {
            if project.applicant_id == actor.id {
                Ok(())
            } else {
                Err(Error::Forbidden(
                    "applicants may only delete their own projects".to_string(),
                ))
            }
        }
    }
}

/// May `actor` comment on `project`? The applicant and coordinating
/// roles (territory-gated) participate in the discussion.
pub(crate) fn authorize_participation(
    actor: &Actor,
    project: &ProjectRecord,
) -> Result<(), Error> {
    match actor.role {
        Role::RegionalAdmin => Ok(()),
        Role::MunicipalCoordinator => {
            if actor.territory_intersects(&project.affected_municipalities) {
                Ok(())
            } else {
                Err(Error::Forbidden(
                    "project lies outside the coordinator's territory".to_string(),
                ))
            }
        }
        Role::Applicant => {
            if project.applicant_id == actor.id {
                Ok(())
            } else {
                Err(Error::Forbidden(
                    "applicants may only comment on their own projects".to_string(),
                ))
            }
        }
    }
}

/// May `actor` create, edit, or delete a moratorium in `municipality`?
pub(crate) fn authorize_moratorium_admin(actor: &Actor, municipality: &str) -> Result<(), Error> {
    match actor.role {
        Role::RegionalAdmin => Ok(()),
        Role::MunicipalCoordinator => {
            if actor.territories.iter().any(|t| t == municipality) {
                Ok(())
            } else {
                Err(Error::Forbidden(format!(
                    "municipality {municipality} is outside the coordinator's territory"
                )))
            }
        }
        Role::Applicant => Err(Error::Forbidden(
            "only coordinators and regional admins manage moratoriums".to_string(),
        )),
    }
}
