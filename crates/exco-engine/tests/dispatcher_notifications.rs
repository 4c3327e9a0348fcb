//! Notification dispatcher behavior against mock directory and queue
//! boundaries: recipient tables, dedupe by user id, author exclusion,
//! and the per-peer conflict payloads.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;

use exco_core::{Geometry, ProjectId, Role, UserId};
use exco_db::{CommentRecord, ProjectRecord};
use exco_engine::{
    ConflictDetector, DeadlineKind, DomainEvent, EmailMessage, EmailQueue, EventBus,
    EventSubscriber, NotificationDispatcher, User, UserDirectory,
};
use exco_state::ProjectState;

// ─── Mock boundaries ─────────────────────────────────────────────────

struct StaticDirectory {
    users: Vec<User>,
    territories: HashMap<UserId, Vec<String>>,
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn find_user_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok(self.users.iter().find(|u| u.id == id).cloned())
    }

    async fn users_by_role(
        &self,
        role: Role,
        active_only: bool,
        page: u32,
        limit: u32,
    ) -> anyhow::Result<exco_engine::directory::UserPage> {
        let matching: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.role == role && (!active_only || u.is_active))
            .cloned()
            .collect();
        let total = matching.len() as i64;
        let start = ((page.max(1) - 1) * limit) as usize;
        let items = matching
            .into_iter()
            .skip(start)
            .take(limit as usize)
            .collect();
        Ok(exco_engine::directory::UserPage { items, total })
    }

    async fn territories_of(&self, user: UserId) -> anyhow::Result<Vec<String>> {
        Ok(self.territories.get(&user).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingQueue {
    messages: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl EmailQueue for RecordingQueue {
    async fn enqueue(&self, message: EmailMessage) -> anyhow::Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn user(role: Role, email: &str) -> User {
    User {
        id: UserId::new(),
        email: email.to_string(),
        full_name: email.to_string(),
        role,
        is_active: true,
    }
}

fn project(
    applicant: UserId,
    state: ProjectState,
    municipalities: &[&str],
) -> ProjectRecord {
    ProjectRecord {
        id: ProjectId::new(),
        name: "gas main renewal".to_string(),
        applicant_id: applicant,
        contractor_organization: None,
        contractor_contact: None,
        state,
        start_date: d("2024-01-15"),
        end_date: d("2024-02-15"),
        geometry: Geometry::point(14.4378, 50.0755),
        work_type: "gas".to_string(),
        work_category: "renewal".to_string(),
        description: None,
        has_conflict: false,
        conflicting_project_ids: Vec::new(),
        affected_municipalities: municipalities.iter().map(|c| c.to_string()).collect(),
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    }
}

struct Harness {
    dispatcher: NotificationDispatcher,
    queue: Arc<RecordingQueue>,
}

fn harness(users: Vec<User>, territories: HashMap<UserId, Vec<String>>) -> Harness {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/never-connected")
        .unwrap();
    let bus = EventBus::start(1);
    let detector = ConflictDetector::new(pool.clone(), bus);
    let directory = Arc::new(StaticDirectory { users, territories });
    let queue = Arc::new(RecordingQueue::default());
    let queue_boundary: Arc<dyn EmailQueue> = queue.clone();
    let dispatcher = NotificationDispatcher::new(pool, directory, queue_boundary, detector);
    Harness { dispatcher, queue }
}

fn recipients(queue: &RecordingQueue) -> Vec<String> {
    queue.messages.lock().iter().map(|m| m.recipient_email.clone()).collect()
}

// ─── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn submitted_project_notifies_territorial_coordinators_only() {
    let applicant = user(Role::Applicant, "applicant@example.org");
    let inside = user(Role::MunicipalCoordinator, "inside@example.org");
    let outside = user(Role::MunicipalCoordinator, "outside@example.org");
    let territories = HashMap::from([
        (inside.id, vec!["CZ0100".to_string()]),
        (outside.id, vec!["CZ0999".to_string()]),
    ]);
    let subject = project(applicant.id, ProjectState::PendingApproval, &["CZ0100"]);

    let h = harness(vec![applicant, inside, outside], territories);
    h.dispatcher
        .handle(&DomainEvent::ProjectCreated { project: subject })
        .await
        .unwrap();

    assert_eq!(recipients(&h.queue), ["inside@example.org"]);
    assert_eq!(h.queue.messages.lock()[0].template, "project_submitted");
}

#[tokio::test]
async fn draft_creation_notifies_nobody() {
    let applicant = user(Role::Applicant, "applicant@example.org");
    let subject = project(applicant.id, ProjectState::Draft, &["CZ0100"]);
    let h = harness(vec![applicant], HashMap::new());

    h.dispatcher
        .handle(&DomainEvent::ProjectCreated { project: subject })
        .await
        .unwrap();
    assert!(h.queue.messages.lock().is_empty());
}

#[tokio::test]
async fn approval_notifies_the_applicant() {
    let applicant = user(Role::Applicant, "applicant@example.org");
    let coordinator = user(Role::MunicipalCoordinator, "coordinator@example.org");
    let territories = HashMap::from([(coordinator.id, vec!["CZ0100".to_string()])]);
    let subject = project(applicant.id, ProjectState::Approved, &["CZ0100"]);

    let h = harness(vec![applicant, coordinator], territories);
    h.dispatcher
        .handle(&DomainEvent::ProjectStateChanged {
            project: subject,
            old_state: ProjectState::PendingApproval,
        })
        .await
        .unwrap();

    // Approved/rejected go to the applicant alone.
    assert_eq!(recipients(&h.queue), ["applicant@example.org"]);
    assert_eq!(h.queue.messages.lock()[0].template, "project_approved");
}

#[tokio::test]
async fn work_start_notifies_applicant_and_coordinators() {
    let applicant = user(Role::Applicant, "applicant@example.org");
    let coordinator = user(Role::MunicipalCoordinator, "coordinator@example.org");
    let territories = HashMap::from([(coordinator.id, vec!["CZ0100".to_string()])]);
    let subject = project(applicant.id, ProjectState::InProgress, &["CZ0100"]);

    let h = harness(vec![applicant, coordinator], territories);
    h.dispatcher
        .handle(&DomainEvent::ProjectStateChanged {
            project: subject,
            old_state: ProjectState::Approved,
        })
        .await
        .unwrap();

    let mut got = recipients(&h.queue);
    got.sort();
    assert_eq!(got, ["applicant@example.org", "coordinator@example.org"]);
}

#[tokio::test]
async fn comment_excludes_its_author() {
    let applicant = user(Role::Applicant, "applicant@example.org");
    let coordinator = user(Role::MunicipalCoordinator, "coordinator@example.org");
    let territories = HashMap::from([(coordinator.id, vec!["CZ0100".to_string()])]);
    let subject = project(applicant.id, ProjectState::PendingApproval, &["CZ0100"]);

    let comment = CommentRecord {
        id: exco_core::CommentId::new(),
        project_id: subject.id,
        author_id: coordinator.id,
        content: "please add a traffic plan".to_string(),
        attachment_url: None,
        created_at: chrono::Utc::now(),
    };

    let h = harness(vec![applicant, coordinator], territories);
    h.dispatcher
        .handle(&DomainEvent::CommentAdded {
            project: subject,
            comment,
        })
        .await
        .unwrap();

    // The commenting coordinator is excluded; only the applicant hears.
    assert_eq!(recipients(&h.queue), ["applicant@example.org"]);
}

#[tokio::test]
async fn conflicts_fan_out_to_peers_with_swapped_payload() {
    let applicant = user(Role::Applicant, "subject@example.org");
    let peer_applicant = user(Role::Applicant, "peer@example.org");
    let coordinator = user(Role::MunicipalCoordinator, "coordinator@example.org");
    let territories = HashMap::from([(coordinator.id, vec!["CZ0100".to_string()])]);

    let subject = project(applicant.id, ProjectState::PendingApproval, &["CZ0100"]);
    let peer = project(peer_applicant.id, ProjectState::Approved, &["CZ0100"]);

    let h = harness(vec![applicant, peer_applicant, coordinator], territories);
    h.dispatcher
        .handle(&DomainEvent::ConflictsDetected {
            project: subject.clone(),
            conflicts: vec![peer.clone()],
        })
        .await
        .unwrap();

    let messages = h.queue.messages.lock();
    let mut got: Vec<&str> = messages.iter().map(|m| m.recipient_email.as_str()).collect();
    got.sort();
    assert_eq!(
        got,
        ["coordinator@example.org", "peer@example.org", "subject@example.org"]
    );

    // The peer's message carries the peer as "project" and the new
    // project as the conflict.
    let peer_message = messages
        .iter()
        .find(|m| m.recipient_email == "peer@example.org")
        .unwrap();
    assert_eq!(
        peer_message.payload["project"]["id"],
        serde_json::json!(peer.id)
    );
    assert_eq!(
        peer_message.payload["conflicts"][0]["id"],
        serde_json::json!(subject.id)
    );
}

#[tokio::test]
async fn duplicate_recipients_collapse_to_one_message() {
    // The subject's applicant also owns the peer project: one message.
    let applicant = user(Role::Applicant, "both@example.org");
    let subject = project(applicant.id, ProjectState::PendingApproval, &[]);
    let peer = project(applicant.id, ProjectState::Approved, &[]);

    let h = harness(vec![applicant], HashMap::new());
    h.dispatcher
        .handle(&DomainEvent::ConflictsDetected {
            project: subject,
            conflicts: vec![peer],
        })
        .await
        .unwrap();

    assert_eq!(recipients(&h.queue), ["both@example.org"]);
}

#[tokio::test]
async fn deadline_for_approved_project_includes_coordinators() {
    let applicant = user(Role::Applicant, "applicant@example.org");
    let coordinator = user(Role::MunicipalCoordinator, "coordinator@example.org");
    let territories = HashMap::from([(coordinator.id, vec!["CZ0100".to_string()])]);
    let subject = project(applicant.id, ProjectState::Approved, &["CZ0100"]);

    let h = harness(vec![applicant, coordinator], territories);
    h.dispatcher
        .handle(&DomainEvent::DeadlineApproaching {
            project: subject,
            days_until: 3,
            kind: DeadlineKind::StartApproaching,
        })
        .await
        .unwrap();

    let mut got = recipients(&h.queue);
    got.sort();
    assert_eq!(got, ["applicant@example.org", "coordinator@example.org"]);
    assert!(h
        .queue
        .messages
        .lock()
        .iter()
        .all(|m| m.template == "deadline_approaching"));
}

#[tokio::test]
async fn overdue_end_goes_to_the_applicant_only() {
    let applicant = user(Role::Applicant, "applicant@example.org");
    let coordinator = user(Role::MunicipalCoordinator, "coordinator@example.org");
    let territories = HashMap::from([(coordinator.id, vec!["CZ0100".to_string()])]);
    let subject = project(applicant.id, ProjectState::InProgress, &["CZ0100"]);

    let h = harness(vec![applicant, coordinator], territories);
    h.dispatcher
        .handle(&DomainEvent::DeadlineApproaching {
            project: subject,
            days_until: -2,
            kind: DeadlineKind::EndOverdue,
        })
        .await
        .unwrap();

    assert_eq!(recipients(&h.queue), ["applicant@example.org"]);
    assert_eq!(h.queue.messages.lock()[0].template, "project_end_overdue");
}

#[tokio::test]
async fn registration_reaches_every_active_admin() {
    let admin_a = user(Role::RegionalAdmin, "admin-a@example.org");
    let admin_b = user(Role::RegionalAdmin, "admin-b@example.org");
    let mut inactive = user(Role::RegionalAdmin, "inactive@example.org");
    inactive.is_active = false;
    let newcomer = user(Role::Applicant, "new@example.org");

    let h = harness(
        vec![admin_a, admin_b, inactive, newcomer.clone()],
        HashMap::new(),
    );
    h.dispatcher
        .handle(&DomainEvent::UserRegistered { user: newcomer })
        .await
        .unwrap();

    let mut got = recipients(&h.queue);
    got.sort();
    assert_eq!(got, ["admin-a@example.org", "admin-b@example.org"]);
}

#[tokio::test]
async fn inactive_applicant_is_not_notified() {
    let mut applicant = user(Role::Applicant, "gone@example.org");
    applicant.is_active = false;
    let subject = project(applicant.id, ProjectState::Approved, &[]);

    let h = harness(vec![applicant], HashMap::new());
    h.dispatcher
        .handle(&DomainEvent::ProjectStateChanged {
            project: subject,
            old_state: ProjectState::PendingApproval,
        })
        .await
        .unwrap();

    assert!(h.queue.messages.lock().is_empty());
}
