//! # Domain Events and the In-Process Bus
//!
//! Mutating operations publish a [`DomainEvent`] after their transaction
//! commits; subscribers (the notification dispatcher, operator tooling)
//! consume asynchronously. `publish` never blocks and never fails the
//! caller: the fabric is at-least-once, best-effort, and fully decoupled
//! from the synchronous write path.
//!
//! ## Ordering
//!
//! A fixed pool of worker tasks each owns an unbounded FIFO. Events are
//! routed to a worker by hash of their partition key (the entity id), so
//! consumption is FIFO per entity; ordering across entities is
//! unspecified. Subscriber errors are logged and swallowed.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use exco_db::{CommentRecord, MoratoriumRecord, ProjectRecord};
use exco_state::ProjectState;

use crate::directory::User;

/// Which deadline a [`DomainEvent::DeadlineApproaching`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineKind {
    /// Approved project starting in a few days.
    StartApproaching,
    /// In-progress project ending tomorrow.
    EndApproaching,
    /// Approved project whose start date has slipped past.
    StartOverdue,
    /// In-progress project whose end date has slipped past.
    EndOverdue,
}

impl DeadlineKind {
    /// Template tag used by the notification dispatcher.
    pub fn template(&self) -> &'static str {
        match self {
            Self::StartApproaching => "deadline_approaching",
            Self::EndApproaching => "project_ending_soon",
            Self::StartOverdue => "project_start_overdue",
            Self::EndOverdue => "project_end_overdue",
        }
    }
}

/// A lifecycle fact, published after commit.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    ProjectCreated {
        project: ProjectRecord,
    },
    ProjectUpdated {
        old: Box<ProjectRecord>,
        new: Box<ProjectRecord>,
    },
    ProjectStateChanged {
        project: ProjectRecord,
        old_state: ProjectState,
    },
    CommentAdded {
        project: ProjectRecord,
        comment: CommentRecord,
    },
    ConflictsDetected {
        project: ProjectRecord,
        conflicts: Vec<ProjectRecord>,
    },
    MoratoriumCreated {
        moratorium: MoratoriumRecord,
    },
    UserRegistered {
        user: User,
    },
    DeadlineApproaching {
        project: ProjectRecord,
        days_until: i64,
        kind: DeadlineKind,
    },
}

impl DomainEvent {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProjectCreated { .. } => "project_created",
            Self::ProjectUpdated { .. } => "project_updated",
            Self::ProjectStateChanged { .. } => "project_state_changed",
            Self::CommentAdded { .. } => "comment_added",
            Self::ConflictsDetected { .. } => "conflicts_detected",
            Self::MoratoriumCreated { .. } => "moratorium_created",
            Self::UserRegistered { .. } => "user_registered",
            Self::DeadlineApproaching { .. } => "deadline_approaching",
        }
    }

    /// Partition key: events with the same key are consumed in order.
    pub fn partition_key(&self) -> Uuid {
        match self {
            Self::ProjectCreated { project }
            | Self::ProjectStateChanged { project, .. }
            | Self::CommentAdded { project, .. }
            | Self::ConflictsDetected { project, .. }
            | Self::DeadlineApproaching { project, .. } => project.id.as_uuid(),
            Self::ProjectUpdated { new, .. } => new.id.as_uuid(),
            Self::MoratoriumCreated { moratorium } => moratorium.id.as_uuid(),
            Self::UserRegistered { user } => user.id.as_uuid(),
        }
    }
}

/// A consumer of domain events.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Handle one event. Errors are logged by the bus and never reach
    /// the publisher.
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

type SubscriberList = Arc<RwLock<Vec<Arc<dyn EventSubscriber>>>>;

/// In-process publish-subscribe fabric. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    workers: Arc<Vec<mpsc::UnboundedSender<DomainEvent>>>,
    subscribers: SubscriberList,
}

impl EventBus {
    /// Spawn `worker_count` consumer tasks and return the bus handle.
    pub fn start(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let subscribers: SubscriberList = Arc::new(RwLock::new(Vec::new()));
        let mut senders = Vec::with_capacity(worker_count);

        for worker in 0..worker_count {
            let (tx, mut rx) = mpsc::unbounded_channel::<DomainEvent>();
            senders.push(tx);
            let subscribers = Arc::clone(&subscribers);
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    // Snapshot the list so no lock is held across await.
                    let current: Vec<_> = subscribers.read().clone();
                    for subscriber in current {
                        if let Err(error) = subscriber.handle(&event).await {
                            tracing::warn!(
                                worker,
                                subscriber = subscriber.name(),
                                event = event.name(),
                                %error,
                                "event subscriber failed"
                            );
                        }
                    }
                }
            });
        }

        Self {
            workers: Arc::new(senders),
            subscribers,
        }
    }

    /// Register a subscriber. Takes effect for events published after the
    /// call.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Publish an event. Returns immediately; a closed worker (shutdown
    /// in progress) drops the event with a warning.
    pub fn publish(&self, event: DomainEvent) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        event.partition_key().hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.workers.len();

        tracing::debug!(event = event.name(), worker = index, "publishing domain event");
        if self.workers[index].send(event).is_err() {
            tracing::warn!("event bus worker is gone; dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exco_core::{Geometry, ProjectId, UserId};
    use parking_lot::Mutex;

    fn test_project(name: &str) -> ProjectRecord {
        let d = |s: &str| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        ProjectRecord {
            id: ProjectId::new(),
            name: name.to_string(),
            applicant_id: UserId::new(),
            contractor_organization: None,
            contractor_contact: None,
            state: ProjectState::Draft,
            start_date: d("2024-01-15"),
            end_date: d("2024-02-15"),
            geometry: Geometry::point(14.4378, 50.0755),
            work_type: "water_supply".to_string(),
            work_category: "new_installation".to_string(),
            description: None,
            has_conflict: false,
            conflicting_project_ids: Vec::new(),
            affected_municipalities: Vec::new(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    struct Recorder {
        seen: Mutex<Vec<String>>,
        notify: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl EventSubscriber for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
            if let DomainEvent::ProjectCreated { project } = event {
                self.seen.lock().push(project.name.clone());
            }
            let _ = self.notify.send(());
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl EventSubscriber for AlwaysFails {
        fn name(&self) -> &'static str {
            "always-fails"
        }

        async fn handle(&self, _event: &DomainEvent) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let bus = EventBus::start(2);
        let (notify, mut done) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            notify,
        });
        bus.subscribe(recorder.clone());

        bus.publish(DomainEvent::ProjectCreated {
            project: test_project("alpha"),
        });
        done.recv().await.unwrap();
        assert_eq!(recorder.seen.lock().as_slice(), ["alpha".to_string()]);
    }

    #[tokio::test]
    async fn same_partition_is_fifo() {
        let bus = EventBus::start(4);
        let (notify, mut done) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            notify,
        });
        bus.subscribe(recorder.clone());

        // Same project id => same partition => strict order.
        let mut project = test_project("first");
        let id = project.id;
        bus.publish(DomainEvent::ProjectCreated {
            project: project.clone(),
        });
        project.name = "second".to_string();
        project.id = id;
        bus.publish(DomainEvent::ProjectCreated { project });

        done.recv().await.unwrap();
        done.recv().await.unwrap();
        assert_eq!(
            recorder.seen.lock().as_slice(),
            ["first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test]
    async fn subscriber_failure_does_not_stop_delivery() {
        let bus = EventBus::start(1);
        let (notify, mut done) = mpsc::unbounded_channel();
        bus.subscribe(Arc::new(AlwaysFails));
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            notify,
        });
        bus.subscribe(recorder.clone());

        bus.publish(DomainEvent::ProjectCreated {
            project: test_project("survives"),
        });
        done.recv().await.unwrap();
        assert_eq!(recorder.seen.lock().len(), 1);
    }

    #[test]
    fn deadline_templates_are_distinct() {
        let kinds = [
            DeadlineKind::StartApproaching,
            DeadlineKind::EndApproaching,
            DeadlineKind::StartOverdue,
            DeadlineKind::EndOverdue,
        ];
        let mut tags: Vec<_> = kinds.iter().map(|k| k.template()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), kinds.len());
    }
}
