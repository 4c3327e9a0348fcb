//! # exco-engine — The Conflict and Workflow Engine
//!
//! Composes the persistence layer into the running system: the conflict
//! detector, the lifecycle controller, the domain event bus with its
//! notification dispatcher, and the deadline scheduler.
//!
//! ## Wiring
//!
//! ```text
//! transport ──▶ LifecycleController ──▶ exco-db (transactional writes + audit)
//!                      │ publish (post-commit, fire-and-forget)
//!                      ▼
//!                  EventBus ──▶ NotificationDispatcher ──▶ email queue
//!                      ▲               │ geometry/date updates
//!                      │               ▼
//!  DeadlineScheduler ──┘        ConflictDetector ──▶ derived-field mutators
//! ```
//!
//! Derived-field writes never publish further lifecycle events, which is
//! what keeps the controller → event → detector loop from cycling.

pub mod config;
pub mod controller;
pub mod detector;
pub mod directory;
pub mod dispatcher;
pub mod events;
pub mod scheduler;

use std::sync::Arc;

use sqlx::PgPool;

pub use config::EngineConfig;
pub use controller::LifecycleController;
pub use detector::{ConflictDetection, ConflictDetector, ADJACENCY_BUFFER_METERS};
pub use directory::{
    EmailMessage, EmailQueue, PgUserDirectory, TracingEmailQueue, User, UserDirectory,
};
pub use dispatcher::NotificationDispatcher;
pub use events::{DeadlineKind, DomainEvent, EventBus, EventSubscriber};
pub use scheduler::{DeadlineScheduler, SchedulerStatus, SweepReport};

/// The assembled engine.
pub struct Engine {
    pub bus: EventBus,
    pub detector: ConflictDetector,
    pub controller: LifecycleController,
    pub scheduler: Arc<DeadlineScheduler>,
}

impl Engine {
    /// Wire the engine over an initialized pool and the two external
    /// boundaries. The event bus workers start immediately; the deadline
    /// scheduler is returned stopped — call `scheduler.start()`.
    pub fn start(
        pool: PgPool,
        directory: Arc<dyn UserDirectory>,
        queue: Arc<dyn EmailQueue>,
        config: &EngineConfig,
    ) -> Self {
        let bus = EventBus::start(config.notify_workers);
        let detector = ConflictDetector::new(pool.clone(), bus.clone());

        let dispatcher = Arc::new(NotificationDispatcher::new(
            pool.clone(),
            directory,
            queue,
            detector.clone(),
        ));
        bus.subscribe(dispatcher);

        let controller = LifecycleController::new(pool.clone(), bus.clone(), detector.clone());
        let scheduler = Arc::new(DeadlineScheduler::new(
            pool,
            bus.clone(),
            config.scheduler_offset(),
        ));

        Self {
            bus,
            detector,
            controller,
            scheduler,
        }
    }
}
