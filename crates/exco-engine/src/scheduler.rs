//! # Deadline Scheduler
//!
//! Singleton background task that sweeps the corpus once a day at 09:00
//! in the region's fixed UTC offset and publishes `DeadlineApproaching`
//! events for the dispatcher: approaching starts at the 1/3/7-day
//! horizons, next-day endings, and overdue starts and ends. Also offers
//! one-shot scheduling (rejecting instants already in the past) and a
//! manual trigger for operators.
//!
//! Background work ignores request cancellation; a failed sweep is
//! logged and the loop keeps its cadence.

use std::sync::Arc;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;
use sqlx::PgPool;
use tokio::task::JoinHandle;

use exco_core::Error;
use exco_db::{projects, DbResult};
use exco_state::ProjectState;

use crate::events::{DeadlineKind, DomainEvent, EventBus};

/// Local hour of the daily sweep.
pub const SWEEP_HOUR: u32 = 9;

/// Start-date horizons swept for approved projects, in days.
pub const START_HORIZONS: [u64; 3] = [1, 3, 7];

/// Control-block state behind the scheduler handle.
struct Inner {
    running: bool,
    handle: Option<JoinHandle<()>>,
    last_sweep: Option<DateTime<Utc>>,
    completed_sweeps: u64,
}

/// Observable scheduler state.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub running: bool,
    pub last_sweep: Option<DateTime<Utc>>,
    pub completed_sweeps: u64,
    /// Next daily tick, present while running.
    pub next_sweep: Option<DateTime<Utc>>,
}

/// What one sweep found and published.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub start_approaching: usize,
    pub end_approaching: usize,
    pub start_overdue: usize,
    pub end_overdue: usize,
}

impl SweepReport {
    /// Total events published.
    pub fn total(&self) -> usize {
        self.start_approaching + self.end_approaching + self.start_overdue + self.end_overdue
    }
}

/// The scheduler. Construct once, share via `Arc`.
pub struct DeadlineScheduler {
    pool: PgPool,
    bus: EventBus,
    offset: FixedOffset,
    inner: Mutex<Inner>,
}

impl DeadlineScheduler {
    pub fn new(pool: PgPool, bus: EventBus, offset: FixedOffset) -> Self {
        Self {
            pool,
            bus,
            offset,
            inner: Mutex::new(Inner {
                running: false,
                handle: None,
                last_sweep: None,
                completed_sweeps: 0,
            }),
        }
    }

    /// Start the daily loop. Idempotent while running.
    pub fn start(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.running {
            return;
        }
        inner.running = true;

        let scheduler = Arc::clone(self);
        inner.handle = Some(tokio::spawn(async move {
            loop {
                let next = next_sweep_after(Utc::now(), scheduler.offset);
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tracing::debug!(next = %next, "deadline scheduler sleeping until next sweep");
                tokio::time::sleep(wait).await;

                match scheduler.sweep().await {
                    Ok(report) => {
                        tracing::info!(published = report.total(), "deadline sweep completed")
                    }
                    Err(error) => tracing::error!(%error, "deadline sweep failed"),
                }
            }
        }));
    }

    /// Stop the daily loop. One-shot tasks already scheduled still fire.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.handle.take() {
            handle.abort();
        }
        inner.running = false;
    }

    /// Current state.
    pub fn status(&self) -> SchedulerStatus {
        let inner = self.inner.lock();
        SchedulerStatus {
            running: inner.running,
            last_sweep: inner.last_sweep,
            completed_sweeps: inner.completed_sweeps,
            next_sweep: inner
                .running
                .then(|| next_sweep_after(Utc::now(), self.offset)),
        }
    }

    /// Schedule a single sweep at `when`. Instants not strictly in the
    /// future are rejected.
    pub fn schedule_at(self: &Arc<Self>, when: DateTime<Utc>) -> Result<(), Error> {
        let now = Utc::now();
        if when <= now {
            return Err(Error::invalid_input(
                "when",
                format!("{when} is not in the future"),
            ));
        }

        let scheduler = Arc::clone(self);
        let wait = (when - now).to_std().unwrap_or_default();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            match scheduler.sweep().await {
                Ok(report) => {
                    tracing::info!(published = report.total(), "one-shot sweep completed")
                }
                Err(error) => tracing::error!(%error, "one-shot sweep failed"),
            }
        });
        Ok(())
    }

    /// Run one sweep immediately. Operator hook; also the loop body.
    pub async fn trigger_now(&self) -> DbResult<SweepReport> {
        self.sweep().await
    }

    async fn sweep(&self) -> DbResult<SweepReport> {
        let today = Utc::now().with_timezone(&self.offset).date_naive();
        let mut report = SweepReport::default();

        // Approved projects approaching their start date.
        for horizon in START_HORIZONS {
            let day = today + Days::new(horizon);
            for project in
                projects::find_in_state_with_start_on(&self.pool, ProjectState::Approved, day)
                    .await?
            {
                self.bus.publish(DomainEvent::DeadlineApproaching {
                    project,
                    days_until: horizon as i64,
                    kind: DeadlineKind::StartApproaching,
                });
                report.start_approaching += 1;
            }
        }

        // In-progress projects ending tomorrow.
        let tomorrow = today + Days::new(1);
        for project in
            projects::find_in_state_with_end_on(&self.pool, ProjectState::InProgress, tomorrow)
                .await?
        {
            self.bus.publish(DomainEvent::DeadlineApproaching {
                project,
                days_until: 1,
                kind: DeadlineKind::EndApproaching,
            });
            report.end_approaching += 1;
        }

        // Approved projects whose start slipped past yesterday.
        let yesterday = today - Days::new(1);
        for project in
            projects::find_in_state_with_start_before(&self.pool, ProjectState::Approved, yesterday)
                .await?
        {
            let days_until = (project.start_date - today).num_days();
            self.bus.publish(DomainEvent::DeadlineApproaching {
                project,
                days_until,
                kind: DeadlineKind::StartOverdue,
            });
            report.start_overdue += 1;
        }

        // In-progress projects whose end slipped past yesterday.
        for project in
            projects::find_in_state_with_end_before(&self.pool, ProjectState::InProgress, yesterday)
                .await?
        {
            let days_until = (project.end_date - today).num_days();
            self.bus.publish(DomainEvent::DeadlineApproaching {
                project,
                days_until,
                kind: DeadlineKind::EndOverdue,
            });
            report.end_overdue += 1;
        }

        let mut inner = self.inner.lock();
        inner.last_sweep = Some(Utc::now());
        inner.completed_sweeps += 1;

        Ok(report)
    }
}

/// The next 09:00 local tick strictly after `now`.
pub fn next_sweep_after(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset);
    let today_tick = sweep_instant(local.date_naive(), offset);
    if now < today_tick {
        today_tick
    } else {
        sweep_instant(local.date_naive() + Days::new(1), offset)
    }
}

fn sweep_instant(day: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    day.and_hms_opt(SWEEP_HOUR, 0, 0)
        .expect("09:00 exists on every day")
        .and_local_timezone(offset)
        .single()
        .expect("fixed offsets are unambiguous")
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset_plus_one() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc()
    }

    #[test]
    fn before_nine_local_sweeps_today() {
        // 07:30 UTC is 08:30 local (+01:00); today's 09:00 local is 08:00 UTC.
        let next = next_sweep_after(utc("2024-03-10 07:30:00"), offset_plus_one());
        assert_eq!(next, utc("2024-03-10 08:00:00"));
    }

    #[test]
    fn after_nine_local_sweeps_tomorrow() {
        let next = next_sweep_after(utc("2024-03-10 09:30:00"), offset_plus_one());
        assert_eq!(next, utc("2024-03-11 08:00:00"));
    }

    #[test]
    fn exactly_nine_local_sweeps_tomorrow() {
        // Strictly after: a tick at 09:00:00 schedules the next day.
        let next = next_sweep_after(utc("2024-03-10 08:00:00"), offset_plus_one());
        assert_eq!(next, utc("2024-03-11 08:00:00"));
    }

    #[test]
    fn offset_moves_the_utc_instant() {
        let plus_two = FixedOffset::east_opt(7200).unwrap();
        let next = next_sweep_after(utc("2024-03-10 01:00:00"), plus_two);
        assert_eq!(next, utc("2024-03-10 07:00:00"));
    }

    #[test]
    fn local_date_rollover_is_respected() {
        // 23:30 UTC on the 10th is 00:30 local on the 11th (+01:00), so
        // the next sweep is the 11th's.
        let next = next_sweep_after(utc("2024-03-10 23:30:00"), offset_plus_one());
        assert_eq!(next, utc("2024-03-11 08:00:00"));
    }

    #[tokio::test]
    async fn schedule_at_rejects_past_instants() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let bus = EventBus::start(1);
        let scheduler = Arc::new(DeadlineScheduler::new(pool, bus, offset_plus_one()));

        let past = Utc::now() - chrono::Duration::minutes(5);
        let err = scheduler.schedule_at(past).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(scheduler.schedule_at(future).is_ok());
    }

    #[tokio::test]
    async fn status_reflects_start_and_stop() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let bus = EventBus::start(1);
        let scheduler = Arc::new(DeadlineScheduler::new(pool, bus, offset_plus_one()));

        assert!(!scheduler.status().running);
        scheduler.start();
        let status = scheduler.status();
        assert!(status.running);
        assert!(status.next_sweep.is_some());
        assert_eq!(status.completed_sweeps, 0);

        scheduler.stop();
        assert!(!scheduler.status().running);
        assert!(scheduler.status().next_sweep.is_none());
    }
}
