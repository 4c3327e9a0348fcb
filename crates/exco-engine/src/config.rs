//! # Engine Configuration
//!
//! Environment-sourced settings with sane defaults. Unparseable values
//! warn and fall back rather than refusing to start.

use chrono::FixedOffset;

/// Default number of event-bus worker tasks.
const DEFAULT_NOTIFY_WORKERS: usize = 4;

/// Default scheduler offset: UTC+01:00, the region's standard time.
const DEFAULT_OFFSET_MINUTES: i32 = 60;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker tasks consuming the domain event stream.
    pub notify_workers: usize,
    /// Fixed UTC offset, in minutes, for the daily 09:00 deadline sweep.
    pub scheduler_offset_minutes: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notify_workers: DEFAULT_NOTIFY_WORKERS,
            scheduler_offset_minutes: DEFAULT_OFFSET_MINUTES,
        }
    }
}

impl EngineConfig {
    /// Build from `EXCO_NOTIFY_WORKERS` and
    /// `EXCO_SCHEDULER_UTC_OFFSET_MINUTES`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("EXCO_NOTIFY_WORKERS") {
            match raw.parse::<usize>() {
                Ok(workers) if workers >= 1 => config.notify_workers = workers,
                _ => tracing::warn!(value = %raw,
                    "EXCO_NOTIFY_WORKERS is not a positive integer; using default"),
            }
        }

        if let Ok(raw) = std::env::var("EXCO_SCHEDULER_UTC_OFFSET_MINUTES") {
            match raw.parse::<i32>() {
                Ok(minutes) if minutes.abs() < 24 * 60 => {
                    config.scheduler_offset_minutes = minutes
                }
                _ => tracing::warn!(value = %raw,
                    "EXCO_SCHEDULER_UTC_OFFSET_MINUTES is not a valid offset; using default"),
            }
        }

        config
    }

    /// The scheduler's fixed offset.
    pub fn scheduler_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.scheduler_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(DEFAULT_OFFSET_MINUTES * 60).unwrap())
    }
}
