//! Background task scheduling (spec §4.5): cron/off-peak/one-shot task
//! entries persisted to `scheduler_tasks.json`, executed on a tick loop with
//! priority ordering, off-peak gating, and retry/backoff, dispatching to
//! the dreaming pipeline, configured shell commands, or caller-registered
//! custom executors.

pub mod cron;
pub mod engine;
pub mod error;
pub mod executor;
pub mod off_peak;
pub mod types;

pub use cron::CronSchedule;
pub use engine::{NewTaskInput, SchedulerConfig, SchedulerEngine};
pub use error::{Result, SchedulerError};
pub use executor::{ConversationSource, TaskExecutor};
pub use off_peak::OffPeakWindow;
pub use types::{
    Priority, ResourceRequirements, RetryPolicy, ScheduleSpec, SchedulerStatus, Task, TaskFilter,
    TaskStatus, TaskType,
};
