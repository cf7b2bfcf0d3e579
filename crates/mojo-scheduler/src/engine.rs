//! `SchedulerEngine`: task persistence, crash recovery, and the tick loop
//! (spec §4.5). Grounded on the teacher's `engine.rs::run()` daemon loop,
//! adapted from a consumed `self` to an `Arc<SchedulerEngine>` shared across
//! the daemon task and direct callers (`add_task`, `tick`, etc. all take
//! `&self`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mojo_core::atomic_write::{read_json, write_json_atomic};
use mojo_core::clock::Clock;
use mojo_core::ids::new_sortable_id;
use mojo_dreaming::DreamingPipeline;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cron::CronSchedule;
use crate::error::{Result, SchedulerError};
use crate::executor::{self, ConversationSource, TaskExecutor};
use crate::off_peak::OffPeakWindow;
use crate::types::{
    Priority, ResourceRequirements, RetryPolicy, ScheduleSpec, SchedulerStatus, Task, TaskFilter,
    TaskStatus, TaskType,
};

const STATE_FILE: &str = "scheduler_tasks.json";
const DEFAULT_DREAMING_TASK_ID: &str = "default-nightly-dreaming";
const DEFAULT_DREAMING_CRON: &str = "0 3 * * *";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub data_dir: PathBuf,
    pub tick_interval: std::time::Duration,
    pub dreaming_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            tick_interval: std::time::Duration::from_secs(60),
            dreaming_enabled: true,
        }
    }
}

/// Input shape for registering a new task; separate from `Task` since the
/// caller doesn't supply `id`/`status`/`attempt_count`/etc.
#[derive(Debug, Clone, Default)]
pub struct NewTaskInput {
    pub task_type: TaskType,
    pub priority: Priority,
    pub schedule: ScheduleSpec,
    pub config: HashMap<String, serde_json::Value>,
    pub resources: ResourceRequirements,
    pub retry_policy: Option<RetryPolicy>,
    pub off_peak_window: Option<OffPeakWindow>,
}

pub struct SchedulerEngine {
    tasks: Mutex<Vec<Task>>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    dreaming: Option<Arc<DreamingPipeline>>,
    conversation_source: Option<Arc<dyn ConversationSource>>,
    custom_executors: HashMap<String, Arc<dyn TaskExecutor>>,
    running: AtomicBool,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl SchedulerEngine {
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>, dreaming: Option<Arc<DreamingPipeline>>) -> Self {
        let (shutdown, _) = tokio::sync::watch::channel(false);
        Self {
            tasks: Mutex::new(Vec::new()),
            config,
            clock,
            dreaming,
            conversation_source: None,
            custom_executors: HashMap::new(),
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Wires the conversation store `dreaming` tasks auto-gather from when
    /// they don't supply `config.raw_text` directly (spec §4.5).
    pub fn with_conversation_source(mut self, source: Arc<dyn ConversationSource>) -> Self {
        self.conversation_source = Some(source);
        self
    }

    pub fn register_custom_executor(&mut self, key: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.custom_executors.insert(key.into(), executor);
    }

    fn state_path(&self) -> PathBuf {
        self.config.data_dir.join(STATE_FILE)
    }

    /// Loads on-disk state (if any), recovers tasks stranded mid-execution,
    /// registers the default nightly dreaming task if absent, and persists
    /// the result. Call once at startup.
    pub async fn bootstrap(&self) -> Result<()> {
        self.load().await?;
        {
            let mut tasks = self.tasks.lock().await;
            recover_running_to_pending(&mut tasks);
        }
        self.ensure_default_dreaming_task().await?;
        self.save().await?;
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        let path = self.state_path();
        let loaded: Option<Vec<Task>> = read_json(&path).map_err(|e| SchedulerError::State {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if let Some(tasks) = loaded {
            *self.tasks.lock().await = tasks;
        }
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        let tasks = self.tasks.lock().await;
        write_json_atomic(&self.state_path(), &*tasks).map_err(|e| SchedulerError::State {
            path: self.state_path().display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn ensure_default_dreaming_task(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.iter().any(|t| t.id == DEFAULT_DREAMING_TASK_ID) {
            return Ok(());
        }
        let now = self.clock.now();
        let cron = CronSchedule::parse(DEFAULT_DREAMING_CRON)?;
        let next_run_at = cron.next_fire_after(now)?;
        tasks.push(Task {
            id: DEFAULT_DREAMING_TASK_ID.to_string(),
            task_type: TaskType::Dreaming,
            priority: Priority::Low,
            status: TaskStatus::Pending,
            schedule: ScheduleSpec { cron: Some(DEFAULT_DREAMING_CRON.to_string()), run_at: None, immediate: None },
            config: HashMap::new(),
            resources: ResourceRequirements::default(),
            retry_policy: RetryPolicy::default(),
            attempt_count: 0,
            last_error: None,
            last_run_at: None,
            next_run_at: Some(next_run_at),
            result: None,
            created_at: now,
            off_peak_window: Some(OffPeakWindow::new(
                chrono::NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
                chrono::NaiveTime::from_hms_opt(5, 0, 0).unwrap(),
            )),
        });
        info!(task_id = DEFAULT_DREAMING_TASK_ID, "registered default nightly dreaming task");
        Ok(())
    }

    pub async fn add_task(&self, input: NewTaskInput) -> Result<Task> {
        let now = self.clock.now();
        let next_run_at = if input.schedule.immediate == Some(true) {
            Some(now)
        } else if let Some(cron_expr) = &input.schedule.cron {
            Some(CronSchedule::parse(cron_expr)?.next_fire_after(now)?)
        } else if let Some(run_at) = input.schedule.run_at {
            Some(run_at)
        } else {
            return Err(SchedulerError::InvalidSchedule(
                "task schedule must specify cron, run_at, or immediate".to_string(),
            ));
        };

        let task = Task {
            id: new_sortable_id(),
            task_type: input.task_type,
            priority: input.priority,
            status: TaskStatus::Pending,
            schedule: input.schedule,
            config: input.config,
            resources: input.resources,
            retry_policy: input.retry_policy.unwrap_or_default(),
            attempt_count: 0,
            last_error: None,
            last_run_at: None,
            next_run_at,
            result: None,
            created_at: now,
            off_peak_window: input.off_peak_window,
        };

        self.tasks.lock().await.push(task.clone());
        self.save().await?;
        Ok(task)
    }

    pub async fn remove_task(&self, id: &str) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            return Err(SchedulerError::TaskNotFound(id.to_string()));
        }
        drop(tasks);
        self.save().await
    }

    pub async fn get_task(&self, id: &str) -> Result<Task> {
        self.tasks
            .lock()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        self.tasks.lock().await.iter().filter(|t| filter.matches(t)).cloned().collect()
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        let tasks = self.tasks.lock().await;
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            task_count: tasks.len(),
            pending_count: tasks.iter().filter(|t| t.status == TaskStatus::Pending).count(),
        }
    }

    /// One scheduling pass: find all tasks due (`next_run_at <= now`,
    /// `status == Pending`), sort by `(priority desc, next_run_at asc, id
    /// asc)`, and execute them serially.
    pub async fn tick(&self) -> Result<()> {
        let now = self.clock.now();
        let due_ids: Vec<String> = {
            let tasks = self.tasks.lock().await;
            let mut due: Vec<&Task> = tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Pending && t.next_run_at.map(|n| n <= now).unwrap_or(false))
                .collect();
            due.sort_by(|a, b| {
                b.priority.cmp(&a.priority).then(a.next_run_at.cmp(&b.next_run_at)).then(a.id.cmp(&b.id))
            });
            due.iter().map(|t| t.id.clone()).collect::<Vec<_>>()
        };

        for id in due_ids {
            self.execute_one(&id, now).await;
        }
        self.save().await?;
        Ok(())
    }

    async fn execute_one(&self, id: &str, now: DateTime<Utc>) {
        let snapshot = {
            let mut tasks = self.tasks.lock().await;
            let Some(task) = tasks.iter_mut().find(|t| t.id == id) else { return };

            if let Some(window) = task.off_peak_window {
                if !window.contains(now) {
                    skip_task(task, now, "outside_off_peak_window");
                    return;
                }
            }
            if task.task_type == TaskType::Dreaming && !self.config.dreaming_enabled {
                skip_task(task, now, "dreaming_disabled");
                return;
            }

            task.status = TaskStatus::Running;
            task.clone()
        };

        let outcome = self.run_executor(&snapshot).await;

        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.last_run_at = Some(now);
            match outcome {
                Ok(value) => {
                    task.result = Some(value);
                    task.last_error = None;
                    advance_after_success(task, now);
                }
                Err(reason) => {
                    warn!(task_id = %id, error = %reason, "task execution failed");
                    task.last_error = Some(reason);
                    retry_or_fail(task, now);
                }
            }
        }
    }

    async fn run_executor(&self, task: &Task) -> executor::ExecResult {
        match task.task_type {
            TaskType::Dreaming => {
                let pipeline = self.dreaming.as_ref().ok_or("no dreaming pipeline configured")?;
                let source = self.conversation_source.as_deref();
                executor::run_dreaming(pipeline, source, task).await
            }
            TaskType::ScheduledCmd => executor::run_scheduled_cmd(task).await,
            TaskType::Agent => Err("agent task executor is reserved and not yet implemented".to_string()),
            TaskType::Custom => {
                let key = task.config.get("custom_key").and_then(|v| v.as_str()).ok_or("missing config.custom_key")?;
                let exec = self
                    .custom_executors
                    .get(key)
                    .ok_or_else(|| format!("no executor registered for custom key '{key}'"))?;
                exec.execute(task).await
            }
        }
    }

    /// Runs the daemon loop: ticks on `config.tick_interval` until `stop()`
    /// is called. Intended to be spawned via `tokio::spawn` on an
    /// `Arc<SchedulerEngine>`.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let mut shutdown = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "scheduler tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn recover_running_to_pending(tasks: &mut [Task]) {
    for task in tasks.iter_mut() {
        if task.status == TaskStatus::Running {
            task.status = TaskStatus::Pending;
            task.attempt_count += 1;
            warn!(task_id = %task.id, "recovered task stranded in running state at startup");
        }
    }
}

/// Applies spec §4.5 step 4 after an off-peak/disabled-executor skip: cron
/// tasks recompute `next_run_at` and return to `Pending`; one-shot tasks
/// have no further occurrence, so the skip is their terminal outcome.
fn skip_task(task: &mut Task, now: DateTime<Utc>, reason: &str) {
    task.last_run_at = Some(now);
    task.last_error = Some(format!("skipped: {reason}"));
    match &task.schedule.cron {
        Some(cron_expr) => match CronSchedule::parse(cron_expr).and_then(|c| c.next_fire_after(now)) {
            Ok(next) => {
                task.next_run_at = Some(next);
                task.status = TaskStatus::Pending;
            }
            Err(_) => {
                task.status = TaskStatus::Failed;
                task.next_run_at = None;
            }
        },
        None => {
            task.status = TaskStatus::Skipped;
            task.next_run_at = None;
        }
    }
}

fn advance_after_success(task: &mut Task, now: DateTime<Utc>) {
    match &task.schedule.cron {
        Some(cron_expr) => match CronSchedule::parse(cron_expr).and_then(|c| c.next_fire_after(now)) {
            Ok(next) => {
                task.next_run_at = Some(next);
                task.status = TaskStatus::Pending;
            }
            Err(_) => {
                task.status = TaskStatus::Failed;
                task.next_run_at = None;
            }
        },
        None => {
            task.status = TaskStatus::Completed;
            task.next_run_at = None;
        }
    }
}

fn retry_or_fail(task: &mut Task, now: DateTime<Utc>) {
    if task.attempt_count < task.retry_policy.max_retries {
        task.attempt_count += 1;
        let backoff = task.retry_policy.backoff_seconds.saturating_mul(2u64.saturating_pow(task.attempt_count));
        task.next_run_at = Some(now + chrono::Duration::seconds(backoff as i64));
        task.status = TaskStatus::Pending;
    } else {
        task.status = TaskStatus::Failed;
        task.next_run_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use mojo_core::clock::FixedClock;

    struct EchoExecutor;

    #[async_trait]
    impl TaskExecutor for EchoExecutor {
        async fn execute(&self, _task: &Task) -> executor::ExecResult {
            Ok(serde_json::json!({ "ok": true }))
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl TaskExecutor for FailingExecutor {
        async fn execute(&self, _task: &Task) -> executor::ExecResult {
            Err("boom".to_string())
        }
    }

    fn engine_with(clock: Arc<FixedClock>, dir: &std::path::Path) -> SchedulerEngine {
        SchedulerEngine::new(
            SchedulerConfig { data_dir: dir.to_path_buf(), dreaming_enabled: false, ..Default::default() },
            clock,
            None,
        )
    }

    #[tokio::test]
    async fn bootstrap_registers_default_dreaming_task() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let engine = engine_with(clock, dir.path());
        engine.bootstrap().await.unwrap();
        let task = engine.get_task(DEFAULT_DREAMING_TASK_ID).await.unwrap();
        assert_eq!(task.task_type, TaskType::Dreaming);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn bootstrap_recovers_running_tasks_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let clock = Arc::new(FixedClock::new(now));
        let engine = engine_with(clock.clone(), dir.path());
        engine.bootstrap().await.unwrap();

        {
            let mut tasks = engine.tasks.lock().await;
            tasks[0].status = TaskStatus::Running;
            tasks[0].attempt_count = 0;
        }
        engine.save().await.unwrap();

        let clock2 = Arc::new(FixedClock::new(now));
        let engine2 = engine_with(clock2, dir.path());
        engine2.bootstrap().await.unwrap();
        let task = engine2.get_task(DEFAULT_DREAMING_TASK_ID).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt_count, 1);
    }

    #[tokio::test]
    async fn tick_executes_due_custom_task_and_recomputes_cron_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let clock = Arc::new(FixedClock::new(now));
        let mut engine = engine_with(clock.clone(), dir.path());
        engine.register_custom_executor("echo", Arc::new(EchoExecutor));
        engine.bootstrap().await.unwrap();

        let mut config = HashMap::new();
        config.insert("custom_key".to_string(), serde_json::json!("echo"));
        let task = engine
            .add_task(NewTaskInput {
                task_type: TaskType::Custom,
                priority: Priority::High,
                schedule: ScheduleSpec {
                    cron: Some("* * * * *".to_string()),
                    run_at: None,
                    immediate: Some(true),
                },
                config,
                ..Default::default()
            })
            .await
            .unwrap();

        engine.tick().await.unwrap();
        let after = engine.get_task(&task.id).await.unwrap();
        assert_eq!(after.status, TaskStatus::Pending);
        assert!(after.next_run_at.unwrap() > now);
        assert_eq!(after.result, Some(serde_json::json!({ "ok": true })));
    }

    #[tokio::test]
    async fn tick_retries_then_fails_a_one_shot_custom_task() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let clock = Arc::new(FixedClock::new(now));
        let mut engine = engine_with(clock.clone(), dir.path());
        engine.register_custom_executor("boom", Arc::new(FailingExecutor));
        engine.bootstrap().await.unwrap();

        let mut config = HashMap::new();
        config.insert("custom_key".to_string(), serde_json::json!("boom"));
        let task = engine
            .add_task(NewTaskInput {
                task_type: TaskType::Custom,
                priority: Priority::Medium,
                schedule: ScheduleSpec { cron: None, run_at: Some(now), immediate: None },
                config,
                retry_policy: Some(RetryPolicy { max_retries: 1, backoff_seconds: 10 }),
                ..Default::default()
            })
            .await
            .unwrap();

        engine.tick().await.unwrap();
        let after_first = engine.get_task(&task.id).await.unwrap();
        assert_eq!(after_first.status, TaskStatus::Pending);
        assert_eq!(after_first.attempt_count, 1);

        clock.set(after_first.next_run_at.unwrap());
        engine.tick().await.unwrap();
        let after_second = engine.get_task(&task.id).await.unwrap();
        assert_eq!(after_second.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn tick_skips_one_shot_task_outside_off_peak_window() {
        let dir = tempfile::tempdir().unwrap();
        let now = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(now));
        let mut engine = engine_with(clock, dir.path());
        engine.register_custom_executor("echo", Arc::new(EchoExecutor));
        engine.bootstrap().await.unwrap();

        let mut config = HashMap::new();
        config.insert("custom_key".to_string(), serde_json::json!("echo"));
        let task = engine
            .add_task(NewTaskInput {
                task_type: TaskType::Custom,
                priority: Priority::Medium,
                schedule: ScheduleSpec { cron: None, run_at: Some(now), immediate: None },
                config,
                off_peak_window: Some(OffPeakWindow::new(
                    chrono::NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
                    chrono::NaiveTime::from_hms_opt(5, 0, 0).unwrap(),
                )),
                ..Default::default()
            })
            .await
            .unwrap();

        engine.tick().await.unwrap();
        let after = engine.get_task(&task.id).await.unwrap();
        assert_eq!(after.status, TaskStatus::Skipped);
        assert_eq!(after.last_error.as_deref(), Some("skipped: outside_off_peak_window"));
    }
}
