//! Live progress registry for running generation tasks.
//!
//! The orchestrator writes progress as it advances through the pipeline and
//! observers poll [`ProgressStore::get_progress`] at any time. One store is
//! shared by every concurrent task; records are keyed by task id and are only
//! removed by [`ProgressStore::clean_old_tasks`].
//!
//! The store is deliberately forgiving: updating an unknown task id creates
//! the record on the fly, and no operation returns an error. A progress
//! observer must never be able to take a running pipeline down.
//!
//! # Example
//!
//! ```
//! use mcp_forge::progress::{ProgressStore, ProgressUpdate, TaskStatus};
//!
//! let store = ProgressStore::new();
//! store.start_task("task-1");
//! store.update_progress(
//!     "task-1",
//!     ProgressUpdate::new().progress(25).status(TaskStatus::Planning),
//! );
//! assert_eq!(store.get_progress("task-1").map(|r| r.progress), Some(25));
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle status of a generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Record created, pipeline not yet running.
    Initializing,
    /// Pipeline accepted the task and is about to start staging.
    Processing,
    /// Planning stage in progress.
    Planning,
    /// Coding stage in progress.
    Coding,
    /// Validation stage in progress.
    Validating,
    /// Artifacts being written.
    Finalizing,
    /// Terminal: pipeline finished normally.
    Completed,
    /// Terminal: pipeline finished with a fatal error.
    Failed,
    /// Terminal: overall deadline expired before the pipeline finished.
    Timeout,
}

impl TaskStatus {
    /// Whether this status ends the task's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Initializing => "initializing",
            TaskStatus::Processing => "processing",
            TaskStatus::Planning => "planning",
            TaskStatus::Coding => "coding",
            TaskStatus::Validating => "validating",
            TaskStatus::Finalizing => "finalizing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Progress record for a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Opaque task identifier, stable for the task's lifetime.
    pub task_id: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Completion percentage (0-100), non-decreasing within a run.
    pub progress: u8,
    /// Human-readable label for the current step.
    pub current_step: String,
    /// Append-only log of progress messages.
    pub log: Vec<String>,
    /// Last recorded error, if any.
    pub error: Option<String>,
    /// When the task was registered.
    pub start_time: DateTime<Utc>,
    /// When the record was last touched.
    pub last_update: DateTime<Utc>,
    /// When the task reached a terminal status.
    pub end_time: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    fn new(task_id: &str) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Initializing,
            progress: 0,
            current_step: "Task started".to_string(),
            log: vec!["Task started".to_string()],
            error: None,
            start_time: now,
            last_update: now,
            end_time: None,
        }
    }
}

/// Partial update applied to a task's progress record.
///
/// Only fields that were set are applied; everything else keeps its current
/// value. Build one with chained setters:
///
/// ```
/// use mcp_forge::progress::{ProgressUpdate, TaskStatus};
///
/// let update = ProgressUpdate::new()
///     .progress(50)
///     .status(TaskStatus::Coding)
///     .message("Generating implementation files");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    progress: Option<u8>,
    status: Option<TaskStatus>,
    step: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ProgressUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the completion percentage (clamped to 100 on apply).
    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Set the lifecycle status.
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the current step label.
    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Append a message to the task's log.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Record an error message on the task.
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Concurrency-safe registry of per-task progress records.
///
/// Cloning the store is cheap and every clone shares the same underlying map,
/// so one instance can be handed to the orchestrator, observers, and cleanup
/// jobs alike.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    inner: Arc<Mutex<HashMap<String, ProgressRecord>>>,
}

impl ProgressStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the record map, absorbing poisoning.
    ///
    /// A panic while holding the lock leaves the map structurally intact, and
    /// progress reporting must keep working for the remaining tasks, so the
    /// poison flag is ignored rather than propagated.
    fn records(&self) -> MutexGuard<'_, HashMap<String, ProgressRecord>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a task, creating a fresh record.
    ///
    /// Calling this for an id that already exists re-initializes the record;
    /// callers that want to preserve accumulated state should use
    /// [`ProgressStore::update_progress`] instead.
    pub fn start_task(&self, task_id: &str) -> ProgressRecord {
        let record = ProgressRecord::new(task_id);
        self.records()
            .insert(task_id.to_string(), record.clone());
        tracing::debug!(task_id = %task_id, "Registered progress record");
        record
    }

    /// Apply a partial update to a task's record.
    ///
    /// Unknown task ids self-heal: the record is created first, then the
    /// update is applied, so out-of-order calls never fail. `progress` never
    /// decreases; an update carrying a lower value than the current one keeps
    /// the current value. Moving into a terminal status records `end_time`.
    pub fn update_progress(&self, task_id: &str, update: ProgressUpdate) -> ProgressRecord {
        let mut records = self.records();
        let record = records
            .entry(task_id.to_string())
            .or_insert_with(|| ProgressRecord::new(task_id));

        if let Some(progress) = update.progress {
            record.progress = record.progress.max(progress.min(100));
        }
        if let Some(status) = update.status {
            record.status = status;
            if status.is_terminal() && record.end_time.is_none() {
                record.end_time = Some(Utc::now());
            }
        }
        if let Some(step) = update.step {
            record.current_step = step;
        }
        if let Some(message) = update.message {
            record.log.push(message);
        }
        if let Some(error) = update.error {
            record.error = Some(error);
        }
        record.last_update = Utc::now();

        record.clone()
    }

    /// Read a task's record, or `None` if the task was never started
    /// (or has been swept).
    pub fn get_progress(&self, task_id: &str) -> Option<ProgressRecord> {
        self.records().get(task_id).cloned()
    }

    /// Mark a task finished.
    ///
    /// Success forces `progress` to 100 and status to `completed`; failure
    /// sets status to `failed` and keeps the last progress value. Either way
    /// `end_time` is recorded. Unknown ids self-heal like
    /// [`ProgressStore::update_progress`].
    pub fn finish_task(
        &self,
        task_id: &str,
        success: bool,
        error: Option<String>,
    ) -> ProgressRecord {
        let mut records = self.records();
        let record = records
            .entry(task_id.to_string())
            .or_insert_with(|| ProgressRecord::new(task_id));

        let now = Utc::now();
        if success {
            record.status = TaskStatus::Completed;
            record.progress = 100;
            record.log.push("Task completed".to_string());
        } else {
            record.status = TaskStatus::Failed;
            record.log.push("Task failed".to_string());
        }
        if let Some(error) = error {
            record.error = Some(error);
        }
        record.end_time = Some(now);
        record.last_update = now;

        record.clone()
    }

    /// Remove records whose `last_update` is older than `max_age`.
    ///
    /// Returns the number of records removed.
    pub fn clean_old_tasks(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, record| record.last_update > cutoff);
        let removed = before - records.len();
        if removed > 0 {
            tracing::info!(removed = removed, "Swept stale progress records");
        }
        removed
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Whether the store has no tracked tasks.
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_task_initializes_record() {
        let store = ProgressStore::new();
        let record = store.start_task("t1");

        assert_eq!(record.task_id, "t1");
        assert_eq!(record.status, TaskStatus::Initializing);
        assert_eq!(record.progress, 0);
        assert_eq!(record.log, vec!["Task started".to_string()]);
        assert!(record.error.is_none());
        assert!(record.end_time.is_none());
    }

    #[test]
    fn test_start_task_twice_reinitializes() {
        let store = ProgressStore::new();
        store.start_task("t1");
        store.update_progress("t1", ProgressUpdate::new().progress(50));

        let record = store.start_task("t1");
        assert_eq!(record.progress, 0);
        assert_eq!(record.status, TaskStatus::Initializing);
    }

    #[test]
    fn test_update_applies_only_supplied_fields() {
        let store = ProgressStore::new();
        store.start_task("t1");

        let record = store.update_progress(
            "t1",
            ProgressUpdate::new()
                .progress(25)
                .status(TaskStatus::Planning),
        );
        assert_eq!(record.progress, 25);
        assert_eq!(record.status, TaskStatus::Planning);
        assert_eq!(record.current_step, "Task started");

        let record = store.update_progress("t1", ProgressUpdate::new().step("Analyzing docs"));
        assert_eq!(record.progress, 25);
        assert_eq!(record.status, TaskStatus::Planning);
        assert_eq!(record.current_step, "Analyzing docs");
    }

    #[test]
    fn test_update_self_heals_unknown_task() {
        let store = ProgressStore::new();

        let record = store.update_progress(
            "never-started",
            ProgressUpdate::new().progress(50).status(TaskStatus::Coding),
        );

        assert_eq!(record.task_id, "never-started");
        assert_eq!(record.progress, 50);
        assert_eq!(record.status, TaskStatus::Coding);
        assert!(store.get_progress("never-started").is_some());
    }

    #[test]
    fn test_progress_never_decreases() {
        let store = ProgressStore::new();
        store.start_task("t1");

        store.update_progress("t1", ProgressUpdate::new().progress(75));
        let record = store.update_progress("t1", ProgressUpdate::new().progress(25));

        assert_eq!(record.progress, 75);
    }

    #[test]
    fn test_progress_clamped_to_100() {
        let store = ProgressStore::new();
        store.start_task("t1");

        let record = store.update_progress("t1", ProgressUpdate::new().progress(250));
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn test_messages_append_to_log() {
        let store = ProgressStore::new();
        store.start_task("t1");

        store.update_progress("t1", ProgressUpdate::new().message("step one"));
        let record = store.update_progress("t1", ProgressUpdate::new().message("step two"));

        assert_eq!(
            record.log,
            vec![
                "Task started".to_string(),
                "step one".to_string(),
                "step two".to_string()
            ]
        );
    }

    #[test]
    fn test_get_progress_absent_is_none() {
        let store = ProgressStore::new();
        assert!(store.get_progress("missing").is_none());
    }

    #[test]
    fn test_finish_task_success_forces_completion() {
        let store = ProgressStore::new();
        store.start_task("t1");
        store.update_progress("t1", ProgressUpdate::new().progress(90));

        let record = store.finish_task("t1", true, None);

        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.progress, 100);
        assert!(record.end_time.is_some());
    }

    #[test]
    fn test_finish_task_failure_keeps_progress() {
        let store = ProgressStore::new();
        store.start_task("t1");
        store.update_progress("t1", ProgressUpdate::new().progress(50));

        let record = store.finish_task("t1", false, Some("planning exploded".to_string()));

        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.progress, 50);
        assert_eq!(record.error.as_deref(), Some("planning exploded"));
        assert!(record.end_time.is_some());
    }

    #[test]
    fn test_terminal_status_update_records_end_time() {
        let store = ProgressStore::new();
        store.start_task("t1");

        let record = store.update_progress(
            "t1",
            ProgressUpdate::new()
                .status(TaskStatus::Timeout)
                .error("deadline expired"),
        );

        assert_eq!(record.status, TaskStatus::Timeout);
        assert!(record.end_time.is_some());
        assert_eq!(record.error.as_deref(), Some("deadline expired"));
    }

    #[test]
    fn test_clean_old_tasks_zero_age_removes_all() {
        let store = ProgressStore::new();
        store.start_task("t1");
        store.start_task("t2");

        let removed = store.clean_old_tasks(Duration::zero());

        assert_eq!(removed, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clean_old_tasks_large_age_removes_none() {
        let store = ProgressStore::new();
        store.start_task("t1");
        store.start_task("t2");

        let removed = store.clean_old_tasks(Duration::days(365));

        assert_eq!(removed, 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let store = ProgressStore::new();
        let clone = store.clone();

        store.start_task("t1");
        clone.update_progress("t1", ProgressUpdate::new().progress(40));

        assert_eq!(store.get_progress("t1").map(|r| r.progress), Some(40));
    }

    #[test]
    fn test_concurrent_updates_do_not_corrupt() {
        let store = ProgressStore::new();
        store.start_task("shared");

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for step in 0..50 {
                    store.update_progress(
                        "shared",
                        ProgressUpdate::new().message(format!("worker {} step {}", i, step)),
                    );
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }

        let record = store.get_progress("shared").expect("record should exist");
        // "Task started" plus one line per worker step.
        assert_eq!(record.log.len(), 1 + 8 * 50);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Validating).expect("serialize status");
        assert_eq!(json, "\"validating\"");
        assert_eq!(TaskStatus::Timeout.to_string(), "timeout");
    }
}
