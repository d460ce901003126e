//! The async task subsystem (§4.8, §5): every `spawn` submits a function invocation to run as a
//! `may` green thread against its own deep-copied globals snapshot. Grounded on the teacher's
//! `scheduler.rs` (atomic lifecycle counters, condvar-based wait) and `weave.rs` (`may::coroutine`
//! spawn, channel/registry-per-handle pattern) but simplified: tasks here are fire-and-settle
//! (one result, not a bidirectional yield/resume stream), so a `Mutex<TaskOutcome>` + `Condvar`
//! replaces weave's paired mpmc channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use yasny_core::value::{TaskId, Value};
use yasny_core::Diagnostic;

#[derive(Clone)]
enum TaskOutcome {
    Pending,
    Running,
    Finished(Result<Value, Diagnostic>),
    Cancelled,
}

struct TaskState {
    outcome: Mutex<TaskOutcome>,
    condvar: Condvar,
}

impl TaskState {
    fn new() -> Self {
        TaskState { outcome: Mutex::new(TaskOutcome::Pending), condvar: Condvar::new() }
    }
}

/// Owns every in-flight task's state. One instance per VM; created lazily on first `spawn` (§3
/// "Lifecycles"), torn down with the VM.
pub struct TaskManager {
    tasks: Mutex<HashMap<u64, Arc<TaskState>>>,
    next_id: AtomicU64,
}

impl Default for TaskManager {
    fn default() -> Self {
        TaskManager { tasks: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }
}

impl TaskManager {
    pub fn new() -> Arc<TaskManager> {
        Arc::new(TaskManager::default())
    }

    /// Registers a new task and runs `body` on a `may` coroutine. `body` is expected to perform
    /// the deep-copied-globals invocation itself (the caller already snapshotted globals before
    /// calling this, per the "globals snapshot for tasks" design note, §9).
    pub fn spawn(self: &Arc<Self>, body: impl FnOnce() -> Result<Value, Diagnostic> + Send + 'static) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(TaskState::new());
        self.tasks.lock().expect("task registry poisoned").insert(id, Arc::clone(&state));

        tracing::debug!(task_id = id, "spawning task");
        unsafe {
            may::coroutine::spawn(move || {
                {
                    let mut outcome = state.outcome.lock().expect("task state poisoned");
                    match *outcome {
                        TaskOutcome::Cancelled => return,
                        _ => *outcome = TaskOutcome::Running,
                    }
                }
                let result = body();
                tracing::debug!(task_id = id, ok = result.is_ok(), "task finished");
                let mut outcome = state.outcome.lock().expect("task state poisoned");
                *outcome = TaskOutcome::Finished(result);
                state.condvar.notify_all();
            });
        }
        TaskId(id)
    }

    fn state(&self, task: TaskId) -> Result<Arc<TaskState>, Diagnostic> {
        self.tasks
            .lock()
            .expect("task registry poisoned")
            .get(&task.0)
            .cloned()
            .ok_or_else(|| Diagnostic::new(format!("неизвестная задача: {task}")))
    }

    pub fn done(&self, task: TaskId) -> Result<bool, Diagnostic> {
        let state = self.state(task)?;
        let outcome = state.outcome.lock().expect("task state poisoned");
        Ok(matches!(*outcome, TaskOutcome::Finished(_) | TaskOutcome::Cancelled))
    }

    /// `cancel` succeeds (returns `true`) only if the task had not yet started (§5).
    pub fn cancel(&self, task: TaskId) -> Result<bool, Diagnostic> {
        let state = self.state(task)?;
        let mut outcome = state.outcome.lock().expect("task state poisoned");
        match *outcome {
            TaskOutcome::Pending => {
                *outcome = TaskOutcome::Cancelled;
                tracing::debug!(task_id = task.0, "cancelled before start");
                Ok(true)
            }
            _ => {
                tracing::warn!(task_id = task.0, "cancel raced a task that already started");
                Ok(false)
            }
        }
    }

    /// Blocks the caller (cooperatively, via `may`'s condvar, never pinning an OS thread) until
    /// the task settles or `timeout_ms` elapses. Cancellation and timeout are distinct errors.
    pub fn wait(&self, task: TaskId, timeout_ms: Option<u64>) -> Result<Value, Diagnostic> {
        let state = self.state(task)?;
        let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut outcome = state.outcome.lock().expect("task state poisoned");
        loop {
            match &*outcome {
                TaskOutcome::Finished(result) => return result.clone(),
                TaskOutcome::Cancelled => return Err(Diagnostic::new(format!("задача {task} отменена"))),
                TaskOutcome::Pending | TaskOutcome::Running => {}
            }
            match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(Diagnostic::new(format!("истекло время ожидания задачи {task}")));
                    }
                    let (guard, timeout_result) = state
                        .condvar
                        .wait_timeout(outcome, remaining)
                        .expect("task state poisoned");
                    outcome = guard;
                    if timeout_result.timed_out() {
                        if let TaskOutcome::Finished(result) = &*outcome {
                            return result.clone();
                        }
                        return Err(Diagnostic::new(format!("истекло время ожидания задачи {task}")));
                    }
                }
                None => {
                    outcome = state.condvar.wait(outcome).expect("task state poisoned");
                }
            }
        }
    }

    /// Waits on every task in order, short-circuiting on the first one that fails (§6 "Errors
    /// surface from the first failing task").
    pub fn wait_all(&self, tasks: &[TaskId], timeout_ms: Option<u64>) -> Result<Vec<Value>, Diagnostic> {
        tasks.iter().map(|&task| self.wait(task, timeout_ms)).collect()
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    // `may::config().set_workers(..)` mutates process-global scheduler state, so every test that
    // touches it must run serially (matches the teacher's `#[serial]` use for global env-var state).

    #[test]
    #[serial]
    fn spawned_task_can_be_waited_on() {
        may::config().set_workers(2);
        let manager = TaskManager::new();
        let id = manager.spawn(|| Ok(Value::Int(42)));
        assert_eq!(manager.wait(id, None).unwrap(), Value::Int(42));
        assert!(manager.done(id).unwrap());
    }

    #[test]
    #[serial]
    fn cancel_before_start_prevents_execution() {
        may::config().set_workers(2);
        let manager = TaskManager::new();
        let state_check = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&state_check);
        let id = manager.spawn(move || {
            *flag.lock().unwrap() = true;
            Ok(Value::Null)
        });
        let cancelled = manager.cancel(id).unwrap();
        assert!(cancelled || *state_check.lock().unwrap());
    }

    #[test]
    fn wait_on_unknown_task_is_an_error() {
        let manager = TaskManager::new();
        assert!(manager.wait(TaskId(999), None).is_err());
    }

    #[test]
    #[serial]
    fn failing_task_surfaces_its_error_on_wait() {
        may::config().set_workers(2);
        let manager = TaskManager::new();
        let id = manager.spawn(|| Err(Diagnostic::new("сбой задачи")));
        let err = manager.wait(id, None).unwrap_err();
        assert_eq!(err.message, "сбой задачи");
    }

    #[test]
    #[serial]
    fn wait_all_short_circuits_on_first_failure() {
        may::config().set_workers(2);
        let manager = TaskManager::new();
        let ok_id = manager.spawn(|| Ok(Value::Int(1)));
        let err_id = manager.spawn(|| Err(Diagnostic::new("боом")));
        let result = manager.wait_all(&[ok_id, err_id], None);
        assert!(result.is_err());
    }
}
