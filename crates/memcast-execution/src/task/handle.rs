use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use crate::error::{ExecutionError, ExecutionResult};
use crate::id::{TaskId, WorkerId};
use crate::task::{AbortOutcome, Task, TaskStatus};

enum TaskState<T> {
    Pending {
        cancel: Option<oneshot::Sender<()>>,
    },
    Running {
        cancel: Option<oneshot::Sender<()>>,
    },
    Succeeded {
        value: T,
        finished_at: Instant,
    },
    Failed {
        message: String,
        finished_at: Instant,
    },
    Aborted {
        finished_at: Instant,
    },
}

impl<T> TaskState<T> {
    fn status(&self) -> TaskStatus {
        match self {
            TaskState::Pending { .. } => TaskStatus::Pending,
            TaskState::Running { .. } => TaskStatus::Running,
            TaskState::Succeeded { .. } => TaskStatus::Succeeded,
            TaskState::Failed { .. } => TaskStatus::Failed,
            TaskState::Aborted { .. } => TaskStatus::Aborted,
        }
    }

    fn finished_at(&self) -> Option<Instant> {
        match self {
            TaskState::Pending { .. } | TaskState::Running { .. } => None,
            TaskState::Succeeded { finished_at, .. }
            | TaskState::Failed { finished_at, .. }
            | TaskState::Aborted { finished_at } => Some(*finished_at),
        }
    }
}

struct TaskCell<T> {
    task_id: TaskId,
    worker: WorkerId,
    submitted_at: Instant,
    state: Mutex<TaskState<T>>,
    ready: watch::Sender<bool>,
}

impl<T> TaskCell<T> {
    fn state(&self) -> MutexGuard<'_, TaskState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves an active task into a terminal state.
    /// Returns `false` if the task had already reached a terminal state.
    fn finish(&self, terminal: TaskState<T>) -> bool {
        let mut state = self.state();
        if state.status().is_terminal() {
            return false;
        }
        let previous = mem::replace(&mut *state, terminal);
        if let TaskState::Pending { cancel } | TaskState::Running { cancel } = previous {
            if let Some(cancel) = cancel {
                let _ = cancel.send(());
            }
        }
        drop(state);
        self.ready.send_replace(true);
        true
    }
}

/// The submitter's view of a remote task.
pub struct TaskHandle<T> {
    cell: Arc<TaskCell<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task_id", &self.cell.task_id)
            .field("worker", &self.cell.worker)
            .field("status", &self.cell.state().status())
            .finish()
    }
}

impl<T> TaskHandle<T> {
    /// Creates a pending task, returning the handle for the submitter
    /// and the reporter for the executing side.
    pub fn new(task_id: TaskId, worker: WorkerId) -> (Self, TaskReporter<T>) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (ready, _) = watch::channel(false);
        let cell = Arc::new(TaskCell {
            task_id,
            worker,
            submitted_at: Instant::now(),
            state: Mutex::new(TaskState::Pending {
                cancel: Some(cancel_tx),
            }),
            ready,
        });
        let reporter = TaskReporter {
            cell: Arc::clone(&cell),
            cancel: Some(cancel_rx),
        };
        (Self { cell }, reporter)
    }

    pub fn task_id(&self) -> TaskId {
        self.cell.task_id
    }

    pub fn worker(&self) -> WorkerId {
        self.cell.worker
    }

    pub fn status(&self) -> TaskStatus {
        self.cell.state().status()
    }

    pub fn is_ready(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_aborted(&self) -> bool {
        self.status() == TaskStatus::Aborted
    }

    /// Requests cooperative cancellation.
    /// This is a no-op if the task has already reached a terminal state.
    pub fn abort(&self) -> AbortOutcome {
        match self.cell.state().status() {
            TaskStatus::Aborted => return AbortOutcome::AlreadyAborted,
            TaskStatus::Succeeded | TaskStatus::Failed => return AbortOutcome::AlreadyFinished,
            TaskStatus::Pending | TaskStatus::Running => {}
        }
        // The task may finish between the check above and the transition below.
        if self.cell.finish(TaskState::Aborted {
            finished_at: Instant::now(),
        }) {
            AbortOutcome::Requested
        } else if self.is_aborted() {
            AbortOutcome::AlreadyAborted
        } else {
            AbortOutcome::AlreadyFinished
        }
    }

    pub async fn wait(&self) {
        let mut ready = self.cell.ready.subscribe();
        // The sender lives as long as the cell, so the error case cannot happen here.
        let _ = ready.wait_for(|x| *x).await;
    }

    pub fn elapsed(&self) -> Duration {
        let finished_at = self.cell.state().finished_at();
        finished_at
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.cell.submitted_at)
    }

    fn error(&self, status: TaskStatus, message: Option<String>) -> ExecutionError {
        match status {
            TaskStatus::Aborted => ExecutionError::TaskAborted {
                worker: self.worker(),
                task: self.task_id(),
            },
            _ => ExecutionError::RemoteTaskError {
                worker: self.worker(),
                task: self.task_id(),
                message: message.unwrap_or_default(),
            },
        }
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Returns the result if the task is ready, without blocking.
    pub fn try_get(&self) -> Option<ExecutionResult<T>> {
        let state = self.cell.state();
        match &*state {
            TaskState::Pending { .. } | TaskState::Running { .. } => None,
            TaskState::Succeeded { value, .. } => Some(Ok(value.clone())),
            TaskState::Failed { message, .. } => {
                let message = message.clone();
                drop(state);
                Some(Err(self.error(TaskStatus::Failed, Some(message))))
            }
            TaskState::Aborted { .. } => {
                drop(state);
                Some(Err(self.error(TaskStatus::Aborted, None)))
            }
        }
    }

    /// Waits for the task and returns its result, surfacing the remote error if any.
    pub async fn get(&self) -> ExecutionResult<T> {
        loop {
            if let Some(result) = self.try_get() {
                return result;
            }
            self.wait().await;
        }
    }
}

#[async_trait]
impl<T> Task for TaskHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn task_id(&self) -> TaskId {
        TaskHandle::task_id(self)
    }

    fn worker(&self) -> WorkerId {
        TaskHandle::worker(self)
    }

    fn status(&self) -> TaskStatus {
        TaskHandle::status(self)
    }

    fn abort(&self) -> AbortOutcome {
        TaskHandle::abort(self)
    }

    async fn wait(&self) -> ExecutionResult<()> {
        self.get().await.map(|_| ())
    }

    fn elapsed(&self) -> Duration {
        TaskHandle::elapsed(self)
    }
}

/// The executing side of a remote task.
///
/// A reporter dropped before reporting an outcome fails the task,
/// so that waiters are never left blocked by a worker that went away.
pub struct TaskReporter<T> {
    cell: Arc<TaskCell<T>>,
    cancel: Option<oneshot::Receiver<()>>,
}

impl<T> TaskReporter<T> {
    pub fn task_id(&self) -> TaskId {
        self.cell.task_id
    }

    pub fn is_aborted(&self) -> bool {
        self.cell.state().status() == TaskStatus::Aborted
    }

    /// Marks the task as running. Returns `false` if the task is no longer pending.
    pub fn start(&self) -> bool {
        let mut state = self.cell.state();
        match &mut *state {
            TaskState::Pending { cancel } => {
                let cancel = cancel.take();
                *state = TaskState::Running { cancel };
                true
            }
            _ => false,
        }
    }

    /// Takes the cancellation signal, which completes when the task is aborted.
    pub(crate) fn take_cancel(&mut self) -> Option<oneshot::Receiver<()>> {
        self.cancel.take()
    }

    pub fn succeed(self, value: T) {
        self.cell.finish(TaskState::Succeeded {
            value,
            finished_at: Instant::now(),
        });
    }

    pub fn fail(self, message: impl Into<String>) {
        self.cell.finish(TaskState::Failed {
            message: message.into(),
            finished_at: Instant::now(),
        });
    }
}

impl<T> Drop for TaskReporter<T> {
    fn drop(&mut self) {
        self.cell.finish(TaskState::Failed {
            message: "the worker stopped before the task completed".to_string(),
            finished_at: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64) -> (TaskHandle<u32>, TaskReporter<u32>) {
        TaskHandle::new(TaskId::from(id), WorkerId::from(1))
    }

    #[tokio::test]
    async fn test_task_succeeds() -> ExecutionResult<()> {
        let (handle, reporter) = task(1);
        assert_eq!(handle.status(), TaskStatus::Pending);
        assert!(reporter.start());
        assert_eq!(handle.status(), TaskStatus::Running);
        assert!(handle.try_get().is_none());
        reporter.succeed(42);
        assert!(handle.is_ready());
        assert_eq!(handle.get().await?, 42);
        assert_eq!(handle.abort(), AbortOutcome::AlreadyFinished);
        assert_eq!(handle.status(), TaskStatus::Succeeded);
        Ok(())
    }

    #[tokio::test]
    async fn test_task_failure_is_surfaced() {
        let (handle, reporter) = task(2);
        reporter.start();
        reporter.fail("boom");
        let result = handle.get().await;
        assert!(matches!(
            result,
            Err(ExecutionError::RemoteTaskError { ref message, .. }) if message == "boom"
        ));
        assert!(Task::wait(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_abort_pending_task() {
        let (handle, mut reporter) = task(3);
        let cancel = reporter.take_cancel();
        assert_eq!(handle.abort(), AbortOutcome::Requested);
        assert_eq!(handle.abort(), AbortOutcome::AlreadyAborted);
        assert!(handle.is_aborted());
        assert!(handle.is_ready());
        assert!(reporter.is_aborted());
        assert!(!reporter.start());
        if let Some(cancel) = cancel {
            assert!(cancel.await.is_ok());
        }
        // A late completion report is ignored.
        reporter.succeed(7);
        assert!(matches!(
            handle.get().await,
            Err(ExecutionError::TaskAborted { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_reporter_fails_task() {
        let (handle, reporter) = task(4);
        drop(reporter);
        assert_eq!(handle.status(), TaskStatus::Failed);
        assert!(handle.get().await.is_err());
    }

    #[tokio::test]
    async fn test_wait_blocks_until_ready() -> ExecutionResult<()> {
        let (handle, reporter) = task(5);
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.get().await })
        };
        tokio::task::yield_now().await;
        reporter.start();
        reporter.succeed(9);
        assert_eq!(waiter.await??, 9);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_stops_at_completion() {
        let (handle, reporter) = task(6);
        tokio::time::advance(Duration::from_secs(2)).await;
        reporter.succeed(1);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(handle.elapsed(), Duration::from_secs(2));
    }
}
