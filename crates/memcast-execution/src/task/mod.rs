mod handle;
mod monitor;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

pub use handle::{TaskHandle, TaskReporter};
pub use monitor::TaskMonitor;

use crate::error::ExecutionResult;
use crate::id::{TaskId, WorkerId};

/// The life cycle of a remote task.
///
/// `Pending -> Running -> {Succeeded | Failed | Aborted}`, where `Aborted`
/// can also be reached directly from `Pending`. All three final states are terminal.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Aborted
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Aborted => "aborted",
        };
        write!(f, "{name}")
    }
}

/// The result of an abort request.
/// Aborting a task that has already finished is not an error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AbortOutcome {
    Requested,
    AlreadyFinished,
    AlreadyAborted,
}

/// An in-flight remote computation, viewed without its result type.
#[async_trait]
pub trait Task: Send + Sync {
    fn task_id(&self) -> TaskId;
    fn worker(&self) -> WorkerId;
    fn status(&self) -> TaskStatus;

    /// Whether the task has reached a terminal state.
    fn is_ready(&self) -> bool {
        self.status().is_terminal()
    }

    fn is_aborted(&self) -> bool {
        self.status() == TaskStatus::Aborted
    }

    fn abort(&self) -> AbortOutcome;

    /// Waits for the task to reach a terminal state.
    /// Returns the remote error if the task failed, or an error if it was aborted.
    async fn wait(&self) -> ExecutionResult<()>;

    /// The wall-clock time since submission, up to completion if the task is ready.
    fn elapsed(&self) -> Duration;
}
