use std::sync::PoisonError;

use memcast_common::error::CommonError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio::task::JoinError;

use crate::id::{TaskId, WorkerId};

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("cluster membership query failed: {0}")]
    MembershipQueryFailed(String),
    #[error("task {task} failed on worker {worker}: {message}")]
    RemoteTaskError {
        worker: WorkerId,
        task: TaskId,
        message: String,
    },
    #[error("task {task} on worker {worker} was aborted")]
    TaskAborted { worker: WorkerId, task: TaskId },
    #[error("failed to write data to {} datastore(s): {}", .0.len(), format_failures(.0))]
    WriteFailed(Vec<(String, String)>),
    #[error("worker {0} not found")]
    WorkerNotFound(WorkerId),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    CommonError(#[from] CommonError),
    #[error("internal error: {0}")]
    InternalError(String),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(datastore_id, message)| format!("{datastore_id}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ExecutionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ExecutionError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ExecutionError::InternalError(message.into())
    }
}

impl From<JoinError> for ExecutionError {
    fn from(error: JoinError) -> Self {
        ExecutionError::InternalError(error.to_string())
    }
}

impl<T> From<PoisonError<T>> for ExecutionError {
    fn from(error: PoisonError<T>) -> Self {
        ExecutionError::InternalError(error.to_string())
    }
}

impl<T> From<SendError<T>> for ExecutionError {
    fn from(error: SendError<T>) -> Self {
        ExecutionError::InternalError(error.to_string())
    }
}
