use std::future::Future;

use log::debug;

use crate::error::ExecutionResult;
use crate::task::TaskReporter;

/// Drives the execution of a task and reports its outcome,
/// stopping early if the task is aborted.
pub struct TaskMonitor<T> {
    reporter: TaskReporter<T>,
}

impl<T> TaskMonitor<T> {
    pub fn new(reporter: TaskReporter<T>) -> Self {
        Self { reporter }
    }

    pub async fn run<F>(self, execute: F)
    where
        F: Future<Output = ExecutionResult<T>>,
    {
        let Self { mut reporter } = self;
        let task_id = reporter.task_id();
        if !reporter.start() {
            debug!("task {task_id} was aborted before it started");
            return;
        }
        let Some(cancel) = reporter.take_cancel() else {
            return;
        };
        tokio::select! {
            result = execute => match result {
                Ok(value) => reporter.succeed(value),
                Err(e) => reporter.fail(e.to_string()),
            },
            _ = cancel => {
                debug!("task {task_id} aborted");
            }
        }
    }
}
