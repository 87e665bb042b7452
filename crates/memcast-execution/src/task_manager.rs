use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::error::{ExecutionError, ExecutionResult};
use crate::task::{AbortOutcome, Task};

/// Bookkeeping over a collection of remote tasks.
///
/// A manager holds either a flat list of tasks, or a list of task groups where each group
/// is one logical unit of work replicated over several data splits. The two shapes are
/// not mixed in a single manager.
///
/// Aborted tasks are excluded from every aggregate except [`TaskManager::total`] and
/// [`TaskManager::elapsed`], so the progress of a manager with aborted tasks never
/// reaches `1.0`.
#[derive(Default)]
pub struct TaskManager {
    tasks: Vec<Arc<dyn Task>>,
    task_groups: Vec<Vec<Arc<dyn Task>>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks<T, I>(tasks: I) -> Self
    where
        T: Task + 'static,
        I: IntoIterator<Item = T>,
    {
        Self {
            tasks: tasks
                .into_iter()
                .map(|x| Arc::new(x) as Arc<dyn Task>)
                .collect(),
            task_groups: vec![],
        }
    }

    pub fn from_groups<T, G, I>(groups: I) -> Self
    where
        T: Task + 'static,
        G: IntoIterator<Item = T>,
        I: IntoIterator<Item = G>,
    {
        Self {
            tasks: vec![],
            task_groups: groups
                .into_iter()
                .map(|group| {
                    group
                        .into_iter()
                        .map(|x| Arc::new(x) as Arc<dyn Task>)
                        .collect()
                })
                .collect(),
        }
    }

    pub fn push_task(&mut self, task: impl Task + 'static) -> ExecutionResult<()> {
        if !self.task_groups.is_empty() {
            return Err(ExecutionError::invalid(
                "cannot add a task to a manager of task groups",
            ));
        }
        self.tasks.push(Arc::new(task));
        Ok(())
    }

    pub fn push_group<T: Task + 'static>(
        &mut self,
        group: impl IntoIterator<Item = T>,
    ) -> ExecutionResult<()> {
        if !self.tasks.is_empty() {
            return Err(ExecutionError::invalid(
                "cannot add a task group to a manager of tasks",
            ));
        }
        self.task_groups.push(
            group
                .into_iter()
                .map(|x| Arc::new(x) as Arc<dyn Task>)
                .collect(),
        );
        Ok(())
    }

    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        &self.tasks
    }

    pub fn task_groups(&self) -> &[Vec<Arc<dyn Task>>] {
        &self.task_groups
    }

    /// The flat tasks followed by the members of every group, in order.
    pub fn all_tasks(&self, skip_aborted: bool) -> Vec<Arc<dyn Task>> {
        self.tasks
            .iter()
            .chain(self.task_groups.iter().flatten())
            .filter(|x| !(skip_aborted && x.is_aborted()))
            .cloned()
            .collect()
    }

    pub fn map_tasks<F, R>(&self, f: F, skip_aborted: bool) -> Vec<R>
    where
        F: FnMut(Arc<dyn Task>) -> R,
    {
        self.all_tasks(skip_aborted).into_iter().map(f).collect()
    }

    /// Requests cancellation of every task that is still in flight.
    /// Tasks finishing concurrently are left alone. Returns the number of abort requests.
    pub fn abort(&self) -> usize {
        let mut requested = 0;
        for task in self.all_tasks(true) {
            if task.is_ready() {
                continue;
            }
            match task.abort() {
                AbortOutcome::Requested => requested += 1,
                AbortOutcome::AlreadyFinished | AbortOutcome::AlreadyAborted => {
                    debug!("task {} finished before it could be aborted", task.task_id());
                }
            }
        }
        requested
    }

    /// Waits for every task that is not aborted.
    /// All tasks are awaited, then the first remote error in task order is returned.
    pub async fn wait(&self) -> ExecutionResult<()> {
        let mut first_error = None;
        for task in self.all_tasks(true) {
            match task.wait().await {
                Ok(()) | Err(ExecutionError::TaskAborted { .. }) => {}
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn completed_tasks(&self) -> Vec<Arc<dyn Task>> {
        self.all_tasks(true)
            .into_iter()
            .filter(|x| x.is_ready())
            .collect()
    }

    pub fn completed(&self) -> usize {
        self.map_tasks(|x| x.is_ready(), true)
            .into_iter()
            .filter(|x| *x)
            .count()
    }

    pub fn done(&self) -> bool {
        self.all_tasks(true).iter().all(|x| x.is_ready())
    }

    /// The number of tasks, including the aborted ones.
    pub fn total(&self) -> usize {
        self.tasks.len() + self.task_groups.iter().map(|x| x.len()).sum::<usize>()
    }

    pub fn progress(&self) -> f64 {
        let completed = self.completed();
        if completed == 0 {
            0.0
        } else {
            completed as f64 / self.total() as f64
        }
    }

    /// The longest elapsed time among all tasks, or zero if there is no task.
    pub fn elapsed(&self) -> Duration {
        self.all_tasks(false)
            .iter()
            .map(|x| x.elapsed())
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Aborts all in-flight tasks and forgets every task.
    pub fn reset(&mut self) {
        self.abort();
        self.tasks.clear();
        self.task_groups.clear();
    }

    pub fn report(&self) -> String {
        format!(
            "Progress: {:02}% ({:03}/{:03}), elapsed: {:.3}s",
            (100.0 * self.progress()) as u64,
            self.completed(),
            self.total(),
            self.elapsed().as_secs_f64()
        )
    }

    /// Reports progress at every interval until all tasks are done.
    pub async fn monitor<F>(&self, interval: Duration, mut on_report: F)
    where
        F: FnMut(&str),
    {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            on_report(&self.report());
            if self.done() {
                break;
            }
        }
    }
}

impl fmt::Display for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.report())
    }
}
