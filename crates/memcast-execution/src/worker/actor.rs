use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use memcast_common::env::expand_home;
use memcast_server::actor::{Actor, ActorAction, ActorHandle};
use tokio::sync::mpsc;

use crate::checksum::Checksum;
use crate::error::{ExecutionError, ExecutionResult};
use crate::memmap::{load_memmap, save_for_memmap, warm_file, write_atomically};
use crate::task::{TaskMonitor, TaskReporter};
use crate::worker::call::{BindingSummary, WorkerCall, WorkerReply};
use crate::worker::event::WorkerEvent;
use crate::worker::namespace::Namespace;
use crate::worker::options::WorkerOptions;

type QueuedTask = (WorkerCall, TaskReporter<WorkerReply>);

/// A worker process of the cluster.
/// Tasks submitted to the same worker run one after another in submission order.
pub struct WorkerActor {
    context: Arc<WorkerContext>,
    queue: Option<mpsc::UnboundedSender<QueuedTask>>,
}

struct WorkerContext {
    options: WorkerOptions,
    namespace: Namespace,
}

impl Actor for WorkerActor {
    type Message = WorkerEvent;
    type Options = WorkerOptions;
    type Error = ExecutionError;

    fn name() -> &'static str {
        "WorkerActor"
    }

    fn new(options: WorkerOptions) -> Self {
        Self {
            context: Arc::new(WorkerContext {
                options,
                namespace: Namespace::new(),
            }),
            queue: None,
        }
    }

    fn start(&mut self, _: &ActorHandle<Self>) -> ExecutionResult<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedTask>();
        let context = Arc::clone(&self.context);
        tokio::spawn(async move {
            while let Some((call, reporter)) = rx.recv().await {
                let context = Arc::clone(&context);
                TaskMonitor::new(reporter)
                    .run(context.execute(call))
                    .await;
            }
        });
        self.queue = Some(tx);
        debug!(
            "worker {} started on {}",
            self.context.options.worker_id, self.context.options.environment.hostname
        );
        Ok(())
    }

    fn receive(
        &mut self,
        message: WorkerEvent,
        _: &ActorHandle<Self>,
    ) -> ExecutionResult<ActorAction> {
        match message {
            WorkerEvent::RunTask { call, reporter } => {
                let Some(queue) = &self.queue else {
                    return Err(ExecutionError::internal("worker task queue is not started"));
                };
                // The reporter fails the task when it is dropped with the rejected message.
                if queue.send((call, reporter)).is_err() {
                    warn!(
                        "worker {} cannot accept more tasks",
                        self.context.options.worker_id
                    );
                }
                Ok(ActorAction::Continue)
            }
            WorkerEvent::Shutdown => Ok(ActorAction::Stop),
        }
    }

    fn stop(self) -> ExecutionResult<()> {
        debug!("worker {} stopped", self.context.options.worker_id);
        Ok(())
    }
}

async fn blocking<F, R>(f: F) -> ExecutionResult<R>
where
    F: FnOnce() -> ExecutionResult<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

impl WorkerContext {
    /// Resolves a path given by the submitter, where a leading `~` stands for
    /// the home directory of this worker.
    fn resolve(&self, path: &Path) -> PathBuf {
        expand_home(path, &self.options.environment.home_dir)
    }

    async fn execute(self: Arc<Self>, call: WorkerCall) -> ExecutionResult<WorkerReply> {
        debug!(
            "worker {} running {}",
            self.options.worker_id,
            call.name()
        );
        match call {
            WorkerCall::Hostname => Ok(WorkerReply::Hostname(
                self.options.environment.hostname.clone(),
            )),
            WorkerCall::IdentifyDatastore {
                checksum,
                identifier,
            } => {
                let environment = self.options.environment.clone();
                let record = blocking(move || identifier.identify(&environment, &checksum)).await?;
                Ok(WorkerReply::Datastore(record))
            }
            WorkerCall::SaveForMemmap { path, payload } => {
                let created = blocking(move || save_for_memmap(payload.as_bytes(), &path)).await?;
                Ok(WorkerReply::Saved { created })
            }
            WorkerCall::LoadMemmap { name, path, layout } => {
                let array = blocking(move || load_memmap(&path, &layout)).await?;
                self.namespace.bind(name, array);
                Ok(WorkerReply::Bound)
            }
            WorkerCall::FileMissing { path } => {
                let path = self.resolve(&path);
                let missing = blocking(move || Ok(!path.try_exists()?)).await?;
                Ok(WorkerReply::Missing(missing))
            }
            WorkerCall::DumpPayload { path, bytes } => {
                let path = self.resolve(&path);
                blocking(move || write_atomically(&bytes, &path)).await?;
                Ok(WorkerReply::Dumped)
            }
            WorkerCall::WarmFiles { paths } => {
                let chunk_size = self.options.warm_chunk_size;
                let paths = paths.iter().map(|x| self.resolve(x)).collect::<Vec<_>>();
                let bytes = blocking(move || {
                    paths
                        .iter()
                        .map(|path| warm_file(path, chunk_size))
                        .sum::<ExecutionResult<u64>>()
                })
                .await?;
                Ok(WorkerReply::Warmed { bytes })
            }
            WorkerCall::DescribeBinding { name } => {
                let Some(array) = self.namespace.get(&name) else {
                    return Ok(WorkerReply::Binding(None));
                };
                let summary = blocking(move || {
                    Ok(BindingSummary {
                        path: array.path().to_path_buf(),
                        layout: array.layout().clone(),
                        digest: Checksum::of_bytes(array.as_bytes()),
                    })
                })
                .await?;
                Ok(WorkerReply::Binding(Some(summary)))
            }
            WorkerCall::Sleep { duration } => {
                tokio::time::sleep(duration).await;
                Ok(WorkerReply::Done)
            }
            WorkerCall::Fail { message } => Err(ExecutionError::internal(message)),
        }
    }
}
