use std::path::Path;

use async_trait::async_trait;
use indexmap::IndexMap;
use log::{debug, info};
use memcast_common::config::AppConfig;
use memcast_server::actor::{ActorHandle, ActorSystem};
use tokio::sync::Mutex;

use crate::cluster::{ClusterMembership, RemoteExecutor};
use crate::error::{ExecutionError, ExecutionResult};
use crate::id::{IdGenerator, TaskId, WorkerId};
use crate::task::TaskHandle;
use crate::worker::{
    WorkerActor, WorkerCall, WorkerEnvironment, WorkerEvent, WorkerOptions, WorkerReply,
};

const DEFAULT_WARM_CHUNK_SIZE: usize = 1 << 20;

struct LocalWorker {
    environment: WorkerEnvironment,
    handle: ActorHandle<WorkerActor>,
}

struct LocalClusterState {
    system: ActorSystem,
    workers: IndexMap<WorkerId, LocalWorker>,
    worker_id_generator: IdGenerator<WorkerId>,
    task_id_generator: IdGenerator<TaskId>,
}

/// A cluster whose workers are actors running in the current process.
/// Each worker carries its own environment so that multiple hosts can be simulated.
pub struct LocalCluster {
    state: Mutex<LocalClusterState>,
    warm_chunk_size: usize,
}

impl LocalCluster {
    pub fn builder() -> LocalClusterBuilder {
        LocalClusterBuilder::new()
    }

    /// Builds a cluster from the configuration, placing the home directory of each
    /// simulated host under the root directory.
    pub async fn from_config(config: &AppConfig, root: &Path) -> ExecutionResult<Self> {
        if config.cluster.hosts == 0 || config.cluster.workers_per_host == 0 {
            return Err(ExecutionError::invalid(
                "the cluster must have at least one host and one worker per host",
            ));
        }
        let mut builder =
            LocalCluster::builder().warm_chunk_size(config.host_dump.warm_chunk_size);
        for i in 0..config.cluster.hosts {
            let hostname = format!("host-{i}");
            let home_dir = root.join(&hostname);
            builder = builder.host(
                WorkerEnvironment::new(hostname, home_dir),
                config.cluster.workers_per_host,
            );
        }
        builder.build().await
    }

    /// Starts a new worker with the given environment.
    pub async fn add_worker(&self, environment: WorkerEnvironment) -> ExecutionResult<WorkerId> {
        let mut state = self.state.lock().await;
        let worker_id = state.worker_id_generator.next()?;
        let options = WorkerOptions::new(worker_id, environment.clone(), self.warm_chunk_size);
        let handle = state.system.spawn::<WorkerActor>(options);
        debug!("started worker {worker_id} on {}", environment.hostname);
        state.workers.insert(
            worker_id,
            LocalWorker {
                environment,
                handle,
            },
        );
        Ok(worker_id)
    }

    /// Removes the worker from the cluster.
    /// Tasks already submitted to the worker still run to completion.
    pub async fn stop_worker(&self, worker: WorkerId) -> ExecutionResult<()> {
        let mut state = self.state.lock().await;
        let Some(worker) = state.workers.shift_remove(&worker) else {
            return Err(ExecutionError::WorkerNotFound(worker));
        };
        let _ = worker.handle.send(WorkerEvent::Shutdown).await;
        Ok(())
    }

    pub async fn environment(&self, worker: WorkerId) -> Option<WorkerEnvironment> {
        let state = self.state.lock().await;
        state.workers.get(&worker).map(|x| x.environment.clone())
    }

    /// Stops all workers and waits for them to terminate.
    pub async fn shutdown(&self) -> ExecutionResult<()> {
        let mut state = self.state.lock().await;
        let workers = state.workers.drain(..).map(|(_, x)| x).collect::<Vec<_>>();
        for worker in workers {
            let _ = worker.handle.send(WorkerEvent::Shutdown).await;
        }
        state.system.join().await;
        info!("local cluster stopped");
        Ok(())
    }
}

#[async_trait]
impl ClusterMembership for LocalCluster {
    async fn workers(&self) -> ExecutionResult<Vec<WorkerId>> {
        let state = self.state.lock().await;
        Ok(state
            .workers
            .iter()
            .filter(|(_, x)| !x.handle.is_stopped())
            .map(|(id, _)| *id)
            .collect())
    }
}

#[async_trait]
impl RemoteExecutor for LocalCluster {
    async fn apply(
        &self,
        worker: WorkerId,
        call: WorkerCall,
    ) -> ExecutionResult<TaskHandle<WorkerReply>> {
        let (handle, task_id) = {
            let mut state = self.state.lock().await;
            let task_id = state.task_id_generator.next()?;
            let Some(worker) = state.workers.get(&worker) else {
                return Err(ExecutionError::WorkerNotFound(worker));
            };
            (worker.handle.clone(), task_id)
        };
        let (task, reporter) = TaskHandle::new(task_id, worker);
        handle
            .send(WorkerEvent::RunTask { call, reporter })
            .await?;
        Ok(task)
    }
}

pub struct LocalClusterBuilder {
    hosts: Vec<(WorkerEnvironment, usize)>,
    warm_chunk_size: usize,
}

impl LocalClusterBuilder {
    fn new() -> Self {
        Self {
            hosts: vec![],
            warm_chunk_size: DEFAULT_WARM_CHUNK_SIZE,
        }
    }

    /// Adds a host running the given number of workers.
    pub fn host(mut self, environment: WorkerEnvironment, workers: usize) -> Self {
        self.hosts.push((environment, workers));
        self
    }

    pub fn warm_chunk_size(mut self, size: usize) -> Self {
        self.warm_chunk_size = size.max(1);
        self
    }

    /// Starts the workers host by host.
    /// This must be called within a tokio runtime.
    pub async fn build(self) -> ExecutionResult<LocalCluster> {
        let cluster = LocalCluster {
            state: Mutex::new(LocalClusterState {
                system: ActorSystem::new(),
                workers: IndexMap::new(),
                worker_id_generator: IdGenerator::new(),
                task_id_generator: IdGenerator::new(),
            }),
            warm_chunk_size: self.warm_chunk_size,
        };
        for (environment, workers) in self.hosts {
            for _ in 0..workers {
                cluster.add_worker(environment.clone()).await?;
            }
        }
        Ok(cluster)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cluster::{apply_all, gather};
    use crate::task::TaskStatus;

    async fn two_host_cluster() -> ExecutionResult<LocalCluster> {
        LocalCluster::builder()
            .host(WorkerEnvironment::new("a", "/tmp/a"), 2)
            .host(WorkerEnvironment::new("b", "/tmp/b"), 1)
            .build()
            .await
    }

    #[tokio::test]
    async fn test_local_cluster_hostnames() -> ExecutionResult<()> {
        let cluster = two_host_cluster().await?;
        let workers = cluster.workers().await?;
        assert_eq!(workers.len(), 3);
        let handles = apply_all(&cluster, &workers, &WorkerCall::Hostname).await?;
        let hostnames = gather(&handles)
            .await?
            .into_iter()
            .map(|(_, x)| x.into_hostname())
            .collect::<ExecutionResult<Vec<_>>>()?;
        assert_eq!(hostnames, vec!["a", "a", "b"]);
        cluster.shutdown().await
    }

    #[tokio::test]
    async fn test_local_cluster_remote_failure() -> ExecutionResult<()> {
        let cluster = two_host_cluster().await?;
        let workers = cluster.workers().await?;
        let handle = cluster
            .apply(
                workers[1],
                WorkerCall::Fail {
                    message: "boom".to_string(),
                },
            )
            .await?;
        let result = handle.get().await;
        assert!(
            matches!(result, Err(ExecutionError::RemoteTaskError { worker, ref message, .. })
                if worker == workers[1] && message.contains("boom"))
        );
        cluster.shutdown().await
    }

    #[tokio::test]
    async fn test_local_cluster_runs_tasks_in_order() -> ExecutionResult<()> {
        let cluster = two_host_cluster().await?;
        let workers = cluster.workers().await?;
        let slow = cluster
            .apply(
                workers[0],
                WorkerCall::Sleep {
                    duration: Duration::from_millis(50),
                },
            )
            .await?;
        let fast = cluster.apply(workers[0], WorkerCall::Hostname).await?;
        fast.wait().await;
        assert_eq!(slow.status(), TaskStatus::Succeeded);
        cluster.shutdown().await
    }

    #[tokio::test]
    async fn test_local_cluster_abort_pending_task() -> ExecutionResult<()> {
        let cluster = two_host_cluster().await?;
        let workers = cluster.workers().await?;
        let slow = cluster
            .apply(
                workers[2],
                WorkerCall::Sleep {
                    duration: Duration::from_secs(60),
                },
            )
            .await?;
        let queued = cluster.apply(workers[2], WorkerCall::Hostname).await?;
        slow.abort();
        queued.abort();
        assert!(matches!(
            queued.get().await,
            Err(ExecutionError::TaskAborted { .. })
        ));
        // The worker keeps serving tasks after the abort.
        let next = cluster.apply(workers[2], WorkerCall::Hostname).await?;
        assert_eq!(next.get().await?, WorkerReply::Hostname("b".to_string()));
        cluster.shutdown().await
    }

    #[tokio::test]
    async fn test_local_cluster_stop_worker() -> ExecutionResult<()> {
        let cluster = two_host_cluster().await?;
        let workers = cluster.workers().await?;
        cluster.stop_worker(workers[0]).await?;
        assert_eq!(cluster.workers().await?, workers[1..].to_vec());
        assert!(matches!(
            cluster.apply(workers[0], WorkerCall::Hostname).await,
            Err(ExecutionError::WorkerNotFound(_))
        ));
        assert!(cluster.environment(workers[0]).await.is_none());
        cluster.shutdown().await
    }
}
