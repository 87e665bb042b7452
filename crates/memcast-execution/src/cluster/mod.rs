mod local;

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::error::{ExecutionError, ExecutionResult};
use crate::id::WorkerId;
use crate::task::TaskHandle;
use crate::worker::{WorkerCall, WorkerReply};

pub use local::{LocalCluster, LocalClusterBuilder};

/// Lists the workers currently in the cluster.
#[async_trait]
pub trait ClusterMembership: Send + Sync {
    /// The worker identifiers, in a stable order.
    async fn workers(&self) -> ExecutionResult<Vec<WorkerId>>;
}

/// Submits calls to individual workers.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Submits the call to the worker without waiting for it to run.
    async fn apply(
        &self,
        worker: WorkerId,
        call: WorkerCall,
    ) -> ExecutionResult<TaskHandle<WorkerReply>>;
}

pub trait Cluster: ClusterMembership + RemoteExecutor {}

impl<T: ClusterMembership + RemoteExecutor + ?Sized> Cluster for T {}

/// Submits the same call to each of the workers, returning the handles in worker order.
pub async fn apply_all<C>(
    cluster: &C,
    workers: &[WorkerId],
    call: &WorkerCall,
) -> ExecutionResult<Vec<TaskHandle<WorkerReply>>>
where
    C: RemoteExecutor + ?Sized,
{
    let mut handles = Vec::with_capacity(workers.len());
    for worker in workers {
        handles.push(cluster.apply(*worker, call.clone()).await?);
    }
    Ok(handles)
}

/// Waits for all the tasks and returns their results paired with the worker.
pub async fn gather(
    handles: &[TaskHandle<WorkerReply>],
) -> ExecutionResult<Vec<(WorkerId, WorkerReply)>> {
    try_join_all(handles.iter().map(|handle| async move {
        let reply = handle.get().await?;
        Ok::<_, ExecutionError>((handle.worker(), reply))
    }))
    .await
}

/// Applies a query call on all the workers and gathers the replies.
/// Any failure is reported as a failed membership query.
pub(crate) async fn query_all<C>(
    cluster: &C,
    workers: &[WorkerId],
    call: WorkerCall,
) -> ExecutionResult<Vec<(WorkerId, WorkerReply)>>
where
    C: RemoteExecutor + ?Sized,
{
    let name = call.name();
    let handles = apply_all(cluster, workers, &call)
        .await
        .map_err(|e| ExecutionError::MembershipQueryFailed(format!("{name}: {e}")))?;
    gather(&handles)
        .await
        .map_err(|e| ExecutionError::MembershipQueryFailed(format!("{name}: {e}")))
}
