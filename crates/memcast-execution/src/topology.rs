use std::collections::HashSet;

use indexmap::IndexMap;
use log::debug;

use crate::cluster::{query_all, Cluster};
use crate::error::{ExecutionError, ExecutionResult};
use crate::id::WorkerId;
use crate::worker::WorkerCall;

/// Picks one worker per distinct hostname among all the workers of the cluster.
pub async fn resolve_host_view<C>(cluster: &C) -> ExecutionResult<Vec<WorkerId>>
where
    C: Cluster + ?Sized,
{
    let workers = cluster
        .workers()
        .await
        .map_err(|e| ExecutionError::MembershipQueryFailed(e.to_string()))?;
    host_view_of(cluster, &workers).await
}

/// Picks one worker per distinct hostname among the given workers.
///
/// When several workers share a hostname, the last one in the given order wins.
/// The winners are returned in the given order.
pub async fn host_view_of<C>(cluster: &C, workers: &[WorkerId]) -> ExecutionResult<Vec<WorkerId>>
where
    C: Cluster + ?Sized,
{
    let replies = query_all(cluster, workers, WorkerCall::Hostname).await?;
    let mut by_host = IndexMap::<String, WorkerId>::new();
    for (worker, reply) in replies {
        by_host.insert(reply.into_hostname()?, worker);
    }
    debug!("resolved {} host(s) among {} worker(s)", by_host.len(), workers.len());
    let winners = by_host.into_values().collect::<HashSet<_>>();
    Ok(workers
        .iter()
        .filter(|x| winners.contains(*x))
        .copied()
        .collect())
}
