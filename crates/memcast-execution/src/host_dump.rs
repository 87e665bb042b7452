use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use memcast_common::config::HostDumpConfig;
use memcast_common::env::is_home_relative;

use crate::cluster::{apply_all, gather, query_all, Cluster};
use crate::error::ExecutionResult;
use crate::id::WorkerId;
use crate::topology::resolve_host_view;
use crate::worker::WorkerCall;

#[derive(Debug, Clone)]
#[readonly::make]
pub struct HostDumpOptions {
    /// Whether to read the file once on every host after writing it.
    pub pre_warm: bool,
}

impl HostDumpOptions {
    pub fn new(pre_warm: bool) -> Self {
        Self { pre_warm }
    }
}

impl Default for HostDumpOptions {
    fn default() -> Self {
        Self::new(true)
    }
}

impl From<&HostDumpConfig> for HostDumpOptions {
    fn from(config: &HostDumpConfig) -> Self {
        Self::new(config.pre_warm)
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct HostDumpOutput {
    /// The worker that received the first write, if any host was missing the file.
    pub first: Option<WorkerId>,
    /// The workers that received the file after the first write.
    pub rest: Vec<WorkerId>,
    /// The number of bytes read on all hosts when pre-warming.
    pub warmed_bytes: u64,
}

/// Makes the path absolute for the workers.
/// A path starting with `~` is kept as is and resolved against the home directory
/// of each worker.
fn qualify(path: &Path) -> ExecutionResult<PathBuf> {
    if is_home_relative(path) {
        Ok(path.to_path_buf())
    } else {
        Ok(std::path::absolute(path)?)
    }
}

/// Returns the workers of the view for which the file does not exist.
pub async fn missing_file_workers<C>(
    cluster: &C,
    view: &[WorkerId],
    path: &Path,
) -> ExecutionResult<Vec<WorkerId>>
where
    C: Cluster + ?Sized,
{
    let call = WorkerCall::FileMissing {
        path: path.to_path_buf(),
    };
    query_all(cluster, view, call)
        .await?
        .into_iter()
        .filter_map(|(worker, reply)| match reply.into_missing() {
            Ok(true) => Some(Ok(worker)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        })
        .collect()
}

/// Reads the files once on one worker per host, to load them into the page cache.
/// Returns the total number of bytes read.
pub async fn warm_files<C>(
    cluster: &C,
    paths: &[PathBuf],
    host_view: Option<Vec<WorkerId>>,
) -> ExecutionResult<u64>
where
    C: Cluster + ?Sized,
{
    let view = match host_view {
        Some(x) => x,
        None => resolve_host_view(cluster).await?,
    };
    let paths = paths
        .iter()
        .map(|x| qualify(x))
        .collect::<ExecutionResult<Vec<_>>>()?;
    let handles = apply_all(cluster, &view, &WorkerCall::WarmFiles { paths }).await?;
    gather(&handles)
        .await?
        .into_iter()
        .map(|(_, reply)| reply.into_warmed())
        .sum()
}

/// Writes the payload to the target path on every host where the file is missing.
/// A target starting with `~` refers to the home directory of each host.
///
/// The first missing host is written to before the others are checked again,
/// so that hosts sharing a file system do not all write the same file.
pub async fn host_dump<C>(
    cluster: &C,
    payload: Arc<[u8]>,
    target: &Path,
    host_view: Option<Vec<WorkerId>>,
    options: &HostDumpOptions,
) -> ExecutionResult<HostDumpOutput>
where
    C: Cluster + ?Sized,
{
    let target = qualify(target)?;
    let view = match host_view {
        Some(x) => x,
        None => resolve_host_view(cluster).await?,
    };
    let mut output = HostDumpOutput::default();
    let missing = missing_file_workers(cluster, &view, &target).await?;
    if let Some(first) = missing.first() {
        info!("dumping {} to worker {first}", target.display());
        let call = WorkerCall::DumpPayload {
            path: target.clone(),
            bytes: Arc::clone(&payload),
        };
        cluster.apply(*first, call).await?.get().await?;
        output.first = Some(*first);

        let missing = missing_file_workers(cluster, &view, &target).await?;
        if !missing.is_empty() {
            info!(
                "dumping {} to {} more worker(s)",
                target.display(),
                missing.len()
            );
            let call = WorkerCall::DumpPayload {
                path: target.clone(),
                bytes: payload,
            };
            let handles = apply_all(cluster, &missing, &call).await?;
            gather(&handles).await?;
            output.rest = missing;
        }
    } else {
        debug!("{} exists on all hosts", target.display());
    }
    if options.pre_warm {
        output.warmed_bytes = warm_files(cluster, &[target], Some(view)).await?;
    }
    Ok(output)
}
