use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};
use memcast_common::config::AppConfig;

use crate::array::Payload;
use crate::checksum::Checksum;
use crate::cluster::{apply_all, query_all, Cluster};
use crate::datastore::{DatastoreIdentifier, DatastoreRecord, HostnameDatastore};
use crate::error::{ExecutionError, ExecutionResult};
use crate::id::WorkerId;
use crate::memmap::save_for_memmap;
use crate::task::TaskHandle;
use crate::task_manager::TaskManager;
use crate::worker::{WorkerCall, WorkerEnvironment, WorkerReply};

/// The workers of each datastore, in membership order.
/// The first worker of a datastore is the one that writes the data.
pub type EnginesByDatastore = IndexMap<String, Vec<WorkerId>>;

#[derive(Debug, Clone)]
#[readonly::make]
pub struct BroadcastOptions {
    pub identifier: Arc<dyn DatastoreIdentifier>,
    /// The environment of the submitting process, used to find the local datastore.
    pub environment: WorkerEnvironment,
}

impl BroadcastOptions {
    pub fn new(identifier: Arc<dyn DatastoreIdentifier>, environment: WorkerEnvironment) -> Self {
        Self {
            identifier,
            environment,
        }
    }

    /// The default options for the current process.
    pub fn try_from_config(config: &AppConfig) -> ExecutionResult<Self> {
        Ok(Self::new(
            Arc::new(HostnameDatastore::from(&config.datastore)),
            WorkerEnvironment::current()?,
        ))
    }
}

/// The datastores seen by the workers and by the submitting process for one checksum.
#[derive(Debug, Clone)]
pub struct DatastoreMapping {
    pub local: DatastoreRecord,
    pub engines_by_datastore: EnginesByDatastore,
    pub records: HashMap<String, DatastoreRecord>,
}

impl DatastoreMapping {
    fn record(&self, datastore_id: &str) -> ExecutionResult<&DatastoreRecord> {
        self.records
            .get(datastore_id)
            .ok_or_else(|| ExecutionError::internal(format!("unknown datastore: {datastore_id}")))
    }
}

/// Identifies the datastore of every worker, and the datastore of the submitting process.
pub async fn datastore_mapping<C>(
    cluster: &C,
    workers: &[WorkerId],
    checksum: &Checksum,
    options: &BroadcastOptions,
) -> ExecutionResult<DatastoreMapping>
where
    C: Cluster + ?Sized,
{
    let call = WorkerCall::IdentifyDatastore {
        checksum: checksum.clone(),
        identifier: Arc::clone(&options.identifier),
    };
    let replies = query_all(cluster, workers, call).await?;
    let local = {
        let identifier = Arc::clone(&options.identifier);
        let environment = options.environment.clone();
        let checksum = checksum.clone();
        tokio::task::spawn_blocking(move || identifier.identify(&environment, &checksum))
            .await?
            .map_err(|e| ExecutionError::MembershipQueryFailed(format!("local datastore: {e}")))?
    };
    let mut engines_by_datastore = EnginesByDatastore::new();
    let mut records = HashMap::new();
    for (worker, reply) in replies {
        let record = reply.into_datastore()?;
        engines_by_datastore
            .entry(record.datastore_id.clone())
            .or_default()
            .push(worker);
        records.insert(record.datastore_id.clone(), record);
    }
    Ok(DatastoreMapping {
        local,
        engines_by_datastore,
        records,
    })
}

/// The tasks dispatched by a broadcast.
#[derive(Debug)]
pub struct BroadcastOutput {
    pub checksum: Checksum,
    pub engines_by_datastore: EnginesByDatastore,
    pub local_datastore_id: String,
    /// The write tasks, one per remote datastore lacking the data.
    pub writes: Vec<TaskHandle<WorkerReply>>,
    /// All the tasks, writes first, then the memory-mapping tasks.
    pub tasks: Vec<TaskHandle<WorkerReply>>,
}

impl BroadcastOutput {
    pub fn into_task_manager(self) -> TaskManager {
        TaskManager::from_tasks(self.tasks)
    }
}

/// Sends the payload to every datastore that lacks it, then binds it under `name`
/// as a memory-mapped array on every worker.
///
/// The write tasks are awaited before the mapping tasks are dispatched.
/// The mapping tasks are returned without waiting for them.
pub async fn broadcast<C>(
    cluster: &C,
    workers: &[WorkerId],
    name: &str,
    payload: &Payload,
    options: &BroadcastOptions,
) -> ExecutionResult<BroadcastOutput>
where
    C: Cluster + ?Sized,
{
    let checksum = payload.checksum();
    debug!("broadcasting {name} with checksum {checksum}");
    let mapping = datastore_mapping(cluster, workers, &checksum, options).await?;
    let local_datastore_id = mapping.local.datastore_id.clone();

    let mut writes = vec![];
    let mut write_datastores = vec![];
    for (datastore_id, engines) in &mapping.engines_by_datastore {
        if *datastore_id == local_datastore_id {
            continue;
        }
        let record = mapping.record(datastore_id)?;
        let Some(first) = engines.first() else {
            continue;
        };
        if record.exists {
            info!("nothing to send to {datastore_id}");
            continue;
        }
        info!("sending data to {datastore_id}");
        let call = WorkerCall::SaveForMemmap {
            path: record.path.clone(),
            payload: payload.clone(),
        };
        writes.push(cluster.apply(*first, call).await?);
        write_datastores.push(datastore_id.clone());
    }

    let mut failures = vec![];
    for (handle, datastore_id) in writes.iter().zip(write_datastores) {
        if let Err(e) = handle.get().await {
            warn!("failed to write data to {datastore_id}: {e}");
            failures.push((datastore_id, e.to_string()));
        }
    }
    if !failures.is_empty() {
        return Err(ExecutionError::WriteFailed(failures));
    }

    let mut tasks = writes.clone();
    for (datastore_id, engines) in &mapping.engines_by_datastore {
        if engines.is_empty() {
            continue;
        }
        let path = if *datastore_id == local_datastore_id {
            local_path(payload, &mapping.local).await?
        } else {
            mapping.record(datastore_id)?.path.clone()
        };
        let call = WorkerCall::LoadMemmap {
            name: name.to_string(),
            path,
            layout: payload.layout().clone(),
        };
        tasks.extend(apply_all(cluster, engines, &call).await?);
    }

    Ok(BroadcastOutput {
        checksum,
        engines_by_datastore: mapping.engines_by_datastore,
        local_datastore_id,
        writes,
        tasks,
    })
}

/// Returns the file for the local datastore, saving the payload there
/// unless it is already a memory-mapped file.
async fn local_path(payload: &Payload, local: &DatastoreRecord) -> ExecutionResult<PathBuf> {
    if let Some(path) = payload.mapped_path() {
        return Ok(path.to_path_buf());
    }
    let path = local.path.clone();
    if !local.exists {
        let payload = payload.clone();
        let target = path.clone();
        let created =
            tokio::task::spawn_blocking(move || save_for_memmap(payload.as_bytes(), &target))
                .await??;
        if created {
            debug!("saved data to local datastore file {}", path.display());
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArrayData, Order};
    use crate::cluster::{ClusterMembership, LocalCluster};

    #[tokio::test]
    async fn test_broadcast_without_workers() -> ExecutionResult<()> {
        let dir = tempfile::tempdir()?;
        let cluster = LocalCluster::builder().build().await?;
        let options = BroadcastOptions::new(
            Arc::new(HostnameDatastore::new("~/store")),
            WorkerEnvironment::new("client", dir.path()),
        );
        let payload = Payload::from(ArrayData::from_f64(vec![2], Order::C, &[1.0, 2.0])?);
        let output = broadcast(&cluster, &[], "X", &payload, &options).await?;
        assert!(output.tasks.is_empty());
        assert!(output.engines_by_datastore.is_empty());
        cluster.shutdown().await
    }

    #[tokio::test]
    async fn test_datastore_mapping_groups_workers() -> ExecutionResult<()> {
        let dir = tempfile::tempdir()?;
        let cluster = LocalCluster::builder()
            .host(WorkerEnvironment::new("a", dir.path().join("a")), 2)
            .host(WorkerEnvironment::new("b", dir.path().join("b")), 1)
            .build()
            .await?;
        let workers = cluster.workers().await?;
        let options = BroadcastOptions::new(
            Arc::new(HostnameDatastore::new("~/store")),
            WorkerEnvironment::new("client", dir.path().join("client")),
        );
        let checksum = Checksum::of_bytes(b"data");
        let mapping = datastore_mapping(&cluster, &workers, &checksum, &options).await?;
        let a = format!("a:{}", dir.path().join("a/store").display());
        let b = format!("b:{}", dir.path().join("b/store").display());
        assert_eq!(
            mapping.engines_by_datastore.keys().cloned().collect::<Vec<_>>(),
            vec![a.clone(), b.clone()]
        );
        assert_eq!(mapping.engines_by_datastore[&a], workers[..2].to_vec());
        assert_eq!(
            mapping.records[&b].path,
            dir.path().join("b/store").join(checksum.as_str())
        );
        assert!(!mapping.local.exists);
        assert!(mapping.local.datastore_id.starts_with("client:"));
        cluster.shutdown().await
    }
}
