#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use memcast_execution::broadcast::BroadcastOptions;
use memcast_execution::cluster::LocalCluster;
use memcast_execution::datastore::HostnameDatastore;
use memcast_execution::error::ExecutionResult;
use memcast_execution::worker::WorkerEnvironment;

pub const BASE_DIR: &str = "~/.memcast/datastore";

/// Builds a cluster where host `i` is named `host-<i>` and has its home directory
/// under the root directory.
pub async fn cluster(root: &Path, hosts: usize, workers_per_host: usize) -> ExecutionResult<LocalCluster> {
    let mut builder = LocalCluster::builder();
    for i in 0..hosts {
        builder = builder.host(host(root, i), workers_per_host);
    }
    builder.build().await
}

pub fn host(root: &Path, i: usize) -> WorkerEnvironment {
    let hostname = format!("host-{i}");
    let home_dir = root.join(&hostname);
    WorkerEnvironment::new(hostname, home_dir)
}

/// Options for a client that does not share a datastore with any worker.
pub fn client_options(root: &Path) -> BroadcastOptions {
    BroadcastOptions::new(
        Arc::new(HostnameDatastore::new(BASE_DIR)),
        WorkerEnvironment::new("client", root.join("client")),
    )
}

pub fn datastore_dir(root: &Path, i: usize) -> std::path::PathBuf {
    root.join(format!("host-{i}")).join(".memcast/datastore")
}
