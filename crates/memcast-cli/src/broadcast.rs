use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use memcast_common::config::AppConfig;
use memcast_common::runtime::RuntimeManager;
use memcast_execution::array::{ArrayData, ArrayLayout, DType, Order, Payload};
use memcast_execution::broadcast::{broadcast, BroadcastOptions};
use memcast_execution::cluster::{apply_all, gather, ClusterMembership, LocalCluster};
use memcast_execution::datastore::HostnameDatastore;
use memcast_execution::error::ExecutionResult;
use memcast_execution::worker::{WorkerCall, WorkerEnvironment};
use memcast_telemetry::telemetry::{init_telemetry, shutdown_telemetry};

pub struct BroadcastArgs {
    pub rows: usize,
    pub cols: usize,
    pub order: Order,
    pub name: String,
    pub hosts: Option<usize>,
    pub workers_per_host: Option<usize>,
    pub root: Option<PathBuf>,
}

pub fn run_broadcast(args: BroadcastArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    if let Some(hosts) = args.hosts {
        config.cluster.hosts = hosts;
    }
    if let Some(workers_per_host) = args.workers_per_host {
        config.cluster.workers_per_host = workers_per_host;
    }
    let runtime = RuntimeManager::try_new(&config.runtime)?;
    runtime
        .handle()
        .primary()
        .block_on(async { init_telemetry(&config.telemetry) })?;

    let temp_dir = tempfile::tempdir()?;
    let root = args.root.clone().unwrap_or_else(|| temp_dir.path().to_path_buf());
    runtime.handle().primary().block_on(async {
        let cluster = LocalCluster::from_config(&config, &root).await?;
        let result = run(&cluster, &config, &root, &args).await;
        cluster.shutdown().await?;
        result?;
        <Result<(), Box<dyn std::error::Error>>>::Ok(())
    })?;

    shutdown_telemetry();

    Ok(())
}

/// A `rows x cols` array of `f64` holding `0, 1, 2, ...` in memory order.
fn sample_array(rows: usize, cols: usize, order: Order) -> ExecutionResult<ArrayData> {
    let layout = ArrayLayout::new(vec![rows, cols], DType::Float64, order);
    layout.byte_len()?;
    let values = (0..layout.element_count()?)
        .map(|x| x as f64)
        .collect::<Vec<_>>();
    ArrayData::from_f64(layout.shape, order, &values)
}

async fn run(
    cluster: &LocalCluster,
    config: &AppConfig,
    root: &std::path::Path,
    args: &BroadcastArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = Payload::from(sample_array(args.rows, args.cols, args.order)?);
    let options = BroadcastOptions::new(
        Arc::new(HostnameDatastore::from(&config.datastore)),
        WorkerEnvironment::new("client", root.join("client")),
    );
    let workers = cluster.workers().await?;
    info!(
        "broadcasting array {} to {} worker(s)",
        payload.layout(),
        workers.len()
    );

    let output = broadcast(cluster, &workers, &args.name, &payload, &options).await?;
    let engines_by_datastore = output.engines_by_datastore.clone();
    let checksum = output.checksum.clone();
    let writes = output.writes.len();
    let manager = output.into_task_manager();
    manager
        .monitor(std::time::Duration::from_millis(200), |report| {
            info!("{report}")
        })
        .await;
    manager.wait().await?;

    println!("checksum: {checksum}");
    println!("writes: {writes}");
    for (datastore_id, engines) in &engines_by_datastore {
        println!("{datastore_id}");
        let call = WorkerCall::DescribeBinding {
            name: args.name.clone(),
        };
        let handles = apply_all(cluster, engines, &call).await?;
        for (worker, reply) in gather(&handles).await? {
            match reply.into_binding()? {
                Some(summary) => println!(
                    "  worker {worker}: {} {} {}",
                    summary.path.display(),
                    summary.layout,
                    summary.digest.short()
                ),
                None => println!("  worker {worker}: <unbound>"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_array() -> ExecutionResult<()> {
        let array = sample_array(2, 3, Order::F)?;
        assert_eq!(array.layout().to_string(), "(2, 3) float64 F");
        assert_eq!(array.as_bytes().len(), 6 * 8);
        Ok(())
    }

    #[test]
    fn test_sample_array_overflow() {
        assert!(sample_array(usize::MAX, 2, Order::C).is_err());
        assert!(sample_array(usize::MAX / 4, 2, Order::C).is_err());
    }
}
