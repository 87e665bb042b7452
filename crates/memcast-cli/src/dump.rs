use std::path::PathBuf;
use std::sync::Arc;

use memcast_common::config::AppConfig;
use memcast_common::runtime::RuntimeManager;
use memcast_execution::cluster::LocalCluster;
use memcast_execution::host_dump::{host_dump, HostDumpOptions};
use memcast_telemetry::telemetry::{init_telemetry, shutdown_telemetry};

pub fn run_dump(
    source: PathBuf,
    target: PathBuf,
    pre_warm: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let runtime = RuntimeManager::try_new(&config.runtime)?;
    runtime
        .handle()
        .primary()
        .block_on(async { init_telemetry(&config.telemetry) })?;

    let payload: Arc<[u8]> = std::fs::read(&source)?.into();
    let options = HostDumpOptions::new(pre_warm && config.host_dump.pre_warm);
    let root = tempfile::tempdir()?;
    runtime.handle().primary().block_on(async {
        let cluster = LocalCluster::from_config(&config, root.path()).await?;
        let result = host_dump(&cluster, payload, &target, None, &options).await;
        cluster.shutdown().await?;
        let output = result?;
        match output.first {
            Some(first) => println!("first write: worker {first}"),
            None => println!("{} exists on all hosts", target.display()),
        }
        for worker in &output.rest {
            println!("write: worker {worker}");
        }
        if options.pre_warm {
            println!("warmed bytes: {}", output.warmed_bytes);
        }
        <Result<(), Box<dyn std::error::Error>>>::Ok(())
    })?;

    shutdown_telemetry();

    Ok(())
}
