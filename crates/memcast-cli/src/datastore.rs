use std::str::FromStr;

use memcast_common::config::AppConfig;
use memcast_execution::checksum::Checksum;
use memcast_execution::datastore::{DatastoreIdentifier, HostnameDatastore};
use memcast_execution::worker::WorkerEnvironment;

pub fn run_datastore(checksum: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let checksum = Checksum::from_str(checksum)?;
    let identifier = HostnameDatastore::from(&config.datastore);
    let record = identifier.identify(&WorkerEnvironment::current()?, &checksum)?;
    println!("datastore: {}", record.datastore_id);
    println!("path: {}", record.path.display());
    println!("exists: {}", record.exists);
    Ok(())
}
