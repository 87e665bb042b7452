use std::fmt::Debug;
use std::fs;
use std::path::PathBuf;

use memcast_common::config::DatastoreConfig;
use memcast_common::env::expand_home;

use crate::checksum::Checksum;
use crate::error::ExecutionResult;
use crate::worker::WorkerEnvironment;

/// Where a worker stores the data for a checksum, and whether it is already there.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DatastoreRecord {
    /// Identifies a locality domain. Workers reporting the same ID share one physical store,
    /// so data is transferred to at most one of them.
    pub datastore_id: String,
    /// The file for the data. This must be a function of the checksum only,
    /// for a given datastore.
    pub path: PathBuf,
    pub exists: bool,
}

/// Decides the datastore of a worker. The identifier runs on the worker,
/// and also once in the submitting process to find the local datastore.
///
/// Implementations must be deterministic: the same checksum in the same environment
/// yields the same path, and `exists` may only change from `false` to `true`.
pub trait DatastoreIdentifier: Debug + Send + Sync + 'static {
    fn identify(
        &self,
        environment: &WorkerEnvironment,
        checksum: &Checksum,
    ) -> ExecutionResult<DatastoreRecord>;
}

/// The default identifier: one datastore per hostname and base directory.
/// The datastore ID has the form `<hostname>:<base_dir>`.
#[derive(Debug, Clone)]
pub struct HostnameDatastore {
    base_dir: String,
}

impl HostnameDatastore {
    pub fn new(base_dir: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self, environment: &WorkerEnvironment) -> PathBuf {
        expand_home(&self.base_dir, &environment.home_dir)
    }
}

impl From<&DatastoreConfig> for HostnameDatastore {
    fn from(config: &DatastoreConfig) -> Self {
        Self::new(config.base_dir.clone())
    }
}

impl DatastoreIdentifier for HostnameDatastore {
    fn identify(
        &self,
        environment: &WorkerEnvironment,
        checksum: &Checksum,
    ) -> ExecutionResult<DatastoreRecord> {
        let base_dir = self.base_dir(environment);
        fs::create_dir_all(&base_dir)?;
        let path = base_dir.join(checksum.as_str());
        let datastore_id = format!("{}:{}", environment.hostname, base_dir.display());
        let exists = path.exists();
        Ok(DatastoreRecord {
            datastore_id,
            path,
            exists,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArrayLayout, DType, Order};

    fn checksum() -> Checksum {
        let layout = ArrayLayout::new(vec![4], DType::UInt8, Order::C);
        Checksum::compute(&layout, &[1, 2, 3, 4])
    }

    #[test]
    fn test_hostname_datastore_is_idempotent() -> ExecutionResult<()> {
        let home = tempfile::tempdir()?;
        let environment = WorkerEnvironment::new("node-a", home.path());
        let identifier = HostnameDatastore::new("~/.memcast/datastore");
        let checksum = checksum();

        let first = identifier.identify(&environment, &checksum)?;
        let base_dir = home.path().join(".memcast").join("datastore");
        assert!(base_dir.is_dir());
        assert_eq!(first.path, base_dir.join(checksum.as_str()));
        assert_eq!(
            first.datastore_id,
            format!("node-a:{}", base_dir.display())
        );
        assert!(!first.exists);

        fs::write(&first.path, [1u8, 2, 3, 4])?;
        let second = identifier.identify(&environment, &checksum)?;
        assert_eq!(second.path, first.path);
        assert_eq!(second.datastore_id, first.datastore_id);
        assert!(second.exists);
        assert!(identifier.identify(&environment, &checksum)?.exists);
        Ok(())
    }

    #[test]
    fn test_hostname_datastore_distinguishes_hosts() -> ExecutionResult<()> {
        let home = tempfile::tempdir()?;
        let identifier = HostnameDatastore::new("~/store");
        let checksum = checksum();
        let a = identifier.identify(&WorkerEnvironment::new("node-a", home.path()), &checksum)?;
        let b = identifier.identify(&WorkerEnvironment::new("node-b", home.path()), &checksum)?;
        assert_ne!(a.datastore_id, b.datastore_id);
        assert_eq!(a.path, b.path);
        Ok(())
    }
}
