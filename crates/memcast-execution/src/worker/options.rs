use std::path::{Path, PathBuf};

use memcast_common::env::home_dir;

use crate::error::{ExecutionError, ExecutionResult};
use crate::id::WorkerId;

/// What a worker knows about the machine it runs on.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkerEnvironment {
    pub hostname: String,
    pub home_dir: PathBuf,
}

impl WorkerEnvironment {
    pub fn new(hostname: impl Into<String>, home_dir: impl AsRef<Path>) -> Self {
        Self {
            hostname: hostname.into(),
            home_dir: home_dir.as_ref().to_path_buf(),
        }
    }

    /// The environment of the current process.
    pub fn current() -> ExecutionResult<Self> {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        let home_dir =
            home_dir().ok_or_else(|| ExecutionError::invalid("cannot determine home directory"))?;
        Ok(Self { hostname, home_dir })
    }
}

#[derive(Debug, Clone)]
#[readonly::make]
pub struct WorkerOptions {
    pub worker_id: WorkerId,
    pub environment: WorkerEnvironment,
    pub warm_chunk_size: usize,
}

impl WorkerOptions {
    pub fn new(worker_id: WorkerId, environment: WorkerEnvironment, warm_chunk_size: usize) -> Self {
        Self {
            worker_id,
            environment,
            warm_chunk_size,
        }
    }
}
