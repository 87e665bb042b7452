use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::array::{ArrayLayout, Payload};
use crate::checksum::Checksum;
use crate::datastore::{DatastoreIdentifier, DatastoreRecord};
use crate::error::{ExecutionError, ExecutionResult};

/// A function that can be applied on a worker.
#[derive(Clone)]
pub enum WorkerCall {
    Hostname,
    IdentifyDatastore {
        checksum: Checksum,
        identifier: Arc<dyn DatastoreIdentifier>,
    },
    SaveForMemmap {
        path: PathBuf,
        payload: Payload,
    },
    LoadMemmap {
        name: String,
        path: PathBuf,
        layout: ArrayLayout,
    },
    FileMissing {
        path: PathBuf,
    },
    DumpPayload {
        path: PathBuf,
        bytes: Arc<[u8]>,
    },
    WarmFiles {
        paths: Vec<PathBuf>,
    },
    DescribeBinding {
        name: String,
    },
    Sleep {
        duration: Duration,
    },
    Fail {
        message: String,
    },
}

impl WorkerCall {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerCall::Hostname => "Hostname",
            WorkerCall::IdentifyDatastore { .. } => "IdentifyDatastore",
            WorkerCall::SaveForMemmap { .. } => "SaveForMemmap",
            WorkerCall::LoadMemmap { .. } => "LoadMemmap",
            WorkerCall::FileMissing { .. } => "FileMissing",
            WorkerCall::DumpPayload { .. } => "DumpPayload",
            WorkerCall::WarmFiles { .. } => "WarmFiles",
            WorkerCall::DescribeBinding { .. } => "DescribeBinding",
            WorkerCall::Sleep { .. } => "Sleep",
            WorkerCall::Fail { .. } => "Fail",
        }
    }
}

/// A summary of a named binding, used to inspect the namespace of a worker.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BindingSummary {
    pub path: PathBuf,
    pub layout: ArrayLayout,
    /// The digest of the mapped bytes.
    pub digest: Checksum,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerReply {
    Hostname(String),
    Datastore(DatastoreRecord),
    Saved { created: bool },
    Bound,
    Missing(bool),
    Dumped,
    Warmed { bytes: u64 },
    Binding(Option<BindingSummary>),
    Done,
}

impl WorkerReply {
    fn unexpected(&self, expected: &str) -> ExecutionError {
        ExecutionError::internal(format!("expected {expected} reply, got {self:?}"))
    }

    pub fn into_hostname(self) -> ExecutionResult<String> {
        match self {
            WorkerReply::Hostname(x) => Ok(x),
            x => Err(x.unexpected("hostname")),
        }
    }

    pub fn into_datastore(self) -> ExecutionResult<DatastoreRecord> {
        match self {
            WorkerReply::Datastore(x) => Ok(x),
            x => Err(x.unexpected("datastore")),
        }
    }

    pub fn into_missing(self) -> ExecutionResult<bool> {
        match self {
            WorkerReply::Missing(x) => Ok(x),
            x => Err(x.unexpected("missing file")),
        }
    }

    pub fn into_warmed(self) -> ExecutionResult<u64> {
        match self {
            WorkerReply::Warmed { bytes } => Ok(bytes),
            x => Err(x.unexpected("warmed")),
        }
    }

    pub fn into_binding(self) -> ExecutionResult<Option<BindingSummary>> {
        match self {
            WorkerReply::Binding(x) => Ok(x),
            x => Err(x.unexpected("binding")),
        }
    }
}
