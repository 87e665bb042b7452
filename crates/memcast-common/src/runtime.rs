use tokio::runtime::{Handle, Runtime};

use crate::config::RuntimeConfig;
use crate::error::{CommonError, CommonResult};

#[derive(Debug)]
pub struct RuntimeManager {
    primary: Runtime,
}

impl RuntimeManager {
    pub fn try_new(config: &RuntimeConfig) -> CommonResult<Self> {
        let primary = Self::build_runtime(config)?;
        Ok(Self { primary })
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            primary: self.primary.handle().clone(),
        }
    }

    fn build_runtime(config: &RuntimeConfig) -> CommonResult<Runtime> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.thread_stack_size(config.stack_size).enable_all();
        if config.worker_threads > 0 {
            builder.worker_threads(config.worker_threads);
        }
        builder
            .build()
            .map_err(|e| CommonError::internal(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    primary: Handle,
}

impl RuntimeHandle {
    pub fn primary(&self) -> &Handle {
        &self.primary
    }
}
