use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::env::CONFIG_ENV_PREFIX;
use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub datastore: DatastoreConfig,
    pub cluster: ClusterConfig,
    pub runtime: RuntimeConfig,
    pub telemetry: TelemetryConfig,
    pub host_dump: HostDumpConfig,
}

impl AppConfig {
    pub fn load() -> CommonResult<Self> {
        Self::figment()
            .admerge(
                Env::prefixed(CONFIG_ENV_PREFIX).map(|p| p.as_str().replace("__", ".").into()),
            )
            .extract()
            .map_err(|e| CommonError::InvalidConfig(e.to_string()))
    }

    /// Loads the built-in defaults without consulting the environment.
    pub fn defaults() -> CommonResult<Self> {
        Self::figment()
            .extract()
            .map_err(|e| CommonError::InvalidConfig(e.to_string()))
    }

    fn figment() -> Figment {
        Figment::from(Toml::string(DEFAULT_CONFIG))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    pub base_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub hosts: usize,
    pub workers_per_host: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub worker_threads: usize,
    pub stack_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostDumpConfig {
    pub pre_warm: bool,
    pub warm_chunk_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() -> CommonResult<()> {
        let config = AppConfig::defaults()?;
        assert_eq!(config.datastore.base_dir, "~/.memcast/datastore");
        assert_eq!(config.cluster.hosts, 2);
        assert_eq!(config.cluster.workers_per_host, 2);
        assert!(config.host_dump.pre_warm);
        assert_eq!(config.telemetry.log_filter, "info");
        Ok(())
    }

    #[test]
    fn test_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("MEMCAST__DATASTORE__BASE_DIR", "/scratch/store");
            jail.set_env("MEMCAST__CLUSTER__HOSTS", "3");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.datastore.base_dir, "/scratch/store");
            assert_eq!(config.cluster.hosts, 3);
            assert_eq!(config.cluster.workers_per_host, 2);
            Ok(())
        });
    }
}
