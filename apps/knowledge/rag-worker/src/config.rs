use core_config::{env_parse, ConfigError, FromEnv, HealthServerConfig};

/// Throughput and health-server settings of the sync consumer.
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub max_concurrent_jobs: usize,
    pub batch_size: usize,
    pub block_ms: u64,
    pub health: HealthServerConfig,
}

impl FromEnv for WorkerSettings {
    /// - RAG_WORKER_MAX_CONCURRENT_JOBS: defaults to 8
    /// - RAG_WORKER_BATCH_SIZE: defaults to 20
    /// - RAG_WORKER_BLOCK_MS: defaults to 1000
    /// - RAG_WORKER_HEALTH_PORT, then HEALTH_PORT: defaults to 8083
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_concurrent_jobs: env_parse("RAG_WORKER_MAX_CONCURRENT_JOBS", "8")?,
            batch_size: env_parse("RAG_WORKER_BATCH_SIZE", "20")?,
            block_ms: env_parse("RAG_WORKER_BLOCK_MS", "1000")?,
            health: HealthServerConfig::from_env_with_port_key("RAG_WORKER_HEALTH_PORT")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [&str; 5] = [
        "RAG_WORKER_MAX_CONCURRENT_JOBS",
        "RAG_WORKER_BATCH_SIZE",
        "RAG_WORKER_BLOCK_MS",
        "RAG_WORKER_HEALTH_PORT",
        "HEALTH_PORT",
    ];

    #[test]
    fn test_defaults() {
        temp_env::with_vars(KEYS.map(|k| (k, None::<&str>)), || {
            let settings = WorkerSettings::from_env().unwrap();
            assert_eq!(settings.max_concurrent_jobs, 8);
            assert_eq!(settings.batch_size, 20);
            assert_eq!(settings.block_ms, 1000);
            assert_eq!(settings.health.port, 8083);
        });
    }

    #[test]
    fn test_overrides() {
        temp_env::with_vars(
            [
                ("RAG_WORKER_MAX_CONCURRENT_JOBS", Some("2")),
                ("RAG_WORKER_BATCH_SIZE", Some("5")),
                ("RAG_WORKER_BLOCK_MS", Some("250")),
                ("RAG_WORKER_HEALTH_PORT", Some("9100")),
                ("HEALTH_PORT", Some("9000")),
            ],
            || {
                let settings = WorkerSettings::from_env().unwrap();
                assert_eq!(settings.max_concurrent_jobs, 2);
                assert_eq!(settings.batch_size, 5);
                assert_eq!(settings.block_ms, 250);
                assert_eq!(settings.health.port, 9100);
            },
        );
    }

    #[test]
    fn test_invalid_number() {
        temp_env::with_var("RAG_WORKER_BATCH_SIZE", Some("lots"), || {
            let err = WorkerSettings::from_env().unwrap_err();
            assert!(err.to_string().contains("RAG_WORKER_BATCH_SIZE"));
        });
    }
}
