use std::fs;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::transfer::{EngineConfig, ReplayPolicy, WorkerConfig};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub recovery: RecoverySection,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Required when `backend` is `postgres`
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineSection {
    pub store_timeout_ms: u64,
    pub max_conflict_retries: u32,
    #[serde(default)]
    pub replay_policy: ReplayPolicy,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            store_timeout_ms: 2000,
            max_conflict_retries: 3,
            replay_policy: ReplayPolicy::Reject,
        }
    }
}

impl EngineSection {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Upper bound on one engine call, every store call hitting its deadline.
    ///
    /// Gate, two loads and create; per attempt one posting and two reloads;
    /// then marker lookup, finalize and a re-read.
    pub fn worst_case_call(&self) -> Duration {
        let attempts = self.max_conflict_retries.saturating_add(1);
        let calls = 4u32
            .saturating_add(attempts.saturating_mul(3))
            .saturating_add(3);
        self.store_timeout().saturating_mul(calls)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecoverySection {
    pub scan_interval_secs: u64,
    pub stale_threshold_secs: u64,
    pub batch_size: usize,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            stale_threshold_secs: 60,
            batch_size: 100,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config: {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(content).context("Failed to parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.backend == StorageBackend::Postgres && self.storage.postgres_url.is_none() {
            bail!("storage.postgres_url is required for the postgres backend");
        }
        if self.storage.max_connections == 0 {
            bail!("storage.max_connections must be at least 1");
        }
        if self.engine.store_timeout_ms == 0 {
            bail!("engine.store_timeout_ms must be positive");
        }
        if self.recovery.batch_size == 0 {
            bail!("recovery.batch_size must be at least 1");
        }
        if self.recovery.scan_interval_secs == 0 {
            bail!("recovery.scan_interval_secs must be positive");
        }

        // A live request must never look stale to the sweep
        let worst = self.engine.worst_case_call();
        let stale = Duration::from_secs(self.recovery.stale_threshold_secs);
        if stale <= worst {
            bail!(
                "recovery.stale_threshold_secs ({}s) must exceed the worst-case engine call ({}s)",
                stale.as_secs(),
                worst.as_secs_f64()
            );
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            store_timeout: self.engine.store_timeout(),
            max_conflict_retries: self.engine.max_conflict_retries,
            replay_policy: self.engine.replay_policy,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            scan_interval: Duration::from_secs(self.recovery.scan_interval_secs),
            stale_threshold: Duration::from_secs(self.recovery.stale_threshold_secs),
            batch_size: self.recovery.batch_size,
            store_timeout: self.engine.store_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
log_level: "info"
log_dir: "./logs"
log_file: "test.log"
use_json: false
rotation: "never"
storage:
  backend: "memory"
"#;

    #[test]
    fn test_defaults_apply() {
        let config = AppConfig::from_yaml(BASE).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.max_connections, 10);

        let engine = config.engine_config();
        assert_eq!(engine.store_timeout, Duration::from_secs(2));
        assert_eq!(engine.max_conflict_retries, 3);
        assert_eq!(engine.replay_policy, ReplayPolicy::Reject);

        let worker = config.worker_config();
        assert_eq!(worker.stale_threshold, Duration::from_secs(60));
        assert_eq!(worker.batch_size, 100);
    }

    #[test]
    fn test_replay_policy_parses() {
        let yaml = format!(
            "{}engine:\n  store_timeout_ms: 500\n  max_conflict_retries: 0\n  replay_policy: \"return_prior\"\n",
            BASE
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.engine.replay_policy, ReplayPolicy::ReturnPrior);
        assert_eq!(config.engine_config().max_conflict_retries, 0);
    }

    #[test]
    fn test_postgres_requires_url() {
        let yaml = BASE.replace("backend: \"memory\"", "backend: \"postgres\"");
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("postgres_url"));
    }

    #[test]
    fn test_stale_threshold_must_exceed_worst_case() {
        let yaml = format!(
            "{}engine:\n  store_timeout_ms: 5000\n  max_conflict_retries: 3\nrecovery:\n  scan_interval_secs: 30\n  stale_threshold_secs: 60\n  batch_size: 10\n",
            BASE
        );
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("stale_threshold_secs"));
    }

    #[test]
    fn test_worst_case_call() {
        let engine = EngineSection {
            store_timeout_ms: 1000,
            max_conflict_retries: 0,
            replay_policy: ReplayPolicy::Reject,
        };
        assert_eq!(engine.worst_case_call(), Duration::from_secs(10));
    }

    #[test]
    fn test_shipped_configs_are_valid() {
        for env in ["dev", "prod"] {
            let path = format!("{}/config/{}.yaml", env!("CARGO_MANIFEST_DIR"), env);
            let content = fs::read_to_string(&path).unwrap();
            AppConfig::from_yaml(&content).unwrap();
        }
    }
}
