//! Worker Configuration
//!
//! Layered configuration for the reconciliation worker: `config/default` and
//! `config/local`, then the file passed with `--config`, then
//! `LEDGERFLOW__SECTION__KEY` environment variables. CLI arguments are
//! applied on top by `main`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ledgerflow_payments::ProtocolFeeSchedule;
use ledgerflow_reconciler::ReconcilerSettings;

/// Worker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Reconciliation settings
    #[serde(default)]
    pub reconciler: ReconcilerSettings,

    /// Protocol fees used when building payment flows
    #[serde(default)]
    pub fees: ProtocolFeeSchedule,

    /// When passes run
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// In-memory demo data
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Pass scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between the start of two passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Run a single pass and exit
    #[serde(default)]
    pub run_once: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_once: false,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Demo mode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Seed the in-memory backends with sample payments
    #[serde(default)]
    pub enabled: bool,
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl WorkerConfig {
    /// Load configuration from files and environment
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::load_layered(config_path, Path::new("config"))
    }

    /// Layer `config_dir/default`, `config_dir/local`, the explicit file and
    /// the environment, later sources winning
    fn load_layered(config_path: Option<&str>, config_dir: &Path) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from(config_dir.join("default")).required(false))
            .add_source(config::File::from(config_dir.join("local")).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("LEDGERFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let worker_config: WorkerConfig = builder.build()?.try_deserialize()?;
        Ok(worker_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.reconciler.workers, 5);
        assert_eq!(config.schedule.interval(), Duration::from_secs(60));
        assert!(!config.schedule.run_once);
        assert_eq!(config.logging.format, "pretty");
        assert!(!config.demo.enabled);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: WorkerConfig = serde_json::from_str(
            r#"{"reconciler": {"workers": 2}, "fees": {"lightning_sats": 500}, "schedule": {"run_once": true}}"#,
        )
        .unwrap();
        assert_eq!(config.reconciler.workers, 2);
        assert_eq!(config.reconciler.lock_timeout_secs, 30);
        assert_eq!(config.fees.lightning_fee().amount(), 500);
        assert!(config.schedule.run_once);
        assert_eq!(config.schedule.interval_secs, 60);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let schedule = ScheduleConfig {
            interval_secs: 0,
            run_once: false,
        };
        assert_eq!(schedule.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_explicit_file_overrides_repo_defaults() {
        let dir = std::env::temp_dir().join(format!("ledgerflow-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            "[reconciler]\nworkers = 5\n\n[fees]\nlightning_sats = 500\n\n[schedule]\ninterval_secs = 30\n",
        )
        .unwrap();
        let ops = dir.join("ops.toml");
        std::fs::write(&ops, "[reconciler]\nworkers = 17\n\n[fees]\nlightning_sats = 9\n").unwrap();

        let config = WorkerConfig::load_layered(ops.to_str(), &dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(config.reconciler.workers, 17);
        assert_eq!(config.fees.lightning_fee().amount(), 9);
        // Keys the explicit file leaves out still come from the defaults
        assert_eq!(config.schedule.interval_secs, 30);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = std::env::temp_dir().join("ledgerflow-config-absent");
        let missing = dir.join("nope.toml");
        assert!(WorkerConfig::load_layered(missing.to_str(), &dir).is_err());
    }
}
