use chrono::NaiveTime;
use serde::Deserialize;

use crate::orchestrator::OrchestratorConfig;
use crate::worker::WorkerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub auditor: AuditorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// How often the worker looks for due jobs.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_concurrent_jobs() -> usize {
    4
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Delay before root jobs are checked after start.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    /// UTC time of day for the daily audit, "HH:MM".
    #[serde(default = "default_audit_time")]
    pub audit_time: String,
    #[serde(default = "default_audit_check_interval_secs")]
    pub audit_check_interval_secs: u64,
    /// How many audited days are remembered.
    #[serde(default = "default_audited_days_retained")]
    pub audited_days_retained: usize,
}

fn default_startup_delay_ms() -> u64 {
    5000
}

fn default_audit_time() -> String {
    "03:00".into()
}

fn default_audit_check_interval_secs() -> u64 {
    60
}

fn default_audited_days_retained() -> usize {
    7
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: default_startup_delay_ms(),
            audit_time: default_audit_time(),
            audit_check_interval_secs: default_audit_check_interval_secs(),
            audited_days_retained: default_audited_days_retained(),
        }
    }
}

impl SchedulerConfig {
    pub fn audit_time(&self) -> anyhow::Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.audit_time, "%H:%M").map_err(|e| {
            anyhow::anyhow!(
                "scheduler.audit_time must be HH:MM, got '{}': {}",
                self.audit_time,
                e
            )
        })
    }

    pub fn orchestrator_config(&self) -> anyhow::Result<OrchestratorConfig> {
        Ok(OrchestratorConfig {
            startup_delay: std::time::Duration::from_millis(self.startup_delay_ms),
            audit_time: self.audit_time()?,
            audit_check_interval: std::time::Duration::from_secs(self.audit_check_interval_secs),
            audited_days_retained: self.audited_days_retained,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditorConfig {
    /// Tick of the keep-running audit loop.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_tick_ms() -> u64 {
    2000
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading config '{}': {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval_ms: self.queue.poll_interval_ms,
            max_concurrent_jobs: self.queue.max_concurrent_jobs,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.queue.poll_interval_ms > 0,
            "queue.poll_interval_ms must be > 0, got {}",
            self.queue.poll_interval_ms
        );
        anyhow::ensure!(
            self.queue.max_concurrent_jobs > 0,
            "queue.max_concurrent_jobs must be > 0, got {}",
            self.queue.max_concurrent_jobs
        );
        anyhow::ensure!(
            self.scheduler.audit_check_interval_secs > 0,
            "scheduler.audit_check_interval_secs must be > 0, got {}",
            self.scheduler.audit_check_interval_secs
        );
        // A check interval over a minute can miss the HH:MM window entirely.
        anyhow::ensure!(
            self.scheduler.audit_check_interval_secs <= 60,
            "scheduler.audit_check_interval_secs must be <= 60, got {}",
            self.scheduler.audit_check_interval_secs
        );
        anyhow::ensure!(
            self.scheduler.audited_days_retained > 0,
            "scheduler.audited_days_retained must be > 0, got {}",
            self.scheduler.audited_days_retained
        );
        self.scheduler.audit_time()?;
        anyhow::ensure!(
            self.auditor.tick_ms > 0,
            "auditor.tick_ms must be > 0, got {}",
            self.auditor.tick_ms
        );
        Ok(())
    }
}
