//! Pool and scheduler configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default worker thread name prefix.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "task-pool";
/// Default automatic-mode tick length in milliseconds.
pub const DEFAULT_TICK_LENGTH_MS: u64 = 100;

fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

fn default_thread_name_prefix() -> String {
    DEFAULT_THREAD_NAME_PREFIX.to_string()
}

const fn default_tick_length_ms() -> u64 {
    DEFAULT_TICK_LENGTH_MS
}

/// Work-stealing pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPoolConfig {
    /// Number of worker threads (and queues).
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Worker threads are named `{prefix}-{index}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Stack size for worker threads; the platform default if unset.
    #[serde(default)]
    pub thread_stack_size: Option<usize>,
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            thread_name_prefix: default_thread_name_prefix(),
            thread_stack_size: None,
        }
    }
}

impl TaskPoolConfig {
    /// One worker per logical CPU.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.thread_stack_size == Some(0) {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }
}

/// Tick scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSchedulerConfig {
    /// Automatic-mode tick length in milliseconds.
    #[serde(default = "default_tick_length_ms")]
    pub tick_length_ms: u64,
    /// Cap on simultaneously running tasks; 0 means unlimited.
    #[serde(default)]
    pub max_concurrent_tasks: usize,
    /// Start in manual (trigger-driven) mode.
    #[serde(default)]
    pub manual_mode: bool,
    /// Start paused.
    #[serde(default)]
    pub start_paused: bool,
}

impl Default for TickSchedulerConfig {
    fn default() -> Self {
        Self {
            tick_length_ms: DEFAULT_TICK_LENGTH_MS,
            max_concurrent_tasks: 0,
            manual_mode: false,
            start_paused: false,
        }
    }
}

impl TickSchedulerConfig {
    /// Automatic mode, 100 ms ticks, no concurrency cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick length in milliseconds.
    #[must_use]
    pub const fn with_tick_length_ms(mut self, ms: u64) -> Self {
        self.tick_length_ms = ms;
        self
    }

    /// Set the concurrency cap (0 = unlimited).
    #[must_use]
    pub const fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Start in manual mode.
    #[must_use]
    pub const fn with_manual_mode(mut self, manual: bool) -> Self {
        self.manual_mode = manual;
        self
    }

    /// Start paused.
    #[must_use]
    pub const fn with_start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }

    /// Tick length as a `Duration`.
    #[must_use]
    pub const fn tick_length(&self) -> Duration {
        Duration::from_millis(self.tick_length_ms)
    }

    /// Validate scheduler configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_length_ms == 0 {
            return Err("tick_length_ms must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root configuration for a pool plus its scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Pool section.
    #[serde(default)]
    pub pool: TaskPoolConfig,
    /// Scheduler section.
    #[serde(default)]
    pub scheduler: TickSchedulerConfig,
}

impl RuntimeConfig {
    /// Validate both sections.
    ///
    /// # Errors
    ///
    /// Returns a description prefixed with the failing section.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` (if present) and read overrides from the process
    /// environment on top of the defaults.
    ///
    /// # Errors
    ///
    /// An unparsable variable or an invalid resulting configuration.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from a variable lookup. Recognised keys:
    /// `TASK_POOL_WORKERS`, `TASK_POOL_STACK_SIZE`, `TICK_LENGTH_MS`,
    /// `TICK_MAX_CONCURRENT`, `TICK_MANUAL_MODE`.
    ///
    /// # Errors
    ///
    /// An unparsable variable or an invalid resulting configuration.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(workers) = parse_var::<usize>(&lookup, "TASK_POOL_WORKERS")? {
            cfg.pool.worker_count = workers;
        }
        if let Some(stack) = parse_var::<usize>(&lookup, "TASK_POOL_STACK_SIZE")? {
            cfg.pool.thread_stack_size = Some(stack);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TICK_LENGTH_MS")? {
            cfg.scheduler.tick_length_ms = ms;
        }
        if let Some(max) = parse_var::<usize>(&lookup, "TICK_MAX_CONCURRENT")? {
            cfg.scheduler.max_concurrent_tasks = max;
        }
        if let Some(raw) = lookup("TICK_MANUAL_MODE") {
            cfg.scheduler.manual_mode = parse_bool(&raw)
                .ok_or_else(|| format!("TICK_MANUAL_MODE: expected a boolean, got `{raw}`"))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{key}: {e}"))
        })
        .transpose()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
