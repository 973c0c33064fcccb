//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Throttling configuration for CPU-pressure backoff
#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    /// Pause work while system CPU usage is above this percentage (0 = no throttle)
    pub max_cpu_percent: u32,
    /// How long workers sleep before resampling when over the threshold
    pub cpu_pause: std::time::Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_cpu_percent: 80,
            cpu_pause: std::time::Duration::from_secs(3),
        }
    }
}

impl ThrottleConfig {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.max_cpu_percent > 100 {
            return Err(format!(
                "cpu threshold must be a percentage (0-100), got {}",
                self.max_cpu_percent
            ));
        }
        if self.max_cpu_percent > 0 && self.cpu_pause.is_zero() {
            return Err("cpu pause must be non-zero when throttling is enabled".to_string());
        }
        Ok(())
    }
}

/// Output and logging configuration
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
    /// Append log lines to this file in addition to the console
    pub log_file: Option<std::path::PathBuf>,
}
