//! Adaptive CPU-pressure throttling for file operations
//!
//! This crate provides a cooperative rate limiter that pauses work while the
//! system-wide CPU utilization is above a configured threshold. Every worker
//! calls [`wait_for_cpu_budget`] before doing CPU/IO-significant work, so the
//! aggregate throughput of all workers self-throttles under load without any
//! central coordinator.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use throttle::{set_cpu_limit, wait_for_cpu_budget};
//!
//! # async fn example() {
//! // Pause workers while CPU usage is above 80%, rechecking every 3 seconds.
//! set_cpu_limit(80, Duration::from_secs(3));
//!
//! // Acquire budget before each unit of work.
//! wait_for_cpu_budget().await;
//! // Perform operation here.
//! # }
//! ```
//!
//! The check is best-effort and non-atomic: concurrent workers sample
//! independently and may all proceed in the same instant the threshold is
//! crossed. That is intentional - the limiter trades precision for having no
//! shared lock on the hot path.

mod cpu;

pub use cpu::sample_cpu_percent;

static CPU_LIMIT: cpu::CpuLimiter = cpu::CpuLimiter::new();

/// Configure the process-wide CPU limiter.
///
/// `max_cpu_percent` of 0 disables throttling entirely ("0 means no
/// throttle"). `pause` is how long workers sleep before resampling when the
/// system is above the threshold.
pub fn set_cpu_limit(max_cpu_percent: u32, pause: std::time::Duration) {
    CPU_LIMIT.setup(max_cpu_percent, pause);
}

/// Block the calling task until system-wide CPU utilization is at or below
/// the configured threshold. Returns immediately if no limit is set.
pub async fn wait_for_cpu_budget() {
    CPU_LIMIT.wait().await;
}
