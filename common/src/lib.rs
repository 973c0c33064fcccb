//! Shared engine pieces for the rmirror tools: the file equality oracle,
//! the transfer executor, destination reaping, progress counters, and the
//! process lifecycle harness ([`run`]) that owns the tracing sink and the
//! tokio runtime.

pub mod config;
pub mod copy;
pub mod filecmp;
pub mod preserve;
pub mod progress;
pub mod rm;
#[cfg(test)]
pub(crate) mod testutils;

pub use config::{OutputConfig, RuntimeConfig, ThrottleConfig};

fn init_tracing(output: &OutputConfig) -> anyhow::Result<()> {
    use anyhow::Context;
    use tracing_subscriber::prelude::*;

    let log_level = match output.verbose {
        0 => tracing_subscriber::filter::LevelFilter::ERROR,
        1 => tracing_subscriber::filter::LevelFilter::INFO,
        2 => tracing_subscriber::filter::LevelFilter::DEBUG,
        _ => tracing_subscriber::filter::LevelFilter::TRACE,
    };
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    // optional file sink next to the console one; same process-wide lifecycle
    let file_layer = match &output.log_file {
        Some(path) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file: {path:?}"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(log_file)),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(file_layer)
        .init();
    Ok(())
}

/// Process lifecycle harness used by the tool binaries.
///
/// Sets up the tracing subscriber (console + optional file sink), configures
/// the CPU governor, builds the tokio runtime and runs `func` on it. Returns
/// `None` if anything failed; binaries map that to a non-zero exit.
pub fn run<FuncType, FutureType, SummaryType>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    throttle_config: ThrottleConfig,
    func: FuncType,
) -> Option<SummaryType>
where
    FuncType: FnOnce() -> FutureType,
    FutureType: std::future::Future<Output = anyhow::Result<SummaryType>>,
    SummaryType: std::fmt::Display,
{
    if let Err(error) = init_tracing(&output) {
        eprintln!("{error:#}");
        return None;
    }
    if let Err(error) = throttle_config.validate() {
        tracing::error!("invalid throttle configuration: {}", &error);
        return None;
    }
    throttle::set_cpu_limit(throttle_config.max_cpu_percent, throttle_config.cpu_pause);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = match builder.build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(error) => {
            tracing::error!("failed to build the tokio runtime: {}", &error);
            return None;
        }
    };
    match tokio_runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary {
                println!("{}", &summary);
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                tracing::error!("{:#}", &error);
            }
            None
        }
    }
}
