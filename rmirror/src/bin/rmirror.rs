use anyhow::anyhow;
use clap::Parser;
use tracing::instrument;

use rmirror_tools_rmirror::{guard, pair};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rmirror",
    version,
    about = "Mirror a directory tree onto a destination - copies what differs, prunes what's gone",
    long_about = "`rmirror` makes the destination tree match the source tree: missing directories are created, files that differ are recopied wholesale and destination entries without a source counterpart are removed.

Large binary files are compared by sampling a handful of random blocks instead of reading them end to end, and all workers back off while the system CPU usage is above a configurable threshold.

EXAMPLES:
    # Mirror with a summary at the end
    rmirror /data/projects /mnt/backup/projects --summary

    # Pause workers whenever CPU usage exceeds 70%, rechecking every 5s
    rmirror /data /mnt/backup/data --cpu-threshold 70 --cpu-pause 5s

Note: extra entries in the destination are DELETED; the destination tree is fully owned by rmirror."
)]
struct Args {
    // Performance & throttling
    /// Pause workers while system CPU usage is above this percentage (0 = no throttle)
    #[arg(
        long,
        default_value = "80",
        value_name = "PCT",
        help_heading = "Performance & throttling"
    )]
    cpu_threshold: u32,

    /// How long to pause before resampling when over the CPU threshold
    ///
    /// This option accepts a human readable duration, e.g. "500ms", "3s", "1min".
    #[arg(
        long,
        default_value = "3s",
        value_name = "DELAY",
        help_heading = "Performance & throttling"
    )]
    cpu_pause: String,

    // Comparison options
    /// Size above which binary files are compared by sampling instead of hashing
    #[arg(
        long,
        default_value = "100MiB",
        value_name = "SIZE",
        help_heading = "Comparison options"
    )]
    large_file_threshold: bytesize::ByteSize,

    /// Block size for the sampled comparison of large binary files
    #[arg(
        long,
        default_value = "1MiB",
        value_name = "SIZE",
        help_heading = "Comparison options"
    )]
    sample_block_size: bytesize::ByteSize,

    /// Number of random blocks compared per large binary file
    ///
    /// Sampling trades exactness for speed: a difference confined to an
    /// unsampled region goes undetected until it changes the file size.
    #[arg(
        long,
        default_value = "10",
        value_name = "N",
        help_heading = "Comparison options"
    )]
    sample_count: usize,

    // Progress & output
    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    /// Append log lines to this file in addition to the console
    #[arg(long, value_name = "PATH", help_heading = "Progress & output")]
    log_file: Option<std::path::PathBuf>,

    // Advanced settings
    /// TCP port used as the host-wide single-instance lock (never carries data)
    #[arg(
        long,
        default_value = "65432",
        value_name = "PORT",
        help_heading = "Advanced settings"
    )]
    lock_port: u16,

    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Source directory (read-only)
    #[arg()]
    source: std::path::PathBuf,

    /// Destination directory (fully owned by rmirror)
    #[arg()]
    destination: std::path::PathBuf,
}

static PROG_TRACK: std::sync::LazyLock<common::progress::Progress> =
    std::sync::LazyLock::new(common::progress::Progress::new);

#[instrument]
async fn async_main(args: Args) -> anyhow::Result<pair::Summary> {
    let prog_track = std::sync::LazyLock::force(&PROG_TRACK);
    // the lock must be held before either tree is touched
    let lock_guard = guard::SingletonGuard::acquire(args.lock_port).await?;
    let settings = pair::Settings {
        sample: common::filecmp::SampleSettings {
            large_file_threshold: args.large_file_threshold.as_u64(),
            block_size: args.sample_block_size.as_u64(),
            sample_count: args.sample_count,
        },
        max_workers: args.max_workers,
    };
    let pairs = vec![pair::SyncPair {
        source: args.source.clone(),
        destination: args.destination.clone(),
    }];
    let result = pair::sync_pairs(prog_track, pairs, settings).await;
    drop(lock_guard);
    match result {
        Ok(summary) => Ok(summary),
        Err(error) => {
            if args.summary {
                Err(anyhow!("{}\n\n{}", error, &error.summary))
            } else {
                Err(anyhow!("{}", error))
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cpu_pause = humantime::parse_duration(&args.cpu_pause)
        .map_err(|error| anyhow!("invalid --cpu-pause value {:?}: {}", &args.cpu_pause, error))?;
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary || args.verbose > 0,
        log_file: args.log_file.clone(),
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let throttle_config = common::ThrottleConfig {
        max_cpu_percent: args.cpu_threshold,
        cpu_pause,
    };
    let res = common::run(output, runtime, throttle_config, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
