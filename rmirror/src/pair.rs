//! Per-pair orchestration and the multi-pair scheduler.

use anyhow::{anyhow, Context};
use tracing::instrument;

use crate::scanner;
use crate::workers;

/// One (source, destination) mirroring job. Immutable for the run; each pair
/// is processed in its own task with no state shared across pairs.
#[derive(Clone, Debug)]
pub struct SyncPair {
    pub source: std::path::PathBuf,
    pub destination: std::path::PathBuf,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Settings {
    pub sample: common::filecmp::SampleSettings,
    /// Workers per task kind (0 = available parallelism)
    pub max_workers: usize,
}

/// Error type for sync operations that preserves the operation summary even
/// on failure.
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(source: anyhow::Error, summary: Summary) -> Self {
        Error { source, summary }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Summary {
    pub bytes_copied: u64,
    pub files_copied: usize,
    pub files_unchanged: usize,
    pub files_missing: usize,
    pub files_failed: usize,
    pub directories_created: usize,
    pub directories_unchanged: usize,
    pub directories_failed: usize,
    pub rm_summary: common::rm::Summary,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            bytes_copied: self.bytes_copied + other.bytes_copied,
            files_copied: self.files_copied + other.files_copied,
            files_unchanged: self.files_unchanged + other.files_unchanged,
            files_missing: self.files_missing + other.files_missing,
            files_failed: self.files_failed + other.files_failed,
            directories_created: self.directories_created + other.directories_created,
            directories_unchanged: self.directories_unchanged + other.directories_unchanged,
            directories_failed: self.directories_failed + other.directories_failed,
            rm_summary: self.rm_summary + other.rm_summary,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            files copied: {}\n\
            files unchanged: {}\n\
            files missing: {}\n\
            files failed: {}\n\
            directories created: {}\n\
            directories unchanged: {}\n\
            directories failed: {}\n\
            {}",
            bytesize::ByteSize(self.bytes_copied),
            self.files_copied,
            self.files_unchanged,
            self.files_missing,
            self.files_failed,
            self.directories_created,
            self.directories_unchanged,
            self.directories_failed,
            &self.rm_summary,
        )
    }
}

fn worker_count(max_workers: usize) -> usize {
    if max_workers > 0 {
        max_workers
    } else {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    }
}

/// Mirror one pair: scan, reap, then drain the task queues with the worker
/// pools. Strictly ordered; the queues are fully populated and closed before
/// the reap runs, and the reap completes before any worker starts.
#[instrument(skip(prog_track, settings))]
pub async fn sync_pair(
    prog_track: &'static common::progress::Progress,
    pair: SyncPair,
    settings: Settings,
) -> Result<Summary, Error> {
    let src_metadata = tokio::fs::metadata(&pair.source)
        .await
        .with_context(|| format!("failed reading metadata from source {:?}", &pair.source))
        .map_err(|err| Error::new(err, Summary::default()))?;
    if !src_metadata.is_dir() {
        return Err(Error::new(
            anyhow!("source {:?} is not a directory", &pair.source),
            Summary::default(),
        ));
    }
    tokio::fs::create_dir_all(&pair.destination)
        .await
        .with_context(|| format!("cannot create destination {:?}", &pair.destination))
        .map_err(|err| Error::new(err, Summary::default()))?;

    // phase 1: fill both queues completely before anything consumes them
    let (file_tx, file_rx) = async_channel::unbounded();
    let (dir_tx, dir_rx) = async_channel::unbounded();
    scanner::scan(&pair.source, &pair.destination, &file_tx, &dir_tx)
        .await
        .map_err(|err| Error::new(err, Summary::default()))?;
    // closing the queues is the workers' termination signal
    file_tx.close();
    dir_tx.close();

    // phase 2: prune stale destination entries before any copy runs
    let rm_summary = scanner::reap(prog_track, &pair.source, &pair.destination)
        .await
        .map_err(|err| Error::new(err, Summary::default()))?;

    // phase 3: two independent consumer groups, one per task kind
    let workers = worker_count(settings.max_workers);
    tracing::debug!("starting {workers} file workers and {workers} directory workers");
    let mut join_set = tokio::task::JoinSet::new();
    for _ in 0..workers {
        join_set.spawn(workers::file_worker(prog_track, file_rx.clone(), settings));
        join_set.spawn(workers::dir_worker(prog_track, dir_rx.clone()));
    }
    let mut summary = Summary {
        rm_summary,
        ..Default::default()
    };
    while let Some(res) = join_set.join_next().await {
        match res {
            Ok(worker_summary) => summary = summary + worker_summary,
            Err(error) => {
                return Err(Error::new(anyhow!("worker task failed: {error}"), summary));
            }
        }
    }
    Ok(summary)
}

/// Run every pair to completion, each in its own isolated task. A failing
/// pair is logged and does not abort the others; the combined summary is
/// reported either way, wrapped in an [`Error`] if anything failed.
pub async fn sync_pairs(
    prog_track: &'static common::progress::Progress,
    pairs: Vec<SyncPair>,
    settings: Settings,
) -> Result<Summary, Error> {
    let mut join_set = tokio::task::JoinSet::new();
    for pair in pairs {
        let do_sync = || async move {
            tracing::info!("starting sync {:?} -> {:?}", &pair.source, &pair.destination);
            let result = sync_pair(prog_track, pair.clone(), settings).await;
            tracing::info!("finished sync {:?} -> {:?}", &pair.source, &pair.destination);
            result
        };
        join_set.spawn(do_sync());
    }
    let mut success = true;
    let mut summary = Summary::default();
    while let Some(res) = join_set.join_next().await {
        match res {
            Ok(Ok(pair_summary)) => summary = summary + pair_summary,
            Ok(Err(error)) => {
                tracing::error!("{:#}", &error);
                summary = summary + error.summary;
                success = false;
            }
            Err(error) => {
                tracing::error!("pair task failed: {}", &error);
                success = false;
            }
        }
    }
    if summary.files_failed > 0 || summary.directories_failed > 0 {
        success = false;
    }
    if !success {
        return Err(Error::new(anyhow!("rmirror encountered errors"), summary));
    }
    Ok(summary)
}
