//! Sync worker pools: two independent consumer groups draining the task
//! queues filled by the scanner.
//!
//! Workers terminate when their queue is closed and drained - queue closure
//! replaces an in-band sentinel value, so no marker task can ever be mistaken
//! for real work. File workers and directory workers race freely; a file
//! worker therefore materializes its destination's parent right before a copy
//! that needs it.

use anyhow::{Context, Result};

use crate::pair;

/// One file to reconcile: copy `src` over `dst` when the oracle says they
/// differ.
#[derive(Clone, Debug)]
pub struct FileTask {
    pub src: std::path::PathBuf,
    pub dst: std::path::PathBuf,
}

/// One destination directory to materialize.
#[derive(Clone, Debug)]
pub struct DirTask {
    pub dst: std::path::PathBuf,
}

enum FileOutcome {
    Copied(u64),
    Unchanged,
    SrcMissing,
}

fn is_not_found(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io_error| io_error.kind() == std::io::ErrorKind::NotFound)
    })
}

/// Drain the file queue until it is closed and empty.
///
/// Per-task failures are logged and counted, never retried; a vanished
/// source is a skip, not a failure.
pub async fn file_worker(
    prog_track: &'static common::progress::Progress,
    tasks: async_channel::Receiver<FileTask>,
    settings: pair::Settings,
) -> pair::Summary {
    let mut summary = pair::Summary::default();
    while let Ok(task) = tasks.recv().await {
        throttle::wait_for_cpu_budget().await;
        match process_file(prog_track, &task, &settings).await {
            Ok(FileOutcome::Copied(bytes)) => {
                summary.files_copied += 1;
                summary.bytes_copied += bytes;
            }
            Ok(FileOutcome::Unchanged) => summary.files_unchanged += 1,
            Ok(FileOutcome::SrcMissing) => summary.files_missing += 1,
            Err(error) => {
                tracing::error!("failed to sync {:?}: {:#}", &task.src, &error);
                prog_track.files_failed.inc();
                summary.files_failed += 1;
            }
        }
        tracing::debug!("processed file task: {:?}", &task.src);
    }
    summary
}

async fn process_file(
    prog_track: &'static common::progress::Progress,
    task: &FileTask,
    settings: &pair::Settings,
) -> Result<FileOutcome> {
    let equal = match common::filecmp::files_equal(&task.src, &task.dst, &settings.sample).await {
        Ok(equal) => equal,
        Err(error) if is_not_found(&error) => {
            // the destination side never reports not-found here, so the
            // source must have vanished between scan and processing
            tracing::warn!("file not found during processing: {:?}", &task.src);
            prog_track.files_missing.inc();
            return Ok(FileOutcome::SrcMissing);
        }
        Err(error) => return Err(error),
    };
    if equal {
        prog_track.files_unchanged.inc();
        return Ok(FileOutcome::Unchanged);
    }
    tracing::info!("file {:?} differs from {:?}, copying", &task.src, &task.dst);
    if let Some(parent) = task.dst.parent() {
        // directory workers race with us; the parent may not exist yet
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create directory {:?}", &parent))?;
    }
    match common::copy::copy_file(prog_track, &task.src, &task.dst).await? {
        common::copy::Outcome::Copied(bytes) => Ok(FileOutcome::Copied(bytes)),
        common::copy::Outcome::SrcMissing => Ok(FileOutcome::SrcMissing),
    }
}

/// Drain the directory queue until it is closed and empty.
pub async fn dir_worker(
    prog_track: &'static common::progress::Progress,
    tasks: async_channel::Receiver<DirTask>,
) -> pair::Summary {
    let mut summary = pair::Summary::default();
    while let Ok(task) = tasks.recv().await {
        throttle::wait_for_cpu_budget().await;
        match process_directory(prog_track, &task).await {
            Ok(true) => summary.directories_created += 1,
            Ok(false) => summary.directories_unchanged += 1,
            Err(error) => {
                tracing::error!("failed to create {:?}: {:#}", &task.dst, &error);
                summary.directories_failed += 1;
            }
        }
        tracing::debug!("processed directory task: {:?}", &task.dst);
    }
    summary
}

async fn process_directory(
    prog_track: &'static common::progress::Progress,
    task: &DirTask,
) -> Result<bool> {
    // plain existence probe; the creation itself is mkdir-p so missing
    // intermediate levels are tolerated
    match tokio::fs::metadata(&task.dst).await {
        Ok(_) => {
            prog_track.directories_unchanged.inc();
            Ok(false)
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(&task.dst)
                .await
                .with_context(|| format!("cannot create directory {:?}", &task.dst))?;
            tracing::info!("created directory {:?}", &task.dst);
            prog_track.directories_created.inc();
            Ok(true)
        }
        Err(error) => {
            Err(error).with_context(|| format!("failed reading metadata from {:?}", &task.dst))
        }
    }
}
