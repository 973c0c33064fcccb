//! Tree scanner & reaper: the two sequential passes that run before any
//! worker starts.

use anyhow::{Context, Result};
use async_recursion::async_recursion;
use tracing::instrument;

use crate::workers::{DirTask, FileTask};

/// Walk the source tree and enqueue one [`FileTask`] per non-directory entry
/// and one [`DirTask`] per directory (the root itself excluded). Both queues
/// are fully populated before this returns; nothing consumes them yet.
#[instrument(skip(file_tasks, dir_tasks))]
pub async fn scan(
    source: &std::path::Path,
    destination: &std::path::Path,
    file_tasks: &async_channel::Sender<FileTask>,
    dir_tasks: &async_channel::Sender<DirTask>,
) -> Result<()> {
    scan_dir(source, destination, file_tasks, dir_tasks).await
}

#[async_recursion]
async fn scan_dir(
    src_dir: &std::path::Path,
    dst_dir: &std::path::Path,
    file_tasks: &async_channel::Sender<FileTask>,
    dir_tasks: &async_channel::Sender<DirTask>,
) -> Result<()> {
    let mut entries = tokio::fs::read_dir(src_dir)
        .await
        .with_context(|| format!("cannot open directory {:?} for reading", &src_dir))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {:?}", &src_dir))?
    {
        let src_path = entry.path();
        let dst_path = dst_dir.join(entry.file_name());
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("failed reading file type of {:?}", &src_path))?;
        if file_type.is_dir() {
            dir_tasks
                .send(DirTask {
                    dst: dst_path.clone(),
                })
                .await
                .map_err(|_| anyhow::anyhow!("directory task queue closed during scan"))?;
            scan_dir(&src_path, &dst_path, file_tasks, dir_tasks).await?;
        } else {
            file_tasks
                .send(FileTask {
                    src: src_path,
                    dst: dst_path,
                })
                .await
                .map_err(|_| anyhow::anyhow!("file task queue closed during scan"))?;
        }
    }
    Ok(())
}

/// Walk the destination tree and delete every entry whose source counterpart
/// no longer exists: single unlink for files, recursive removal for
/// directories (which are then not descended into). Runs to completion
/// before the worker pool starts.
#[instrument(skip(prog_track))]
pub async fn reap(
    prog_track: &'static common::progress::Progress,
    source: &std::path::Path,
    destination: &std::path::Path,
) -> Result<common::rm::Summary> {
    reap_dir(prog_track, source, destination).await
}

#[async_recursion]
async fn reap_dir(
    prog_track: &'static common::progress::Progress,
    src_dir: &std::path::Path,
    dst_dir: &std::path::Path,
) -> Result<common::rm::Summary> {
    let mut summary = common::rm::Summary::default();
    let mut entries = match tokio::fs::read_dir(dst_dir).await {
        Ok(entries) => entries,
        // a destination that does not exist yet has nothing to reap
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(summary),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("cannot open directory {:?} for reading", &dst_dir));
        }
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {:?}", &dst_dir))?
    {
        let dst_path = entry.path();
        let src_path = src_dir.join(entry.file_name());
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("failed reading file type of {:?}", &dst_path))?;
        let src_exists = tokio::fs::symlink_metadata(&src_path).await.is_ok();
        if file_type.is_dir() {
            if src_exists {
                summary = summary + reap_dir(prog_track, &src_path, &dst_path).await?;
            } else {
                summary = summary + common::rm::rm_dir_all(prog_track, &dst_path).await?;
            }
        } else if !src_exists {
            summary = summary + common::rm::rm_file(prog_track, &dst_path).await?;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    static PROG_TRACK: std::sync::LazyLock<common::progress::Progress> =
        std::sync::LazyLock::new(common::progress::Progress::new);

    #[tokio::test]
    async fn scan_enqueues_one_task_per_entry() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("src");
        tokio::fs::create_dir(&src).await?;
        tokio::fs::write(src.join("a.txt"), "a").await?;
        tokio::fs::create_dir(src.join("sub")).await?;
        tokio::fs::write(src.join("sub").join("b.txt"), "b").await?;
        let dst = tmp_dir.path().join("dst");
        let (file_tx, file_rx) = async_channel::unbounded();
        let (dir_tx, dir_rx) = async_channel::unbounded();
        scan(&src, &dst, &file_tx, &dir_tx).await?;
        file_tx.close();
        dir_tx.close();
        let mut files = Vec::new();
        while let Ok(task) = file_rx.recv().await {
            files.push(task);
        }
        let mut dirs = Vec::new();
        while let Ok(task) = dir_rx.recv().await {
            dirs.push(task);
        }
        assert_eq!(files.len(), 2);
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].dst, dst.join("sub"));
        assert!(files.iter().any(|task| task.dst == dst.join("a.txt")));
        assert!(
            files
                .iter()
                .any(|task| task.dst == dst.join("sub").join("b.txt"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn reap_removes_only_stale_entries() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("src");
        let dst = tmp_dir.path().join("dst");
        tokio::fs::create_dir(&src).await?;
        tokio::fs::create_dir(&dst).await?;
        tokio::fs::write(src.join("keep.txt"), "k").await?;
        tokio::fs::write(dst.join("keep.txt"), "k").await?;
        tokio::fs::write(dst.join("stale.txt"), "s").await?;
        tokio::fs::create_dir(dst.join("stale_dir")).await?;
        tokio::fs::write(dst.join("stale_dir").join("nested.txt"), "n").await?;
        let summary = reap(std::sync::LazyLock::force(&PROG_TRACK), &src, &dst).await?;
        assert_eq!(summary.files_removed, 2);
        assert_eq!(summary.directories_removed, 1);
        assert!(tokio::fs::metadata(dst.join("keep.txt")).await.is_ok());
        assert!(tokio::fs::metadata(dst.join("stale.txt")).await.is_err());
        assert!(tokio::fs::metadata(dst.join("stale_dir")).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn reap_of_missing_destination_is_a_noop() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let summary = reap(
            std::sync::LazyLock::force(&PROG_TRACK),
            tmp_dir.path(),
            &tmp_dir.path().join("nonexistent"),
        )
        .await?;
        assert_eq!(summary.files_removed, 0);
        assert_eq!(summary.directories_removed, 0);
        Ok(())
    }
}
