//! Removal primitives for the destination reap pass.
//!
//! A not-found error is tolerated everywhere in this module: the entry may
//! already be gone by the time we get to it, which is a warn and a no-op.

use anyhow::{Context, Result};
use async_recursion::async_recursion;

use crate::progress;

#[derive(Copy, Clone, Debug, Default)]
pub struct Summary {
    pub files_removed: usize,
    pub directories_removed: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_removed: self.files_removed + other.files_removed,
            directories_removed: self.directories_removed + other.directories_removed,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files removed: {}\n\
            directories removed: {}",
            self.files_removed, self.directories_removed,
        )
    }
}

/// Remove a single destination file.
pub async fn rm_file(
    prog_track: &'static progress::Progress,
    path: &std::path::Path,
) -> Result<Summary> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::info!("removed extra file {:?}", &path);
            prog_track.files_removed.inc();
            Ok(Summary {
                files_removed: 1,
                ..Default::default()
            })
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("file not found during removal: {:?}", &path);
            Ok(Summary::default())
        }
        Err(error) => Err(error).with_context(|| format!("failed removing {:?}", &path)),
    }
}

/// Recursively remove a destination directory, accounting per entry.
#[async_recursion]
pub async fn rm_dir_all(
    prog_track: &'static progress::Progress,
    path: &std::path::Path,
) -> Result<Summary> {
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("directory not found during removal: {:?}", &path);
            return Ok(Summary::default());
        }
        Err(error) => {
            return Err(error)
                .with_context(|| format!("cannot open directory {:?} for reading", &path));
        }
    };
    let mut summary = Summary::default();
    let mut join_set = tokio::task::JoinSet::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {:?}", &path))?
    {
        let entry_path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("failed reading file type of {:?}", &entry_path))?;
        if file_type.is_dir() {
            let do_rm = || async move { rm_dir_all(prog_track, &entry_path).await };
            join_set.spawn(do_rm());
        } else {
            let do_rm = || async move { rm_file(prog_track, &entry_path).await };
            join_set.spawn(do_rm());
        }
    }
    while let Some(res) = join_set.join_next().await {
        summary = summary + res??;
    }
    match tokio::fs::remove_dir(path).await {
        Ok(()) => {
            tracing::info!("removed extra directory {:?}", &path);
            prog_track.directories_removed.inc();
            summary.directories_removed += 1;
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("directory not found during removal: {:?}", &path);
        }
        Err(error) => {
            return Err(error).with_context(|| format!("failed removing directory {:?}", &path));
        }
    }
    Ok(summary)
}
